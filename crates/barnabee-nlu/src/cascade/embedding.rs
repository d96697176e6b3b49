//! S2 embedding stage (spec.md §4.5): cosine similarity of the utterance
//! embedding against a per-intent centroid, argmax, threshold 0.85. Tie
//! rule: top two centroids within 0.02 similarity fall through to S3.

use std::collections::HashMap;

use crate::intent::StageOutcome;
use crate::providers::EmbeddingProvider;

pub const THRESHOLD: f32 = 0.85;
const TIE_MARGIN: f32 = 0.02;

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub struct EmbeddingStage<'a> {
    pub provider: &'a dyn EmbeddingProvider,
    pub centroids: &'a HashMap<String, Vec<f32>>,
}

impl<'a> EmbeddingStage<'a> {
    pub async fn run(&self, normalized_text: &str) -> crate::error::NluResult<StageOutcome> {
        let embedding = self.provider.embed(normalized_text).await?;

        let mut scored: Vec<(&str, f32)> = self
            .centroids
            .iter()
            .map(|(intent, centroid)| (intent.as_str(), cosine_similarity(&embedding, centroid)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let Some(&(top_intent, top_score)) = scored.first() else {
            return Ok(StageOutcome::Continue);
        };
        if let Some(&(_, second_score)) = scored.get(1) {
            if (top_score - second_score).abs() <= TIE_MARGIN {
                return Ok(StageOutcome::Continue);
            }
        }
        if top_score >= THRESHOLD {
            Ok(StageOutcome::Decided { intent: top_intent.to_string(), confidence: top_score })
        } else {
            Ok(StageOutcome::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }
}
