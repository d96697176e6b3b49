//! Concrete `CandidateClassifierFactory` (spec.md §4.10 "Shadow test").
//! `barnabee_evolution::pipeline` only reasons about classifiers through the
//! `ClassifierUnderTest`/`CandidateClassifierFactory` traits; this module owns
//! the live intent-cascade state those traits abstract over and knows how to
//! fork a candidate with one proposed improvement layered on top.
//!
//! Grounded on `barnabee_nlu::cascade::IntentCascade` for the classify path
//! and `barnabee_evolution::shadow::ClassifierUnderTest` for the contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use barnabee_evolution::{CandidateClassifierFactory, ClassifierUnderTest};
use barnabee_nlu::cascade::IntentCascade;
use barnabee_nlu::providers::{EmbeddingProvider, LlmProvider};
use barnabee_nlu::{TextNormalizer, INTENT_TAXONOMY};
use barnabee_storage::{Improvement, ImprovementType, Store};

use crate::providers::PassthroughLocalClassifier;

fn average(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    let mut sum = vec![0.0_f32; dim];
    for vector in vectors {
        for (slot, value) in sum.iter_mut().zip(vector) {
            *slot += value;
        }
    }
    let n = vectors.len() as f32;
    Some(sum.into_iter().map(|v| v / n).collect())
}

/// Merges fresh exemplar embeddings into an existing centroid, treating the
/// prior centroid as one more sample so a handful of new exemplars nudge
/// rather than replace it.
fn merge_centroid(existing: Option<&Vec<f32>>, fresh: &[Vec<f32>]) -> Option<Vec<f32>> {
    match existing {
        Some(centroid) => {
            let mut all = fresh.to_vec();
            all.push(centroid.clone());
            average(&all)
        }
        None => average(fresh),
    }
}

/// One fork of the live classifier: the cascade's S1/S2/S4 stages over a
/// fixed centroid snapshot. S3 is always a pass-through (no bundled local
/// model), matching the live system's own configuration.
struct LiveClassifier {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    centroids: HashMap<String, Vec<f32>>,
    normalizer: TextNormalizer,
}

#[async_trait]
impl ClassifierUnderTest for LiveClassifier {
    async fn classify(&self, utterance: &str) -> (String, u64) {
        let normalized = self.normalizer.normalize(utterance);
        let local_model = PassthroughLocalClassifier;
        let cascade = IntentCascade {
            embedding_provider: self.embedder.as_ref(),
            llm_provider: self.llm.as_ref(),
            local_model: &local_model,
            centroids: &self.centroids,
            signals: None,
        };
        match cascade.classify(utterance, &normalized.normalized_text).await {
            Ok(result) => (result.intent, result.latency_ms),
            Err(_) => ("system.unknown".to_string(), 0),
        }
    }
}

/// Owns the live per-intent centroid table and forks `LiveClassifier`
/// snapshots for the shadow test. Aliases and synonyms steer entity
/// resolution, not intent classification, so improvements of those types
/// leave the candidate snapshot identical to the current one — the shadow
/// test still runs, it just can't move intent accuracy either way.
pub struct LiveClassifierFactory {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    centroids: Arc<DashMap<String, Vec<f32>>>,
}

impl LiveClassifierFactory {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn EmbeddingProvider>, llm: Arc<dyn LlmProvider>) -> Self {
        Self { store, embedder, llm, centroids: Arc::new(DashMap::new()) }
    }

    /// Exposes the live centroid snapshot so the Request Orchestrator's
    /// classify path and this factory's shadow-test forks read the same
    /// underlying state.
    pub(crate) fn snapshot(&self) -> HashMap<String, Vec<f32>> {
        self.centroids.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }

    fn make_classifier(&self, centroids: HashMap<String, Vec<f32>>) -> Box<dyn ClassifierUnderTest> {
        Box::new(LiveClassifier {
            embedder: self.embedder.clone(),
            llm: self.llm.clone(),
            centroids,
            normalizer: TextNormalizer::default(),
        })
    }

    async fn exemplar_embeddings(&self, utterances: &[Value]) -> Vec<Vec<f32>> {
        let mut vectors = Vec::with_capacity(utterances.len());
        for utterance in utterances.iter().filter_map(|v| v.as_str()) {
            if let Ok(embedding) = self.embedder.embed(utterance).await {
                vectors.push(embedding);
            }
        }
        vectors
    }
}

#[async_trait]
impl CandidateClassifierFactory for LiveClassifierFactory {
    async fn current(&self) -> Box<dyn ClassifierUnderTest> {
        self.make_classifier(self.snapshot())
    }

    async fn with_improvement_applied(&self, improvement: &Improvement) -> Box<dyn ClassifierUnderTest> {
        let mut centroids = self.snapshot();

        match improvement.improvement_type {
            ImprovementType::Exemplar | ImprovementType::Pattern => {
                let utterances = improvement
                    .proposed_value
                    .get("exemplars")
                    .or_else(|| improvement.proposed_value.get("corrected_utterances"))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let fresh = self.exemplar_embeddings(&utterances).await;
                if let Some(merged) = merge_centroid(centroids.get(&improvement.target), &fresh) {
                    centroids.insert(improvement.target.clone(), merged);
                }
            }
            ImprovementType::Alias | ImprovementType::Synonym | ImprovementType::Template => {}
        }

        self.make_classifier(centroids)
    }

    async fn restore_backup(&self, target: &str, snapshot: &Value) {
        match snapshot.get("centroid").and_then(|v| serde_json::from_value::<Vec<f32>>(v.clone()).ok()) {
            Some(centroid) => {
                self.centroids.insert(target.to_string(), centroid);
            }
            None => {
                self.centroids.remove(target);
            }
        }
    }

    /// Recomputes every intent's centroid from its stored training examples.
    /// Called after an atomic apply or rollback so the live cascade picks up
    /// the change on its next classification.
    async fn reload(&self) {
        self.centroids.clear();
        for &intent in INTENT_TAXONOMY {
            let intent_owned = intent.to_string();
            let Ok(utterances) = self.store.spawn_blocking(move |s| s.training_examples_for_intent(&intent_owned)).await else { continue };
            if utterances.is_empty() {
                continue;
            }
            let mut vectors = Vec::with_capacity(utterances.len());
            for utterance in &utterances {
                if let Ok(embedding) = self.embedder.embed(utterance).await {
                    vectors.push(embedding);
                }
            }
            if let Some(centroid) = average(&vectors) {
                self.centroids.insert(intent.to_string(), centroid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_centroid_with_no_prior_centroid_averages_fresh_only() {
        let fresh = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let merged = merge_centroid(None, &fresh).unwrap();
        assert!((merged[0] - 0.5).abs() < 1e-6);
        assert!((merged[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn merge_centroid_treats_prior_as_one_sample() {
        let prior = vec![1.0, 1.0];
        let fresh = vec![vec![0.0, 0.0]];
        let merged = merge_centroid(Some(&prior), &fresh).unwrap();
        assert!((merged[0] - 0.5).abs() < 1e-6);
    }
}
