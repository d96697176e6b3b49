//! Nightly clustering step (spec.md §4.10 "Nightly analysis" (1)): embed
//! unprocessed signals and group them by cosine similarity into clusters of
//! at least `min_size`. Greedy single-pass clustering — nightly batches are
//! small enough that this never needs to be more than that.

use std::collections::HashSet;

use barnabee_nlu::providers::EmbeddingProvider;
use barnabee_storage::{Signal, SignalKind};
use uuid::Uuid;

use crate::error::EvolutionResult;

pub struct SignalCluster {
    pub kind: SignalKind,
    pub signal_ids: Vec<Uuid>,
    pub utterances: Vec<String>,
}

impl SignalCluster {
    /// The signal kind shared by the large majority of members. Clustering
    /// groups by embedding similarity, not kind, so a cluster is occasionally
    /// mixed; the modal kind decides how the cluster is routed.
    pub fn dominant_kind(members: &[&Signal]) -> SignalKind {
        let mut counts: Vec<(SignalKind, usize)> = Vec::new();
        for signal in members {
            if let Some(entry) = counts.iter_mut().find(|(k, _)| *k == signal.kind) {
                entry.1 += 1;
            } else {
                counts.push((signal.kind, 1));
            }
        }
        counts.into_iter().max_by_key(|(_, c)| *c).map(|(k, _)| k).unwrap_or(SignalKind::LowConfidence)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub async fn cluster_signals(
    signals: &[Signal],
    embedder: &dyn EmbeddingProvider,
    similarity_threshold: f32,
    min_size: usize,
) -> EvolutionResult<Vec<SignalCluster>> {
    let mut embeddings = Vec::with_capacity(signals.len());
    for signal in signals {
        embeddings.push(embedder.embed(&signal.normalized_text).await?);
    }

    let mut assigned: HashSet<usize> = HashSet::new();
    let mut clusters = Vec::new();

    for seed in 0..signals.len() {
        if assigned.contains(&seed) {
            continue;
        }
        let mut members = vec![seed];
        for candidate in (seed + 1)..signals.len() {
            if assigned.contains(&candidate) {
                continue;
            }
            if cosine_similarity(&embeddings[seed], &embeddings[candidate]) >= similarity_threshold {
                members.push(candidate);
            }
        }
        if members.len() < min_size {
            continue;
        }
        for &m in &members {
            assigned.insert(m);
        }
        let member_signals: Vec<&Signal> = members.iter().map(|&i| &signals[i]).collect();
        clusters.push(SignalCluster {
            kind: SignalCluster::dominant_kind(&member_signals),
            signal_ids: member_signals.iter().map(|s| s.id).collect(),
            utterances: member_signals.iter().map(|s| s.utterance.clone()).collect(),
        });
    }

    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed(&self, text: &str) -> barnabee_nlu::NluResult<Vec<f32>> {
            // "master" utterances cluster near [1,0]; everything else near [0,1].
            if text.contains("master") {
                Ok(vec![1.0, 0.01])
            } else {
                Ok(vec![0.01, 1.0])
            }
        }
        fn dimension(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn signal(utterance: &str, kind: SignalKind) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            kind,
            utterance: utterance.to_string(),
            normalized_text: utterance.to_string(),
            context: serde_json::json!({}),
            expected_outcome: None,
            actual_outcome: None,
            stage_reached: None,
            confidence: None,
            processed: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn groups_similar_signals_and_drops_singletons() {
        let signals = vec![
            signal("turn on master bed light", SignalKind::EntityFail),
            signal("master bed light please", SignalKind::EntityFail),
            signal("master bedroom light on", SignalKind::EntityFail),
            signal("what's the weather", SignalKind::LowConfidence),
        ];
        let clusters = cluster_signals(&signals, &StubEmbedder, 0.85, 3).await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].signal_ids.len(), 3);
        assert_eq!(clusters[0].kind, SignalKind::EntityFail);
    }
}
