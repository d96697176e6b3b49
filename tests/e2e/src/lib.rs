//! Shared test doubles for the cross-crate integration suite in `tests/`.

use async_trait::async_trait;
use serde_json::Value;

use barnabee_nlu::providers::{EmbeddingProvider, LlmProvider};
use barnabee_nlu::{NluError, NluResult};

/// Returns a fixed, low-dimensional embedding derived from the input's byte
/// sum, just enough for cosine similarity to behave deterministically across
/// test cases without calling out to a real model.
pub struct FakeEmbeddingProvider {
    dimension: usize,
}

impl FakeEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    async fn embed(&self, text: &str) -> NluResult<Vec<f32>> {
        let seed: f32 = text.bytes().map(|b| b as f32).sum::<f32>() / 255.0;
        Ok((0..self.dimension).map(|i| ((seed + i as f32) % 7.0) / 7.0).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "fake-embedding-model"
    }
}

/// Never actually called in the fast-path test (S1 decides first) and
/// returns empty extraction/classification results otherwise, matching the
/// orchestrator's own degrade-on-upstream-failure behavior for anything this
/// double can't answer confidently.
pub struct FakeLlmProvider;

#[async_trait]
impl LlmProvider for FakeLlmProvider {
    async fn complete_json(&self, system: &str, _user: &str, _schema: &Value) -> NluResult<Value> {
        if system.contains("Extract device mentions") {
            return Ok(serde_json::json!({
                "devices": [],
                "locations": [],
                "times": [],
                "durations": [],
                "people": [],
                "raw_slots": {},
            }));
        }
        if system.contains("Classify the user's utterance") {
            return Ok(serde_json::json!({ "intent": "system.unknown", "confidence": 0.5 }));
        }
        Err(NluError::LlmProvider(format!("unhandled fake prompt: {system}")))
    }
}
