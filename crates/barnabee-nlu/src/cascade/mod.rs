//! Four-stage classifier with latency-budgeted early exit (component #5,
//! spec.md §4.5). Stages run strictly sequentially — never in parallel — so
//! the common case never pays for work past the deciding stage. Grounded on
//! `pagi-core::orchestrator::heuristics::HeuristicProcessor`'s pattern of a
//! struct that runs ordered checks and returns a single verdict.

mod embedding;
mod fast_pattern;
mod llm_fallback;
mod local_model;

pub use embedding::EmbeddingStage;
pub use fast_pattern::FastPatternStage;
pub use llm_fallback::LlmFallbackStage;
pub use local_model::{LocalClassifier, LocalModelStage};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use barnabee_signals::SignalCollector;
use barnabee_storage::{Signal, SignalKind};

use crate::error::NluResult;
use crate::intent::{CascadeStage, IntentResult, StageOutcome};
use crate::providers::{EmbeddingProvider, LlmProvider};

pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.70;

pub struct IntentCascade<'a> {
    pub embedding_provider: &'a dyn EmbeddingProvider,
    pub llm_provider: &'a dyn LlmProvider,
    pub local_model: &'a dyn LocalClassifier,
    pub centroids: &'a HashMap<String, Vec<f32>>,
    pub signals: Option<Arc<SignalCollector>>,
}

impl<'a> IntentCascade<'a> {
    pub async fn classify(&self, raw_text: &str, normalized_text: &str) -> NluResult<IntentResult> {
        let started = Instant::now();

        if let StageOutcome::Decided { intent, confidence } = (FastPatternStage).run(normalized_text) {
            return Ok(self.finish(raw_text, normalized_text, intent, confidence, CascadeStage::S1FastPattern, started));
        }

        let embedding_stage = EmbeddingStage { provider: self.embedding_provider, centroids: self.centroids };
        if let StageOutcome::Decided { intent, confidence } = embedding_stage.run(normalized_text).await? {
            return Ok(self.finish(raw_text, normalized_text, intent, confidence, CascadeStage::S2Embedding, started));
        }

        let local_stage = LocalModelStage { model: self.local_model };
        if let StageOutcome::Decided { intent, confidence } = local_stage.run(normalized_text) {
            return Ok(self.finish(raw_text, normalized_text, intent, confidence, CascadeStage::S3LocalModel, started));
        }

        let llm_stage = LlmFallbackStage { provider: self.llm_provider };
        let (intent, confidence) = llm_stage.run(normalized_text).await?;
        self.emit_signal(
            SignalKind::LlmFallback,
            raw_text,
            normalized_text,
            Some(CascadeStage::S4LlmFallback.as_str()),
            Some(confidence),
            serde_json::json!({ "intent": intent }),
        );
        Ok(self.finish(raw_text, normalized_text, intent, confidence, CascadeStage::S4LlmFallback, started))
    }

    fn finish(
        &self,
        raw_text: &str,
        normalized_text: &str,
        intent: String,
        confidence: f32,
        stage: CascadeStage,
        started: Instant,
    ) -> IntentResult {
        if confidence < LOW_CONFIDENCE_THRESHOLD {
            self.emit_signal(
                SignalKind::LowConfidence,
                raw_text,
                normalized_text,
                Some(stage.as_str()),
                Some(confidence),
                serde_json::json!({ "intent": intent }),
            );
        }
        IntentResult {
            intent,
            confidence,
            stage,
            raw_text: raw_text.to_string(),
            normalized_text: normalized_text.to_string(),
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn emit_signal(
        &self,
        kind: SignalKind,
        raw_text: &str,
        normalized_text: &str,
        stage: Option<&str>,
        confidence: Option<f32>,
        context: serde_json::Value,
    ) {
        let Some(signals) = &self.signals else { return };
        signals.record(Signal {
            id: Uuid::new_v4(),
            kind,
            utterance: raw_text.to_string(),
            normalized_text: normalized_text.to_string(),
            context,
            expected_outcome: None,
            actual_outcome: None,
            stage_reached: stage.map(str::to_string),
            confidence,
            processed: false,
            created_at: chrono::Utc::now(),
        });
    }
}
