//! Intent taxonomy (spec.md §4.5 "Intent taxonomy") and the cascade's shared
//! output types.

use serde::{Deserialize, Serialize};

/// ≈40 leaf intents across seven families. Stored as a flat string elsewhere
/// (storage, signals) but validated against this table at the cascade
/// boundary so an unknown label can never leave the classifier.
pub const INTENT_TAXONOMY: &[&str] = &[
    "home_control.light", "home_control.climate", "home_control.lock", "home_control.cover",
    "home_control.media", "home_control.scene",
    "information.time", "information.weather", "information.calendar", "information.email",
    "information.location", "information.general",
    "tasks.timer_set", "tasks.timer_query", "tasks.timer_cancel", "tasks.reminder",
    "tasks.todo_add", "tasks.todo_query",
    "memory.create", "memory.query", "memory.delete", "memory.search",
    "mode.conversation_start", "mode.conversation_end", "mode.notes_start", "mode.notes_end",
    "mode.journal_start", "mode.journal_end", "mode.ambient_start", "mode.ambient_end",
    "conversation.greeting", "conversation.farewell", "conversation.follow_up",
    "conversation.clarification", "conversation.confirmation", "conversation.chitchat",
    "system.help", "system.repeat", "system.cancel", "system.unknown",
];

pub fn is_known_intent(intent: &str) -> bool {
    INTENT_TAXONOMY.contains(&intent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStage {
    S1FastPattern,
    S2Embedding,
    S3LocalModel,
    S4LlmFallback,
}

impl CascadeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeStage::S1FastPattern => "s1_fast_pattern",
            CascadeStage::S2Embedding => "s2_embedding",
            CascadeStage::S3LocalModel => "s3_local_model",
            CascadeStage::S4LlmFallback => "s4_llm_fallback",
        }
    }
}

/// Final classification output (spec.md §4.5 "Output").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f32,
    pub stage: CascadeStage,
    pub raw_text: String,
    pub normalized_text: String,
    pub latency_ms: u64,
}

/// A stage either decides the final answer or asks the cascade to continue
/// to the next stage (spec.md §4.5: "the first stage whose output exceeds
/// threshold returns").
pub enum StageOutcome {
    Decided { intent: String, confidence: f32 },
    Continue,
}

pub struct CandidateIntent {
    pub intent: String,
    pub confidence: f32,
}
