//! S4 LLM fallback (spec.md §4.5): external model called with the intent
//! taxonomy and a JSON-schema response. No threshold — whatever it returns
//! is authoritative, since there's nowhere left to fall through to.

use serde::Deserialize;

use crate::error::{NluError, NluResult};
use crate::intent::INTENT_TAXONOMY;
use crate::providers::LlmProvider;

#[derive(Debug, Deserialize)]
struct LlmIntentResponse {
    intent: String,
    confidence: f32,
}

fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "intent": { "type": "string", "enum": INTENT_TAXONOMY },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
        },
        "required": ["intent", "confidence"],
    })
}

pub struct LlmFallbackStage<'a> {
    pub provider: &'a dyn LlmProvider,
}

impl<'a> LlmFallbackStage<'a> {
    pub async fn run(&self, normalized_text: &str) -> NluResult<(String, f32)> {
        let system = "Classify the user's utterance into exactly one intent from the provided taxonomy. \
            Respond only with the JSON object the schema describes.";
        let value = self.provider.complete_json(system, normalized_text, &response_schema()).await?;
        let parsed: LlmIntentResponse =
            serde_json::from_value(value).map_err(|e| NluError::LlmProvider(e.to_string()))?;
        if !INTENT_TAXONOMY.contains(&parsed.intent.as_str()) {
            return Ok(("system.unknown".to_string(), parsed.confidence.min(0.69)));
        }
        Ok((parsed.intent, parsed.confidence))
    }
}
