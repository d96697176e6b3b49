//! Traits for the two upstream model services (spec.md §6 "Upstream
//! (consumed)"): an LLM accepting chat-style prompts with an optional
//! JSON-schema response constraint, and an embedding provider producing
//! fixed-width vectors. Shaped after `pagi-core::openrouter_service::
//! OpenRouterBridge`, generalized from a single concrete bridge to a trait so
//! `barnabee-core` can wire in whatever concrete client the deployment needs.

use async_trait::async_trait;

use crate::error::NluResult;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Chat completion constrained to the given JSON schema; used by S4 and
    /// the Entity Resolver's LLM fallback.
    async fn complete_json(
        &self,
        system: &str,
        user: &str,
        schema: &serde_json::Value,
    ) -> NluResult<serde_json::Value>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> NluResult<Vec<f32>>;
    fn dimension(&self) -> usize;
    fn model_name(&self) -> &str;
}
