use thiserror::Error;

#[derive(Debug, Error)]
pub enum NluError {
    #[error("upstream LLM provider failed: {0}")]
    LlmProvider(String),
    #[error("embedding provider failed: {0}")]
    EmbeddingProvider(String),
    #[error(transparent)]
    Storage(#[from] barnabee_storage::StorageError),
    #[error("cascade exhausted all stages without a decision")]
    Exhausted,
}

pub type NluResult<T> = Result<T, NluError>;
