use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("entity not found or unavailable: {0}")]
    EntityUnavailable(String),
    #[error("no service mapping for intent {0}")]
    UnmappedIntent(String),
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] barnabee_mirror::MirrorError),
    #[error("speculative task for entity {0} was cancelled")]
    Cancelled(String),
    #[error("executor exceeded its 500ms deadline")]
    DeadlineExceeded,
}

pub type ExecResult<T> = Result<T, ExecError>;
