//! Top-level error taxonomy (spec.md §7 "Taxonomy"). Every per-crate error
//! folds into one of six buckets the orchestrator and CLI act on uniformly:
//! retry, degrade, reject, deny, abort, or refuse to start.

use thiserror::Error;

use barnabee_evolution::EvolutionError;
use barnabee_exec::ExecError;
use barnabee_mirror::MirrorError;
use barnabee_nlu::NluError;
use barnabee_session::SessionError;
use barnabee_storage::StorageError;

#[derive(Debug, Error)]
pub enum BarnabeeError {
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),
    #[error("request exceeded its deadline")]
    Timeout,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("data corruption, aborting: {0}")]
    Corruption(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BarnabeeError {
    /// CLI exit code (spec.md §6 "CLI"): 0 success, 2 configuration error, 3
    /// upstream unavailable, 4 data corruption. Other buckets only arise
    /// within a request and never reach `main`'s exit path.
    pub fn exit_code(&self) -> i32 {
        match self {
            BarnabeeError::Configuration(_) => 2,
            BarnabeeError::TransientUpstream(_) | BarnabeeError::Timeout => 3,
            BarnabeeError::Corruption(_) => 4,
            BarnabeeError::Validation(_) | BarnabeeError::Forbidden(_) => 1,
        }
    }
}

impl From<StorageError> for BarnabeeError {
    fn from(err: StorageError) -> Self {
        if err.is_corruption() {
            BarnabeeError::Corruption(err.to_string())
        } else if err.is_retryable() {
            BarnabeeError::TransientUpstream(err.to_string())
        } else {
            BarnabeeError::Validation(err.to_string())
        }
    }
}

impl From<SessionError> for BarnabeeError {
    fn from(err: SessionError) -> Self {
        BarnabeeError::Validation(err.to_string())
    }
}

impl From<MirrorError> for BarnabeeError {
    fn from(err: MirrorError) -> Self {
        BarnabeeError::TransientUpstream(err.to_string())
    }
}

impl From<NluError> for BarnabeeError {
    fn from(err: NluError) -> Self {
        match err {
            NluError::Storage(e) => e.into(),
            other => BarnabeeError::TransientUpstream(other.to_string()),
        }
    }
}

impl From<ExecError> for BarnabeeError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::DeadlineExceeded => BarnabeeError::Timeout,
            other => BarnabeeError::TransientUpstream(other.to_string()),
        }
    }
}

impl From<EvolutionError> for BarnabeeError {
    fn from(err: EvolutionError) -> Self {
        match err {
            EvolutionError::Storage(e) => e.into(),
            EvolutionError::Nlu(e) => e.into(),
            other => BarnabeeError::Validation(other.to_string()),
        }
    }
}

pub type BarnabeeResult<T> = Result<T, BarnabeeError>;
