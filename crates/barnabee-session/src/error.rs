use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no session for device {0}")]
    NotFound(String),
    #[error("lock already held for key {0}")]
    LockContended(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
