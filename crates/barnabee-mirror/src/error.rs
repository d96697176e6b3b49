use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("upstream connection failed: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("upstream rejected authentication")]
    AuthRejected,
    #[error("upstream returned malformed message: {0}")]
    Protocol(String),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] barnabee_storage::StorageError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type MirrorResult<T> = Result<T, MirrorError>;
