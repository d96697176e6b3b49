//! Storage-layer error taxonomy.
//!
//! Mirrors the top-level `TransientUpstream | Timeout | Validation | Forbidden |
//! Corruption | Configuration` classification (see `barnabee-core::error`), but
//! scoped to what the storage engine itself can observe: write-conflict retries
//! exhausted, and corruption on read (fatal, aborts the request).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("write conflict after {attempts} retries")]
    WriteConflict { attempts: u32 },

    #[error("database corruption detected: {0}")]
    Corruption(String),

    #[error("migration {version} failed: {0}", version = .0)]
    Migration(i64, #[source] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("storage task panicked: {0}")]
    TaskPanicked(String),

    #[error("invalid argument: {0}")]
    Validation(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// True when the error indicates the on-disk file itself is unreadable/corrupt,
    /// per spec.md §4.1 ("Corruption on read is fatal and must abort orchestration").
    pub fn is_corruption(&self) -> bool {
        match self {
            StorageError::Corruption(_) => true,
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
                )
            }
            _ => false,
        }
    }

    /// True when the error is a write conflict worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::TaskPanicked(_))
            || matches!(
                self,
                StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                    if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            )
    }
}
