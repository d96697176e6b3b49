//! The embedded store: one sqlite file, WAL journal mode for concurrent reads
//! during write, a single writer connection guarded by a mutex, and as many
//! read-only connections as callers need (spec.md §4.1).
//!
//! Grounded on `pagi-mimir::storage::MeetingStorage` (single-file sqlite,
//! `OpenFlags`, `pragma_update`) generalized from one table family to the
//! full entity set, and on `pagi-core::knowledge::store::KnowledgeStore`'s
//! "one store, many typed accessors" shape.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use crate::error::{StorageError, StorageResult};
use crate::schema;

/// Bounded retry policy for write-conflict backoff (spec.md §4.1: "write
/// conflicts retry with exponential backoff up to a bounded count, then
/// surface as transient errors").
const MAX_WRITE_RETRIES: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

pub struct Store {
    path: PathBuf,
    writer: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if absent) the sqlite file at `path`, enables WAL, loads
    /// the `sqlite-vec` extension, and applies any pending migrations.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let mut conn = Self::open_connection(&path, true)?;
        schema::run_migrations(&mut conn)?;
        Ok(Self {
            path,
            writer: Mutex::new(conn),
        })
    }

    fn open_connection(path: &Path, writable: bool) -> StorageResult<Connection> {
        let flags = if writable {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        } else {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        };
        let conn = Connection::open_with_flags(path, flags)?;
        unsafe {
            conn.load_extension_enable()?;
            let _ = sqlite_vec::sqlite3_vec_init(); // registers vec0 module process-wide
            conn.load_extension_disable()?;
        }
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_millis(250))?;
        Ok(conn)
    }

    /// A fresh read-only connection. Readers never block the writer and never
    /// observe partial writes, because WAL readers see a consistent snapshot.
    pub fn reader(&self) -> StorageResult<Connection> {
        Self::open_connection(&self.path, false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` against the single writer connection inside a transaction,
    /// retrying on `SQLITE_BUSY`/`SQLITE_LOCKED` with exponential backoff up to
    /// `MAX_WRITE_RETRIES`, after which the conflict surfaces as a transient
    /// `StorageError::WriteConflict` (spec.md §4.1, §7 `TransientUpstream`).
    pub fn write<T>(
        &self,
        f: impl Fn(&rusqlite::Transaction) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempts = 0;
        loop {
            let mut conn = self.writer.lock().expect("writer mutex poisoned");
            let tx = conn.transaction()?;
            match f(&tx) {
                Ok(value) => {
                    tx.commit()?;
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempts < MAX_WRITE_RETRIES => {
                    drop(tx);
                    drop(conn);
                    attempts += 1;
                    std::thread::sleep(backoff);
                    backoff *= 2;
                    continue;
                }
                Err(e) if e.is_corruption() => return Err(e),
                Err(e) if attempts >= MAX_WRITE_RETRIES => {
                    return Err(StorageError::WriteConflict { attempts });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs a blocking storage call on tokio's blocking thread pool rather
    /// than whatever worker thread is currently executing the caller
    /// (spec.md §5: storage reads and writes are suspension points that "may
    /// yield"). The rusqlite connections in this crate are synchronous by
    /// design, matched here to `pagi-mimir::storage`'s pattern of keeping the
    /// sqlite access itself blocking and crossing the async boundary only at
    /// the call site, one `spawn_blocking` per logical operation rather than
    /// per row.
    pub async fn spawn_blocking<F, T>(self: &Arc<Self>, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Store) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        match tokio::task::spawn_blocking(move || f(&store)).await {
            Ok(result) => result,
            Err(join_err) => Err(StorageError::TaskPanicked(join_err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_migrates_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.sqlite3");
        let store = Store::open(&path).unwrap();
        drop(store);
        // Re-opening and re-migrating must not error (idempotence, spec.md §8 property 9).
        let store2 = Store::open(&path).unwrap();
        let conn = store2.reader().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, schema::latest_version());
    }

    #[tokio::test]
    async fn spawn_blocking_runs_off_the_calling_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("core.sqlite3")).unwrap());
        let version = store.spawn_blocking(|s| Ok(s.reader()?.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get::<_, i64>(0))?)).await.unwrap();
        assert_eq!(version, schema::latest_version());
    }

    #[tokio::test]
    async fn spawn_blocking_surfaces_a_panic_as_a_retryable_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("core.sqlite3")).unwrap());
        let result: StorageResult<()> = store.spawn_blocking(|_s| panic!("boom")).await;
        let err = result.unwrap_err();
        assert!(err.is_retryable());
    }
}
