//! Short-TTL lock primitive (spec.md §4.2, §5 "Backpressure"). Serializes
//! concurrent speculative executions against the same entity. "Distributed"
//! in name only — within a single process it's a DashMap entry with an
//! expiry, the in-process analogue of the lock a multi-node deployment would
//! need in the session store's backing KV.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

struct LockEntry {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct LockTable {
    locks: Arc<DashMap<String, LockEntry>>,
    default_ttl: Duration,
}

impl LockTable {
    pub fn new(default_ttl_seconds: i64) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            default_ttl: Duration::seconds(default_ttl_seconds),
        }
    }

    /// Attempts to acquire the lock for `key`. Returns a token that must be
    /// presented to `release`; an expired holder is treated as absent.
    pub fn try_acquire(&self, key: &str) -> SessionResult<String> {
        let now = Utc::now();
        match self.locks.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) if occupied.get().expires_at > now => {
                Err(SessionError::LockContended(key.to_string()))
            }
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let token = Uuid::new_v4().to_string();
                occupied.insert(LockEntry { token: token.clone(), expires_at: now + self.default_ttl });
                Ok(token)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let token = Uuid::new_v4().to_string();
                vacant.insert(LockEntry { token: token.clone(), expires_at: now + self.default_ttl });
                Ok(token)
            }
        }
    }

    pub fn release(&self, key: &str, token: &str) -> SessionResult<()> {
        let removed = self
            .locks
            .remove_if(key, |_, entry| entry.token == token)
            .is_some();
        if removed {
            Ok(())
        } else {
            Err(SessionError::LockContended(key.to_string()))
        }
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.locks
            .get(key)
            .map(|e| e.expires_at > Utc::now())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_contended_until_release() {
        let table = LockTable::new(30);
        let token = table.try_acquire("light.kitchen").unwrap();
        assert!(table.try_acquire("light.kitchen").is_err());
        table.release("light.kitchen", &token).unwrap();
        assert!(table.try_acquire("light.kitchen").is_ok());
    }

    #[test]
    fn expired_lock_is_reacquirable() {
        let table = LockTable::new(-1);
        table.try_acquire("lock.front_door").unwrap();
        assert!(!table.is_locked("lock.front_door"));
        assert!(table.try_acquire("lock.front_door").is_ok());
    }
}
