//! Ephemeral per-device session state plus a pub/sub fan-out channel (spec.md
//! §4.2). Generalized from `pagi-core::memory::MemoryManager`'s DashMap hot
//! cache: here the DashMap *is* the store, there's no long-term tier to back
//! it with, and every write refreshes a TTL instead of persisting forever.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::{SessionError, SessionResult};
use crate::types::{DeviceSession, EntityChanged, SessionMode};

const BROADCAST_CAPACITY: usize = 1024;

pub struct SessionStore {
    sessions: Arc<DashMap<String, DeviceSession>>,
    ttl: Duration,
    entity_tx: broadcast::Sender<EntityChanged>,
}

impl SessionStore {
    pub fn new(ttl_seconds: i64) -> Self {
        let (entity_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl: Duration::seconds(ttl_seconds),
            entity_tx,
        }
    }

    /// Every read/write refreshes the TTL uniformly, per spec.md §4.2.
    fn touch(&self, session: &mut DeviceSession) {
        session.expires_at = chrono::Utc::now() + self.ttl;
    }

    pub fn get_or_create(&self, device_id: &str) -> DeviceSession {
        let mut entry = self
            .sessions
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceSession::new(device_id, self.ttl));
        if entry.is_expired() {
            *entry = DeviceSession::new(device_id, self.ttl);
        }
        self.touch(&mut entry);
        entry.clone()
    }

    pub fn set_context(&self, device_id: &str, context: serde_json::Value) {
        let mut entry = self
            .sessions
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceSession::new(device_id, self.ttl));
        entry.context = context;
        self.touch(&mut entry);
    }

    pub fn set_mode(&self, device_id: &str, mode: SessionMode) {
        let mut entry = self
            .sessions
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceSession::new(device_id, self.ttl));
        entry.mode = mode;
        self.touch(&mut entry);
    }

    pub fn set_speaker(&self, device_id: &str, speaker: Option<String>) {
        let mut entry = self
            .sessions
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceSession::new(device_id, self.ttl));
        entry.speaker = speaker;
        self.touch(&mut entry);
    }

    pub fn end(&self, device_id: &str) -> SessionResult<()> {
        self.sessions
            .remove(device_id)
            .map(|_| ())
            .ok_or_else(|| SessionError::NotFound(device_id.to_string()))
    }

    /// Drops every session whose TTL has lapsed. Called by the Request
    /// Orchestrator's maintenance loop, not inline on every access, so a
    /// single slow device can't make every request pay a sweep cost.
    pub fn sweep_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, v| !v.is_expired());
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn subscribe_entity_changes(&self) -> broadcast::Receiver<EntityChanged> {
        self.entity_tx.subscribe()
    }

    /// Called by the Entity Mirror after each state-change event so other
    /// workers invalidate their own per-entity caches (spec.md §4.3).
    pub fn publish_entity_change(&self, change: EntityChanged) {
        // No receivers is fine; broadcast::Sender::send only errors when the
        // channel has zero subscribers, which isn't a failure here.
        let _ = self.entity_tx.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refreshes_ttl_on_write() {
        let store = SessionStore::new(1800);
        let s1 = store.get_or_create("kitchen-echo");
        store.set_mode("kitchen-echo", SessionMode::Conversation);
        let s2 = store.get_or_create("kitchen-echo");
        assert_eq!(s2.mode, SessionMode::Conversation);
        assert!(s2.expires_at >= s1.expires_at);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let store = SessionStore::new(-1);
        store.get_or_create("stale-device");
        let removed = store.sweep_expired();
        assert_eq!(removed, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn entity_change_fans_out_to_subscribers() {
        let store = SessionStore::new(1800);
        let mut rx1 = store.subscribe_entity_changes();
        let mut rx2 = store.subscribe_entity_changes();
        store.publish_entity_change(EntityChanged {
            entity_id: "light.kitchen".into(),
            new_state: "on".into(),
        });
        assert_eq!(rx1.recv().await.unwrap().entity_id, "light.kitchen");
        assert_eq!(rx2.recv().await.unwrap().new_state, "on");
    }
}
