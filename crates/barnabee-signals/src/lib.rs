//! barnabee-signals: the Signal Collector (component #9, spec.md §4.9).
//! A bounded in-memory ring buffer decouples the hot request path from the
//! storage write; `record` never blocks and never fails the caller — on
//! overflow it evicts the oldest queued signal in favor of the new one and
//! counts the drop, per spec.md §5 "Backpressure: signal writes drop oldest
//! on overflow". A bounded channel can't give this guarantee (a full `mpsc`
//! channel rejects the *incoming* value, leaving older queued ones in
//! place), so the buffer is a plain `VecDeque` behind a short-lived lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::warn;

use barnabee_storage::{Signal, Store};

const DEFAULT_CAPACITY: usize = 4096;

struct RingBuffer {
    queue: Mutex<VecDeque<Signal>>,
    notify: Notify,
    capacity: usize,
}

pub struct SignalCollector {
    buffer: Arc<RingBuffer>,
    dropped: Arc<AtomicU64>,
}

impl SignalCollector {
    /// Spawns the background drain task and returns a handle plus a join
    /// handle the caller should keep for graceful shutdown.
    pub fn spawn(store: Arc<Store>) -> (Self, tokio::task::JoinHandle<()>) {
        Self::spawn_with_capacity(store, DEFAULT_CAPACITY)
    }

    pub fn spawn_with_capacity(store: Arc<Store>, capacity: usize) -> (Self, tokio::task::JoinHandle<()>) {
        let buffer = Arc::new(RingBuffer { queue: Mutex::new(VecDeque::with_capacity(capacity)), notify: Notify::new(), capacity });
        let dropped = Arc::new(AtomicU64::new(0));
        let drain_buffer = Arc::clone(&buffer);

        let handle = tokio::spawn(async move {
            loop {
                let next = drain_buffer.queue.lock().unwrap().pop_front();
                match next {
                    Some(signal) => {
                        let signal_id = signal.id;
                        if let Err(err) = store.spawn_blocking(move |s| s.record_signal(&signal)).await {
                            warn!(error = %err, signal_id = %signal_id, "failed to persist signal");
                        }
                    }
                    None => drain_buffer.notify.notified().await,
                }
            }
        });

        (Self { buffer, dropped }, handle)
    }

    /// Fire-and-forget: if the buffer is full, the oldest queued signal is
    /// evicted to make room for this one. Never blocks the caller.
    pub fn record(&self, signal: Signal) {
        let mut queue = self.buffer.queue.lock().unwrap();
        if queue.len() >= self.buffer.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(signal);
        drop(queue);
        self.buffer.notify.notify_one();
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Clone for SignalCollector {
    fn clone(&self) -> Self {
        Self { buffer: Arc::clone(&self.buffer), dropped: Arc::clone(&self.dropped) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barnabee_storage::SignalKind;
    use chrono::Utc;
    use tempfile::NamedTempFile;
    use uuid::Uuid;

    fn test_signal() -> Signal {
        Signal {
            id: Uuid::new_v4(),
            kind: SignalKind::LowConfidence,
            utterance: "turn on the kitchen light".into(),
            normalized_text: "turn on kitchen light".into(),
            context: serde_json::json!({}),
            expected_outcome: None,
            actual_outcome: None,
            stage_reached: Some("s2_embedding".into()),
            confidence: Some(0.6),
            processed: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_are_drained_and_persisted() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::open(tmp.path()).unwrap());
        let (collector, _handle) = SignalCollector::spawn(Arc::clone(&store));

        collector.record(test_signal());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let unprocessed = store.unprocessed_signals(10).unwrap();
        assert_eq!(unprocessed.len(), 1);
    }

    #[tokio::test]
    async fn overflow_increments_drop_counter() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::open(tmp.path()).unwrap());
        let (collector, _handle) = SignalCollector::spawn_with_capacity(Arc::clone(&store), 1);

        for _ in 0..50 {
            collector.record(test_signal());
        }
        assert!(collector.dropped_count() > 0);
    }

    #[tokio::test]
    async fn overflow_keeps_the_newest_signal_not_the_oldest() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::open(tmp.path()).unwrap());
        let (collector, _handle) = SignalCollector::spawn_with_capacity(Arc::clone(&store), 1);

        let mut oldest = test_signal();
        oldest.normalized_text = "oldest".into();
        let mut newest = test_signal();
        newest.normalized_text = "newest".into();

        // No await between these two calls: the drain task cannot have run
        // yet, so this exercises the buffer's own eviction, not a race with
        // the writer.
        collector.record(oldest);
        collector.record(newest);
        assert_eq!(collector.dropped_count(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let unprocessed = store.unprocessed_signals(10).unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(unprocessed[0].normalized_text, "newest");
    }
}
