//! Registry of in-flight speculative tasks, keyed by request identifier
//! (spec.md §4.8 "Each speculative task is registered by request identifier
//! so a later classification change ... can cancel the in-flight call").
//! Cancellation is cooperative: a flag checked between I/O operations, not a
//! hard task abort (spec.md §5 "Cancellation and timeouts").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

#[derive(Clone)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, CancellationFlag>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new speculative task for `request_id` and returns its
    /// cancellation flag. At most one speculative task per (entity, intent)
    /// pair is live (spec.md §8 property 5): callers key `request_id`
    /// accordingly, so registering a second task under the same key cancels
    /// whatever task is still running under it — the superseding
    /// classification this key belongs to takes priority over the stale one.
    pub fn register(&self, request_id: &str) -> CancellationFlag {
        if let Some(stale) = self.tasks.get(request_id) {
            stale.cancel();
        }
        let flag = CancellationFlag::new();
        self.tasks.insert(request_id.to_string(), flag.clone());
        flag
    }

    pub fn cancel(&self, request_id: &str) -> bool {
        if let Some(flag) = self.tasks.get(request_id) {
            flag.cancel();
            true
        } else {
            false
        }
    }

    pub fn complete(&self, request_id: &str) {
        self.tasks.remove(request_id);
    }

    pub fn is_live(&self, request_id: &str) -> bool {
        self.tasks.contains_key(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flips_the_flag_observed_by_the_task() {
        let registry = TaskRegistry::new();
        let flag = registry.register("req-1");
        assert!(!flag.is_cancelled());
        registry.cancel("req-1");
        assert!(flag.is_cancelled());
    }

    #[test]
    fn complete_removes_from_registry() {
        let registry = TaskRegistry::new();
        registry.register("req-2");
        assert!(registry.is_live("req-2"));
        registry.complete("req-2");
        assert!(!registry.is_live("req-2"));
    }

    #[test]
    fn registering_the_same_key_twice_cancels_the_stale_task() {
        let registry = TaskRegistry::new();
        let first = registry.register("req-3");
        assert!(!first.is_cancelled());
        let second = registry.register("req-3");
        assert!(first.is_cancelled(), "a superseding registration must cancel the task it replaces");
        assert!(!second.is_cancelled());
    }
}
