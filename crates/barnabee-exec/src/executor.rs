//! Command Executor (component #8, spec.md §4.8). Validates targets,
//! builds payloads, dispatches over the HTTP fallback path (the shared
//! websocket connection stays dedicated to the Entity Mirror's event
//! stream), and races safe, high-confidence intents speculatively ahead of
//! response generation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;

use barnabee_mirror::{EntityCache, HttpFallback};
use barnabee_session::LockTable;

use crate::error::{ExecError, ExecResult};
use crate::service_map::{build_payload, map_intent, supports_batched_target, CommandSlots};
use crate::task_registry::CancellationFlag;

pub const EXECUTOR_DEADLINE: Duration = Duration::from_millis(500);
const RETRY_BACKOFF: Duration = Duration::from_millis(200);
pub const SPECULATIVE_CONFIDENCE_THRESHOLD: f32 = 0.98;
pub const SPECULATIVE_HEAD_START: Duration = Duration::from_millis(100);
const ENTITY_LOCK_TTL_SECONDS: i64 = 30;

/// Intents eligible for speculative execution (spec.md §4.8 "safe set").
/// Lock/security, scenes, memory creation, and anything destructive or
/// authentication-sensitive are never speculative.
const SPECULATIVE_SAFE_SET: &[&str] =
    &["home_control.light", "home_control.climate", "home_control.media", "home_control.cover", "information.time", "information.weather"];

pub fn is_speculation_eligible(intent: &str, confidence: f32) -> bool {
    confidence >= SPECULATIVE_CONFIDENCE_THRESHOLD && SPECULATIVE_SAFE_SET.contains(&intent)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorResult {
    pub success: bool,
    pub entity_ids: Vec<String>,
    pub action: String,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

pub struct CommandExecutor {
    pub cache: Arc<EntityCache>,
    pub dispatcher: Arc<HttpFallback>,
    pub locks: Arc<LockTable>,
}

impl CommandExecutor {
    pub fn new(cache: Arc<EntityCache>, dispatcher: Arc<HttpFallback>) -> Self {
        Self { cache, dispatcher, locks: Arc::new(LockTable::new(ENTITY_LOCK_TTL_SECONDS)) }
    }

    pub async fn execute(
        &self,
        intent: &str,
        entity_ids: &[String],
        slots: &CommandSlots,
        cancel: Option<CancellationFlag>,
    ) -> ExecResult<ExecutorResult> {
        let started = Instant::now();
        let target = map_intent(intent).ok_or_else(|| ExecError::UnmappedIntent(intent.to_string()))?;

        let available: Vec<String> = entity_ids
            .iter()
            .filter(|id| self.cache.get_by_id(id).map(|e| e.is_available()).unwrap_or(false))
            .cloned()
            .collect();
        if available.is_empty() {
            return Err(ExecError::EntityUnavailable(entity_ids.join(",")));
        }

        let deadline = async {
            let payload = build_payload(&target, slots);
            if supports_batched_target(target.domain) && available.len() > 1 {
                self.dispatch_batched(&target, &available, &payload, cancel.clone()).await
            } else {
                self.dispatch_individually(&target, &available, &payload, cancel.clone()).await
            }
        };

        match tokio::time::timeout(EXECUTOR_DEADLINE, deadline).await {
            Ok((succeeded, failures)) => Ok(ExecutorResult {
                success: !succeeded.is_empty(),
                entity_ids: succeeded,
                action: format!("{}.{}", target.domain, target.service),
                error: if failures.is_empty() { None } else { Some(failures.join("; ")) },
                execution_time_ms: started.elapsed().as_millis() as u64,
            }),
            Err(_) => Err(ExecError::DeadlineExceeded),
        }
    }

    async fn dispatch_batched(
        &self,
        target: &crate::service_map::ServiceTarget,
        entity_ids: &[String],
        payload: &serde_json::Value,
        cancel: Option<CancellationFlag>,
    ) -> (Vec<String>, Vec<String>) {
        let mut payload = payload.clone();
        payload["entity_id"] = json!(entity_ids);

        match self.call_with_retry(target, &payload, cancel).await {
            Ok(()) => (entity_ids.to_vec(), Vec::new()),
            Err(err) => (Vec::new(), vec![err.to_string()]),
        }
    }

    async fn dispatch_individually(
        &self,
        target: &crate::service_map::ServiceTarget,
        entity_ids: &[String],
        payload: &serde_json::Value,
        cancel: Option<CancellationFlag>,
    ) -> (Vec<String>, Vec<String>) {
        let mut succeeded = Vec::new();
        let mut failures = Vec::new();

        for entity_id in entity_ids {
            if cancel.as_ref().map(CancellationFlag::is_cancelled).unwrap_or(false) {
                failures.push(format!("{entity_id}: cancelled"));
                continue;
            }
            let Ok(lock_token) = self.locks.try_acquire(entity_id) else {
                failures.push(format!("{entity_id}: locked by a concurrent command"));
                continue;
            };

            let mut scoped_payload = payload.clone();
            scoped_payload["entity_id"] = json!(entity_id);

            match self.call_with_retry(target, &scoped_payload, cancel.clone()).await {
                Ok(()) => succeeded.push(entity_id.clone()),
                Err(err) => failures.push(format!("{entity_id}: {err}")),
            }
            let _ = self.locks.release(entity_id, &lock_token);
        }

        (succeeded, failures)
    }

    /// Transport-level errors retry once after a 200ms backoff (spec.md §4.8
    /// "Failure semantics").
    async fn call_with_retry(
        &self,
        target: &crate::service_map::ServiceTarget,
        payload: &serde_json::Value,
        cancel: Option<CancellationFlag>,
    ) -> ExecResult<()> {
        match self.dispatcher.call_service(target.domain, target.service, payload).await {
            Ok(()) => Ok(()),
            Err(_) if cancel.as_ref().map(CancellationFlag::is_cancelled).unwrap_or(false) => {
                Err(ExecError::Cancelled(target.domain.to_string()))
            }
            Err(_) => {
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.dispatcher.call_service(target.domain, target.service, payload).await.map_err(ExecError::from)
            }
        }
    }
}
