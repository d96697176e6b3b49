//! barnabee-exec: the Command Executor (component #8, spec.md §4.8).
//! Turns a classified intent plus resolved entities into dispatched
//! service calls, with speculative execution for safe, high-confidence
//! intents.

mod error;
mod executor;
mod service_map;
mod task_registry;

pub use error::{ExecError, ExecResult};
pub use executor::{
    is_speculation_eligible, CommandExecutor, ExecutorResult, EXECUTOR_DEADLINE,
    SPECULATIVE_CONFIDENCE_THRESHOLD, SPECULATIVE_HEAD_START,
};
pub use service_map::{build_payload, map_intent, supports_batched_target, CommandSlots, ServiceTarget};
pub use task_registry::{CancellationFlag, TaskRegistry};
