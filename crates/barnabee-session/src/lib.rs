//! barnabee-session: per-device ephemeral conversation state (component #2,
//! spec.md §4.2). A DashMap-backed store with uniform TTL refresh, a
//! broadcast channel the Entity Mirror uses to fan state changes to workers,
//! and a short-TTL lock table the Command Executor uses to serialize
//! speculative executions against the same entity.

mod error;
mod lock;
mod store;
mod types;

pub use error::{SessionError, SessionResult};
pub use lock::LockTable;
pub use store::SessionStore;
pub use types::{DeviceSession, EntityChanged, SessionMode};
