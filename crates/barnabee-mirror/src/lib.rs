//! barnabee-mirror: the live smart-home entity mirror (component #3,
//! spec.md §4.3). Owns the in-memory view exclusively; persists shallow
//! snapshots via `barnabee-storage` and fans change notifications out
//! through `barnabee-session`'s broadcast channel.

mod cache;
mod client;
mod enrichment;
mod error;
mod http_fallback;
mod mirror;
mod protocol;

pub use cache::EntityCache;
pub use client::Connection;
pub use enrichment::{derive_aliases, derive_keywords};
pub use error::{MirrorError, MirrorResult};
pub use http_fallback::HttpFallback;
pub use mirror::{EntityMirror, MirrorConfig};
pub use protocol::{EventPayload, InboundMessage, OutboundMessage, RawState, StateChangedData};
