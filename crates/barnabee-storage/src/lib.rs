//! barnabee-storage: the embedded relational store (component #1, spec.md
//! §4.1) plus the entity repositories layered on top of it.
//!
//! One sqlite file, WAL journal mode, FTS5 full-text indexes, and a `vec0`
//! vector index per embedding model. Grounded on `pagi-mimir::storage` (single
//! sqlite file, migrations-on-open) and `pagi-core::knowledge::store` (one
//! store, many typed accessors), generalized from sled trees to sqlite tables
//! because the spec requires B-tree, full-text, and vector indexes
//! cooperating inside the same file — something sled cannot provide.

mod conversations;
mod entities;
mod error;
mod golden;
mod hybrid_search;
mod logs;
mod memories;
mod mirror_cache;
mod schema;
mod signals_store;
mod improvements_store;
mod store;
mod vector_index;

pub use entities::*;
pub use error::{StorageError, StorageResult};
pub use golden::GOLDEN_DATASET_MINIMUM;
pub use hybrid_search::HybridResult;
pub use memories::{blob_to_vector, vector_to_blob};
pub use schema::latest_version as latest_schema_version;
pub use store::Store;
