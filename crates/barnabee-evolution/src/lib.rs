//! barnabee-evolution: the Improvement Pipeline (component #10, spec.md
//! §4.10). Clusters production signals, proposes data-only improvements,
//! shadow-tests them against the golden dataset, applies tier-1 passes
//! automatically, and monitors deployed changes for rollback.

mod clustering;
mod error;
mod monitor;
mod pipeline;
mod proposal;
mod shadow;

pub use clustering::{cluster_signals, SignalCluster};
pub use error::{EvolutionError, EvolutionResult};
pub use monitor::{rollback_reason, MetricsWindow, RollbackThresholds};
pub use pipeline::{CandidateClassifierFactory, ImprovementPipeline, PipelineConfig};
pub use proposal::{propose_for_cluster, propose_from_user_suggestion};
pub use shadow::{run_shadow_test, ClassifierUnderTest, ShadowTestReport};
