//! barnabee-nlu: natural-language understanding components #4-7
//! (Text Normalizer, Intent Cascade, Entity Resolver, Context Injector).

pub mod cascade;
mod context_injector;
mod error;
mod intent;
mod normalizer;
pub mod providers;
mod resolver;

pub use context_injector::{ContextEntity, ContextInjector, IntentFamily, DEFAULT_TOKEN_BUDGET};
pub use error::{NluError, NluResult};
pub use intent::{is_known_intent, CandidateIntent, CascadeStage, IntentResult, StageOutcome, INTENT_TAXONOMY};
pub use normalizer::{NormalizationMetadata, NormalizedUtterance, TextNormalizer};
pub use resolver::{EntityResolver, ResolvedEntity, FAST_MATCH_THRESHOLD};
