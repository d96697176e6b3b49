//! barnabee-core: binds storage, session, mirror, NLU, executor, signals and
//! evolution into the Request Orchestrator plus the operator-facing CLI
//! (spec.md §4.11, §6). The binary crate is a thin shell over this library so
//! `tests/e2e` can construct an `Orchestrator` directly.

pub mod cli;
pub mod classifier_factory;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod providers;

pub use classifier_factory::LiveClassifierFactory;
pub use config::BarnabeeConfig;
pub use error::{BarnabeeError, BarnabeeResult};
pub use orchestrator::{ExtractedEntities, Orchestrator, OrchestratorRequest, OrchestratorResponse};
pub use providers::{HttpEmbeddingProvider, HttpLlmProvider, PassthroughLocalClassifier};

use std::sync::Arc;

use barnabee_exec::CommandExecutor;
use barnabee_mirror::{EntityMirror, HttpFallback, MirrorConfig};
use barnabee_session::SessionStore;
use barnabee_signals::SignalCollector;
use barnabee_storage::Store;

/// Every long-lived collaborator the CLI's subcommands and the orchestrator
/// share, constructed once at startup from a loaded `BarnabeeConfig`.
pub struct AppContext {
    pub store: Arc<Store>,
    pub sessions: Arc<SessionStore>,
    pub mirror: Arc<EntityMirror>,
    pub orchestrator: Arc<Orchestrator>,
    pub signals: Arc<SignalCollector>,
}

impl AppContext {
    pub fn build(config: &BarnabeeConfig) -> BarnabeeResult<Self> {
        let store = Arc::new(Store::open(&config.sqlite_path)?);
        let sessions = Arc::new(SessionStore::new(config.session_ttl_seconds));

        let mirror_config = MirrorConfig { ws_url: config.ha_ws_url.clone(), access_token: config.ha_access_token.clone() };
        let mirror = Arc::new(EntityMirror::new(Arc::clone(&store), Arc::clone(&sessions), mirror_config));
        let cache = mirror.cache();

        let dispatcher = Arc::new(HttpFallback::new(config.ha_http_url.clone(), config.ha_access_token.clone()));
        let executor = Arc::new(CommandExecutor::new(Arc::clone(&cache), dispatcher));

        let embedding_provider: Arc<dyn barnabee_nlu::providers::EmbeddingProvider> = Arc::new(HttpEmbeddingProvider::new(
            config.embedding_api_base.clone(),
            config.embedding_api_key.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        ));
        let llm_provider: Arc<dyn barnabee_nlu::providers::LlmProvider> =
            Arc::new(HttpLlmProvider::new(config.llm_api_base.clone(), config.llm_api_key.clone(), config.llm_model.clone()));

        let (signals, _signals_handle) = SignalCollector::spawn(Arc::clone(&store));
        let signals = Arc::new(signals);

        let orchestrator = Arc::new(Orchestrator::new(
            config,
            Arc::clone(&store),
            Arc::clone(&sessions),
            cache,
            executor,
            embedding_provider,
            llm_provider,
            Arc::clone(&signals),
        ));

        Ok(Self { store, sessions, mirror, orchestrator, signals })
    }
}
