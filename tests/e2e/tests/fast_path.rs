//! End-to-end scenario 1 (spec.md §8): a fast-path command never touches the
//! classifier's S2-S4 stages and never reaches the executor when its intent
//! has no service mapping.

use std::sync::Arc;

use barnabee_core::config::BarnabeeConfig;
use barnabee_core::orchestrator::{Orchestrator, OrchestratorRequest};
use barnabee_e2e::{FakeEmbeddingProvider, FakeLlmProvider};
use barnabee_exec::CommandExecutor;
use barnabee_mirror::{EntityCache, HttpFallback};
use barnabee_session::SessionStore;
use barnabee_signals::SignalCollector;
use barnabee_storage::Store;

fn test_config() -> BarnabeeConfig {
    BarnabeeConfig {
        sqlite_path: ":memory:".to_string(),
        session_ttl_seconds: 1800,
        embedding_model: "fake".to_string(),
        embedding_dimension: 8,
        fast_threshold: 0.95,
        embedding_threshold: 0.85,
        local_threshold: 0.80,
        low_confidence_threshold: 0.70,
        speculative_confidence_threshold: 0.98,
        speculative_head_start_ms: 100,
        request_deadline_ms: 2000,
        improvement_monitoring_hours: 24,
        rollback_accuracy_drop: 0.02,
        rollback_latency_ms: 50,
        rollback_error_rate: 0.05,
        cluster_similarity: 0.85,
        cluster_min_size: 3,
        context_token_budget: 500,
        ha_ws_url: "ws://unused.invalid".to_string(),
        ha_http_url: "http://unused.invalid".to_string(),
        ha_access_token: "unused".to_string(),
        llm_api_base: "http://unused.invalid".to_string(),
        llm_api_key: "unused".to_string(),
        llm_model: "unused".to_string(),
        embedding_api_base: "http://unused.invalid".to_string(),
        embedding_api_key: "unused".to_string(),
    }
}

#[tokio::test]
async fn direct_command_fast_path_never_dispatches() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let store = Arc::new(Store::open(dir.path().join("core.sqlite3")).unwrap());
    let sessions = Arc::new(SessionStore::new(config.session_ttl_seconds));
    let cache = Arc::new(EntityCache::new());
    let dispatcher = Arc::new(HttpFallback::new(config.ha_http_url.clone(), config.ha_access_token.clone()));
    let executor = Arc::new(CommandExecutor::new(Arc::clone(&cache), dispatcher));
    let embedding_provider: Arc<dyn barnabee_nlu::providers::EmbeddingProvider> = Arc::new(FakeEmbeddingProvider::new(8));
    let llm_provider: Arc<dyn barnabee_nlu::providers::LlmProvider> = Arc::new(FakeLlmProvider);
    let (signals, _handle) = SignalCollector::spawn(Arc::clone(&store));

    let orchestrator = Orchestrator::new(
        &config,
        store,
        sessions,
        cache,
        executor,
        embedding_provider,
        llm_provider,
        Arc::new(signals),
    );

    let response = orchestrator
        .handle(OrchestratorRequest {
            utterance_text: "barnabee what time is it please".to_string(),
            device_id: "office-hub".to_string(),
            speaker_id: None,
            conversation_id: None,
        })
        .await
        .expect("fast-path request must succeed");

    assert_eq!(response.intent, "information.time");
    assert_eq!(response.stage, "s1_fast_pattern");
    assert!(response.confidence >= 0.95);
    assert!(response.executor_result.is_none(), "time_query has no service mapping and must never dispatch");
}
