//! Request Orchestrator (component #11, spec.md §2 row 11). Binds every
//! other component into the single per-utterance control flow: normalize,
//! classify, extract and resolve entities, execute, respond. Grounded on
//! `pagi-core::orchestrator::protocols`'s sequential-phase shape — the same
//! pattern the Entity Resolver already follows for its own two phases.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use barnabee_exec::{is_speculation_eligible, CommandExecutor, CommandSlots, ExecutorResult, TaskRegistry, SPECULATIVE_HEAD_START};
use barnabee_mirror::EntityCache;
use barnabee_nlu::cascade::IntentCascade;
use barnabee_nlu::providers::{EmbeddingProvider, LlmProvider};
use barnabee_nlu::{EntityResolver, ResolvedEntity, TextNormalizer};
use barnabee_session::{SessionMode, SessionStore};
use barnabee_signals::SignalCollector;
use barnabee_storage::{Store, Turn, TurnRole};

use crate::classifier_factory::LiveClassifierFactory;
use crate::config::BarnabeeConfig;
use crate::error::{BarnabeeError, BarnabeeResult};
use crate::providers::PassthroughLocalClassifier;

#[derive(Debug, Clone)]
pub struct OrchestratorRequest {
    pub utterance_text: String,
    pub device_id: String,
    pub speaker_id: Option<String>,
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractedEntities {
    pub devices: Vec<String>,
    pub locations: Vec<String>,
    pub times: Vec<String>,
    pub durations: Vec<String>,
    pub people: Vec<String>,
    #[serde(default)]
    pub raw_slots: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorResponse {
    pub intent: String,
    pub confidence: f32,
    pub entities: ExtractedEntities,
    pub response_text: String,
    pub executor_result: Option<ExecutorResult>,
    pub latency_ms: u64,
    pub stage: String,
}

/// Mirrors session-mode intents onto the Session Store's mode field (spec.md
/// §4.2). Everything else leaves the current mode untouched.
fn mode_for_intent(intent: &str) -> Option<SessionMode> {
    Some(match intent {
        "mode.conversation_start" => SessionMode::Conversation,
        "mode.conversation_end" => SessionMode::Command,
        "mode.notes_start" => SessionMode::Notes,
        "mode.notes_end" => SessionMode::Command,
        "mode.journal_start" => SessionMode::Journal,
        "mode.journal_end" => SessionMode::Command,
        "mode.ambient_start" => SessionMode::Ambient,
        "mode.ambient_end" => SessionMode::Command,
        _ => return None,
    })
}

fn domain_for_intent(intent: &str) -> Option<&'static str> {
    Some(match intent {
        "home_control.light" => "light",
        "home_control.climate" => "climate",
        "home_control.lock" => "lock",
        "home_control.cover" => "cover",
        "home_control.media" => "media_player",
        "home_control.scene" => "scene",
        _ => return None,
    })
}

fn slots_from_raw(raw: &Value) -> CommandSlots {
    serde_json::from_value(raw.clone()).unwrap_or_default()
}

fn default_response_text(intent: &str, resolved: Option<&ResolvedEntity>, executor_result: Option<&ExecutorResult>) -> String {
    if let Some(result) = executor_result {
        let device = resolved.map(|r| r.friendly_name.as_str()).unwrap_or("that device");
        return if result.success {
            format!("Done, {device} is updated.")
        } else {
            format!("I couldn't reach {device}: {}", result.error.as_deref().unwrap_or("unknown error"))
        };
    }
    match intent {
        "conversation.greeting" => "Hello.".to_string(),
        "conversation.farewell" => "Goodbye.".to_string(),
        "system.unknown" => "I didn't catch that.".to_string(),
        _ => "Okay.".to_string(),
    }
}

const ENTITY_EXTRACTION_SYSTEM_PROMPT: &str =
    "Extract device mentions, locations, times, durations, and people from the utterance. \
     Return empty arrays for anything not mentioned.";

fn entity_extraction_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "devices": {"type": "array", "items": {"type": "string"}},
            "locations": {"type": "array", "items": {"type": "string"}},
            "times": {"type": "array", "items": {"type": "string"}},
            "durations": {"type": "array", "items": {"type": "string"}},
            "people": {"type": "array", "items": {"type": "string"}},
            "raw_slots": {"type": "object"},
        },
        "required": ["devices", "locations", "times", "durations", "people", "raw_slots"],
    })
}

pub struct Orchestrator {
    store: Arc<Store>,
    sessions: Arc<SessionStore>,
    cache: Arc<EntityCache>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    llm_provider: Arc<dyn LlmProvider>,
    classifier_factory: Arc<LiveClassifierFactory>,
    normalizer: TextNormalizer,
    executor: Arc<CommandExecutor>,
    signals: Arc<SignalCollector>,
    task_registry: Arc<TaskRegistry>,
    conversation_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    request_deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        config: &BarnabeeConfig,
        store: Arc<Store>,
        sessions: Arc<SessionStore>,
        cache: Arc<EntityCache>,
        executor: Arc<CommandExecutor>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        llm_provider: Arc<dyn LlmProvider>,
        signals: Arc<SignalCollector>,
    ) -> Self {
        let classifier_factory = Arc::new(LiveClassifierFactory::new(Arc::clone(&store), Arc::clone(&embedding_provider), Arc::clone(&llm_provider)));
        Self {
            store,
            sessions,
            cache,
            embedding_provider,
            llm_provider,
            classifier_factory,
            normalizer: TextNormalizer::default(),
            executor,
            signals,
            task_registry: Arc::new(TaskRegistry::new()),
            conversation_locks: DashMap::new(),
            request_deadline: Duration::from_millis(config.request_deadline_ms),
        }
    }

    /// Shared with the CLI's `improve-now` path and the hourly monitor, so
    /// the nightly pipeline shadow-tests against the same live centroid
    /// state this orchestrator classifies against.
    pub fn classifier_factory(&self) -> Arc<LiveClassifierFactory> {
        Arc::clone(&self.classifier_factory)
    }

    fn conversation_lock(&self, device_id: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.conversation_locks.entry(device_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).value())
    }

    /// Handles one utterance end to end (spec.md §6 "Downstream (exposed)").
    /// A second turn on the same device cannot begin executing until this
    /// one's response is emitted (spec.md §5): callers serialize on the
    /// per-device lock this acquires first.
    pub async fn handle(&self, request: OrchestratorRequest) -> BarnabeeResult<OrchestratorResponse> {
        let lock = self.conversation_lock(&request.device_id);
        let _guard = lock.lock().await;

        match tokio::time::timeout(self.request_deadline, self.handle_locked(&request)).await {
            Ok(result) => result,
            Err(_) => Err(BarnabeeError::Timeout),
        }
    }

    async fn handle_locked(&self, request: &OrchestratorRequest) -> BarnabeeResult<OrchestratorResponse> {
        let started = Instant::now();
        let session = self.sessions.get_or_create(&request.device_id);
        if request.speaker_id.is_some() {
            self.sessions.set_speaker(&request.device_id, request.speaker_id.clone());
        }

        let normalized = self.normalizer.normalize(&request.utterance_text);
        let centroids = self.classifier_factory.snapshot();
        let local_model = PassthroughLocalClassifier;
        let cascade = IntentCascade {
            embedding_provider: self.embedding_provider.as_ref(),
            llm_provider: self.llm_provider.as_ref(),
            local_model: &local_model,
            centroids: &centroids,
            signals: Some(Arc::clone(&self.signals)),
        };
        let classified = cascade.classify(&request.utterance_text, &normalized.normalized_text).await?;

        if let Some(mode) = mode_for_intent(&classified.intent) {
            self.sessions.set_mode(&request.device_id, mode);
        }

        let entities = self.extract_entities(&normalized.normalized_text).await?;

        let resolved = self.resolve_primary_entity(&entities, &classified.intent).await?;

        let executor_result = match (&resolved, domain_for_intent(&classified.intent)) {
            (Some(resolved), Some(_)) => {
                self.dispatch(&classified.intent, classified.confidence, resolved, &entities, &session, request).await?
            }
            _ => None,
        };

        let response_text = default_response_text(&classified.intent, resolved.as_ref(), executor_result.as_ref());

        if let Err(err) = self.record_turns(request, &classified.intent, classified.confidence, &entities, &response_text, started).await {
            tracing::warn!(error = %err, "failed to persist conversation turn");
        }

        Ok(OrchestratorResponse {
            intent: classified.intent,
            confidence: classified.confidence,
            entities,
            response_text,
            executor_result,
            latency_ms: started.elapsed().as_millis() as u64,
            stage: classified.stage.as_str().to_string(),
        })
    }

    async fn extract_entities(&self, normalized_text: &str) -> BarnabeeResult<ExtractedEntities> {
        let schema = entity_extraction_schema();
        match self.llm_provider.complete_json(ENTITY_EXTRACTION_SYSTEM_PROMPT, normalized_text, &schema).await {
            Ok(value) => Ok(serde_json::from_value(value).unwrap_or_default()),
            // Entity extraction is best-effort context, not a classification
            // decision: an upstream hiccup degrades to "no entities found"
            // rather than failing the whole request (spec.md §7 "Degraded
            // service" policy).
            Err(_) => Ok(ExtractedEntities::default()),
        }
    }

    async fn resolve_primary_entity(&self, entities: &ExtractedEntities, intent: &str) -> BarnabeeResult<Option<ResolvedEntity>> {
        let Some(mention) = entities.devices.first() else { return Ok(None) };
        let resolver = EntityResolver { cache: self.cache.as_ref(), store: Arc::clone(&self.store), llm_provider: self.llm_provider.as_ref() };
        let speaker_area = entities.locations.first().map(String::as_str);
        Ok(resolver.resolve(mention, intent, domain_for_intent(intent), speaker_area).await?)
    }

    /// Speculative execution is gated on a known speaker (spec.md §9 Open
    /// Questions): an unauthenticated device must never race a side-effecting
    /// call ahead of the turn that confirms it.
    ///
    /// The speculative call is spawned immediately, right after
    /// classification, and runs concurrently with whatever this orchestrator
    /// still has to do before it can reply (spec.md §4.8 "the executor begins
    /// the service call immediately ... and races it against the response
    /// pipeline with a 100 ms head-start budget"). We wait on it for at most
    /// `SPECULATIVE_HEAD_START`: if it finishes inside that budget its result
    /// is returned as normal, otherwise we stop waiting and let it complete
    /// in the background so a slow downstream call never adds its own
    /// latency on top of the budget.
    async fn dispatch(
        &self,
        intent: &str,
        confidence: f32,
        resolved: &ResolvedEntity,
        entities: &ExtractedEntities,
        session: &barnabee_session::DeviceSession,
        request: &OrchestratorRequest,
    ) -> BarnabeeResult<Option<ExecutorResult>> {
        let slots = slots_from_raw(&entities.raw_slots);
        let entity_ids = vec![resolved.entity_id.clone()];

        if is_speculation_eligible(intent, confidence) && session.speaker.is_some() {
            let request_id = format!("{}:{}:{}", request.device_id, resolved.entity_id, intent);
            let cancel = self.task_registry.register(&request_id);

            let executor = Arc::clone(&self.executor);
            let task_registry = Arc::clone(&self.task_registry);
            let request_id_for_task = request_id.clone();
            let intent_owned = intent.to_string();
            let handle = tokio::spawn(async move {
                let result = executor.execute(&intent_owned, &entity_ids, &slots, Some(cancel)).await;
                task_registry.complete(&request_id_for_task);
                result
            });

            match tokio::time::timeout(SPECULATIVE_HEAD_START, handle).await {
                Ok(Ok(result)) => Ok(Some(result?)),
                Ok(Err(_)) => Err(BarnabeeError::TransientUpstream("speculative execution task panicked".to_string())),
                // Still running past the head-start budget: leave it to finish
                // on its own (the spawned task completes the registry entry
                // itself) and answer this turn without its result.
                Err(_) => Ok(None),
            }
        } else {
            Ok(Some(self.executor.execute(intent, &entity_ids, &slots, None).await?))
        }
    }

    async fn record_turns(
        &self,
        request: &OrchestratorRequest,
        intent: &str,
        confidence: f32,
        entities: &ExtractedEntities,
        response_text: &str,
        started: Instant,
    ) -> BarnabeeResult<()> {
        let conversation_id = request.conversation_id;
        let device_id = request.device_id.clone();
        let conversation = self
            .store
            .spawn_blocking(move |s| match conversation_id {
                Some(id) => match s.get_conversation(id)? {
                    Some(conversation) => Ok(conversation),
                    None => s.open_conversation(&device_id),
                },
                None => s.open_conversation(&device_id),
            })
            .await?;
        let latency_ms = Some(started.elapsed().as_millis() as i64);

        let user_turn = Turn {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            role: TurnRole::User,
            text: request.utterance_text.clone(),
            intent: Some(intent.to_string()),
            confidence: Some(confidence),
            entities: serde_json::to_value(entities).unwrap_or(Value::Null),
            latency_ms,
            created_at: chrono::Utc::now(),
        };
        self.store.spawn_blocking(move |s| s.append_turn(&user_turn)).await?;

        let assistant_turn = Turn {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            role: TurnRole::Assistant,
            text: response_text.to_string(),
            intent: None,
            confidence: None,
            entities: Value::Null,
            latency_ms,
            created_at: chrono::Utc::now(),
        };
        self.store.spawn_blocking(move |s| s.append_turn(&assistant_turn)).await?;
        Ok(())
    }
}
