//! Ties the websocket client, enrichment, cache, storage, and session-store
//! pub/sub together into the Entity Mirror component (spec.md §4.3).
//! Reconnect-forever is modeled on `pagi-federation`'s satellite connect loop,
//! generalized to an exponential-with-cap backoff since this connection must
//! never give up permanently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use barnabee_session::{EntityChanged, SessionStore};
use barnabee_storage::{MirroredEntity, Store};

use crate::cache::EntityCache;
use crate::client::Connection;
use crate::enrichment::{derive_aliases, derive_keywords};
use crate::error::MirrorResult;
use crate::protocol::{RawState, StateChangedData};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct MirrorConfig {
    pub ws_url: String,
    pub access_token: String,
}

pub struct EntityMirror {
    cache: Arc<EntityCache>,
    store: Arc<Store>,
    sessions: Arc<SessionStore>,
    config: MirrorConfig,
}

impl EntityMirror {
    pub fn new(store: Arc<Store>, sessions: Arc<SessionStore>, config: MirrorConfig) -> Self {
        Self { cache: Arc::new(EntityCache::new()), store, sessions, config }
    }

    /// Shared with the Command Executor and Entity Resolver so all three
    /// components read the same in-memory snapshot (spec.md §4.3, §4.6, §4.8).
    pub fn cache(&self) -> Arc<EntityCache> {
        Arc::clone(&self.cache)
    }

    /// Runs forever: connect, bulk fetch, subscribe, consume events; on any
    /// disconnect, reconnect with exponential backoff capped at 60s, and
    /// always re-does the bulk fetch before resuming event consumption
    /// (spec.md §4.3: "no attempt at delta replay").
    pub async fn run(&self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.connect_and_serve().await {
                Ok(()) => {
                    backoff = INITIAL_BACKOFF;
                }
                Err(err) => {
                    warn!(error = %err, backoff_ms = backoff.as_millis(), "entity mirror connection lost, reconnecting");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_and_serve(&self) -> MirrorResult<()> {
        let mut conn = Connection::connect(&self.config.ws_url, &self.config.access_token).await?;
        info!("entity mirror authenticated, performing bulk fetch");

        let states = conn.bulk_fetch().await?;
        self.absorb_bulk_fetch(states).await?;

        conn.subscribe_state_changed().await?;
        info!(entities = self.cache.len(), "entity mirror subscribed to state_changed events");

        loop {
            let event = conn.next_state_changed().await?;
            self.handle_event(event).await?;
        }
    }

    async fn absorb_bulk_fetch(&self, states: Vec<RawState>) -> MirrorResult<()> {
        let entities: Vec<MirroredEntity> = states.into_iter().map(|s| self.enrich(s)).collect();
        for entity in &entities {
            self.persist_entity(entity).await?;
        }
        self.cache.replace_all(entities);
        Ok(())
    }

    async fn persist_entity(&self, entity: &MirroredEntity) -> MirrorResult<()> {
        let entity_owned = entity.clone();
        self.store.spawn_blocking(move |s| s.upsert_mirrored_entity(&entity_owned)).await?;
        self.persist_aliases(entity).await
    }

    async fn persist_aliases(&self, entity: &MirroredEntity) -> MirrorResult<()> {
        for alias in &entity.aliases {
            let entity_id = entity.entity_id.clone();
            let alias = alias.clone();
            self.store.spawn_blocking(move |s| s.add_alias(&entity_id, &alias)).await?;
        }
        Ok(())
    }

    async fn handle_event(&self, data: StateChangedData) -> MirrorResult<()> {
        let Some(raw) = data.new_state else {
            self.cache.invalidate(&data.entity_id);
            return Ok(());
        };
        let previous = self.cache.get_by_id(&data.entity_id);
        let mut entity = self.enrich(raw);
        if let Some(previous) = previous {
            // Only re-derive keywords/aliases on a name change; otherwise keep
            // the existing additive set (spec.md §4.3 "Semantic enrichment").
            if previous.friendly_name == entity.friendly_name {
                entity.keywords = previous.keywords;
                entity.aliases = previous.aliases;
            } else {
                entity.keywords = previous.keywords.into_iter().chain(entity.keywords).collect();
                entity.aliases = previous.aliases.into_iter().chain(entity.aliases).collect();
                entity.aliases.sort();
                entity.aliases.dedup();
            }
        }

        self.cache.upsert(entity.clone());
        self.persist_entity(&entity).await?;
        self.sessions.publish_entity_change(EntityChanged {
            entity_id: entity.entity_id.clone(),
            new_state: entity.state.clone(),
        });
        Ok(())
    }

    fn enrich(&self, raw: RawState) -> MirroredEntity {
        let friendly_name = raw
            .attributes
            .get("friendly_name")
            .and_then(|v| v.as_str())
            .unwrap_or(&raw.entity_id)
            .to_string();
        let device_class = raw.attributes.get("device_class").and_then(|v| v.as_str()).map(str::to_string);
        let area = raw.attributes.get("area").and_then(|v| v.as_str()).map(str::to_string);
        let domain = raw.entity_id.split('.').next().unwrap_or_default().to_string();

        let keywords = derive_keywords(&friendly_name, area.as_deref(), device_class.as_deref());
        let aliases = derive_aliases(&friendly_name);

        let last_changed = chrono::DateTime::parse_from_rfc3339(&raw.last_changed)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        MirroredEntity {
            entity_id: raw.entity_id,
            domain,
            state: raw.state,
            attributes: raw.attributes,
            friendly_name,
            device_class,
            area,
            keywords,
            aliases,
            last_changed,
            access_count: 0,
            last_accessed_at: None,
        }
    }
}
