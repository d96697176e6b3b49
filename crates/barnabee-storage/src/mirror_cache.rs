//! Persisted snapshot of the Entity Mirror's live view (spec.md §3
//! "Ownership semantics": "The Entity Mirror exclusively owns the live
//! in-memory view of mirrored entities, but persists a snapshot via the
//! storage engine"). This module is the storage-side half of that contract;
//! `barnabee-mirror` owns the in-memory `DashMap` and calls into it on every
//! state-change event.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::entities::MirroredEntity;
use crate::error::StorageResult;
use crate::store::Store;

fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<MirroredEntity> {
    let attributes_json: String = row.get("attributes_json")?;
    let keywords_json: String = row.get("keywords_json")?;
    let last_changed: String = row.get("last_changed")?;
    let last_accessed_at: Option<String> = row.get("last_accessed_at")?;
    let entity_id: String = row.get("entity_id")?;
    Ok(MirroredEntity {
        entity_id,
        domain: row.get("domain")?,
        state: row.get("state")?,
        attributes: serde_json::from_str(&attributes_json).unwrap_or_default(),
        friendly_name: row.get("friendly_name")?,
        device_class: row.get("device_class")?,
        area: row.get("area")?,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        aliases: Vec::new(), // populated by `aliases_for` on demand, see entity_aliases table
        last_changed: DateTime::parse_from_rfc3339(&last_changed).unwrap_or_default().with_timezone(&Utc),
        access_count: row.get("access_count")?,
        last_accessed_at: last_accessed_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
    })
}

impl Store {
    /// Shallow upsert of one mirrored entity row, called on every state-change
    /// event (spec.md §4.3 "State update").
    pub fn upsert_mirrored_entity(&self, entity: &MirroredEntity) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                r#"INSERT INTO ha_entity_cache
                    (entity_id, domain, state, attributes_json, friendly_name, device_class,
                     area, keywords_json, last_changed, access_count, last_accessed_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                   ON CONFLICT(entity_id) DO UPDATE SET
                     domain = excluded.domain, state = excluded.state,
                     attributes_json = excluded.attributes_json, friendly_name = excluded.friendly_name,
                     device_class = excluded.device_class, area = excluded.area,
                     keywords_json = excluded.keywords_json, last_changed = excluded.last_changed"#,
                params![
                    entity.entity_id,
                    entity.domain,
                    entity.state,
                    entity.attributes.to_string(),
                    entity.friendly_name,
                    entity.device_class,
                    entity.area,
                    serde_json::to_string(&entity.keywords).unwrap_or_else(|_| "[]".into()),
                    entity.last_changed.to_rfc3339(),
                    entity.access_count,
                    entity.last_accessed_at.map(|d| d.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_mirrored_entity(&self, entity_id: &str) -> StorageResult<Option<MirroredEntity>> {
        let conn = self.reader()?;
        let mut entity = conn
            .query_row("SELECT * FROM ha_entity_cache WHERE entity_id = ?1", params![entity_id], row_to_entity)
            .optional()?;
        if let Some(e) = entity.as_mut() {
            e.aliases = self.aliases_for(entity_id)?;
        }
        Ok(entity)
    }

    pub fn all_mirrored_entities(&self) -> StorageResult<Vec<MirroredEntity>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT * FROM ha_entity_cache")?;
        let mut entities = stmt.query_map([], row_to_entity)?.collect::<Result<Vec<_>, _>>()?;
        for e in entities.iter_mut() {
            e.aliases = self.aliases_for(&e.entity_id)?;
        }
        Ok(entities)
    }

    /// Additive alias set (spec.md §4.3 "the set of aliases is additive, never
    /// lossy"). Duplicate inserts are no-ops via the `UNIQUE(entity_id, alias)`
    /// constraint.
    pub fn add_alias(&self, entity_id: &str, alias: &str) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO entity_aliases (id, entity_id, alias, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![uuid::Uuid::new_v4().to_string(), entity_id, alias, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn aliases_for(&self, entity_id: &str) -> StorageResult<Vec<String>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT alias FROM entity_aliases WHERE entity_id = ?1")?;
        let rows = stmt.query_map(params![entity_id], |row| row.get::<_, String>(0))?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Reverse alias lookup used by the Entity Resolver's fast phase.
    pub fn entity_id_for_alias(&self, alias: &str) -> StorageResult<Option<String>> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT entity_id FROM entity_aliases WHERE alias = ?1 LIMIT 1",
            params![alias],
            |row| row.get(0),
        )
        .optional()
        .map_err(crate::error::StorageError::from)
    }
}
