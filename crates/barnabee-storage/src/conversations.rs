//! Conversation / Turn repository (spec.md §3). A conversation opens on the
//! first utterance in a device session and closes on timeout or explicit end.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::entities::{Conversation, Turn, TurnRole};
use crate::error::StorageResult;
use crate::store::Store;

impl Store {
    pub fn open_conversation(&self, device_id: &str) -> StorageResult<Conversation> {
        let conversation = Conversation { id: Uuid::new_v4(), device_id: device_id.to_string(), opened_at: Utc::now(), closed_at: None };
        self.write(|tx| {
            tx.execute(
                "INSERT INTO conversations (id, device_id, opened_at, closed_at) VALUES (?1, ?2, ?3, NULL)",
                params![conversation.id.to_string(), conversation.device_id, conversation.opened_at.to_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(conversation)
    }

    pub fn close_conversation(&self, id: Uuid) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                "UPDATE conversations SET closed_at = ?2 WHERE id = ?1 AND closed_at IS NULL",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> StorageResult<Option<Conversation>> {
        let conn = self.reader()?;
        conn.query_row("SELECT * FROM conversations WHERE id = ?1", params![id.to_string()], |row| {
            let id: String = row.get("id")?;
            let closed_at: Option<String> = row.get("closed_at")?;
            let opened_at: String = row.get("opened_at")?;
            Ok(Conversation {
                id: Uuid::parse_str(&id).unwrap_or_default(),
                device_id: row.get("device_id")?,
                opened_at: DateTime::parse_from_rfc3339(&opened_at).unwrap_or_default().with_timezone(&Utc),
                closed_at: closed_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
            })
        })
        .optional()
        .map_err(crate::error::StorageError::from)
    }

    pub fn append_turn(&self, turn: &Turn) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                r#"INSERT INTO turns (id, conversation_id, role, text, intent, confidence, entities_json, latency_ms, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                params![
                    turn.id.to_string(),
                    turn.conversation_id.to_string(),
                    turn.role.as_str(),
                    turn.text,
                    turn.intent,
                    turn.confidence,
                    turn.entities.to_string(),
                    turn.latency_ms,
                    turn.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Most recent turns for a conversation, oldest first (for prompt context).
    pub fn recent_turns(&self, conversation_id: Uuid, limit: usize) -> StorageResult<Vec<Turn>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM turns WHERE conversation_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let mut rows: Vec<Turn> = stmt
            .query_map(params![conversation_id.to_string(), limit as i64], |row| {
                let id: String = row.get("id")?;
                let conversation_id: String = row.get("conversation_id")?;
                let role: String = row.get("role")?;
                let entities_json: String = row.get("entities_json")?;
                let created_at: String = row.get("created_at")?;
                Ok(Turn {
                    id: Uuid::parse_str(&id).unwrap_or_default(),
                    conversation_id: Uuid::parse_str(&conversation_id).unwrap_or_default(),
                    role: TurnRole::parse(&role).unwrap_or(TurnRole::User),
                    text: row.get("text")?,
                    intent: row.get("intent")?,
                    confidence: row.get("confidence")?,
                    entities: serde_json::from_str(&entities_json).unwrap_or_default(),
                    latency_ms: row.get("latency_ms")?,
                    created_at: DateTime::parse_from_rfc3339(&created_at).unwrap_or_default().with_timezone(&Utc),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }
}
