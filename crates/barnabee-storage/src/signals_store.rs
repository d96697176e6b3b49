//! Signal repository (spec.md §3, §4.9). Immutable once written; marked
//! `processed` when folded into an Improvement.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::entities::{Signal, SignalKind};
use crate::error::StorageResult;
use crate::store::Store;

fn row_to_signal(row: &Row) -> rusqlite::Result<Signal> {
    let id: String = row.get("id")?;
    let kind: String = row.get("kind")?;
    let context_json: String = row.get("context_json")?;
    let processed: i64 = row.get("processed")?;
    let created_at: String = row.get("created_at")?;
    Ok(Signal {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        kind: SignalKind::parse(&kind).unwrap_or(SignalKind::LowConfidence),
        utterance: row.get("utterance")?,
        normalized_text: row.get("normalized_text")?,
        context: serde_json::from_str(&context_json).unwrap_or_default(),
        expected_outcome: row.get("expected_outcome")?,
        actual_outcome: row.get("actual_outcome")?,
        stage_reached: row.get("stage_reached")?,
        confidence: row.get("confidence")?,
        processed: processed != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap_or_default().with_timezone(&Utc),
    })
}

impl Store {
    pub fn record_signal(&self, signal: &Signal) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                r#"INSERT INTO signals
                    (id, kind, utterance, normalized_text, context_json, expected_outcome,
                     actual_outcome, stage_reached, confidence, processed, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
                params![
                    signal.id.to_string(),
                    signal.kind.as_str(),
                    signal.utterance,
                    signal.normalized_text,
                    signal.context.to_string(),
                    signal.expected_outcome,
                    signal.actual_outcome,
                    signal.stage_reached,
                    signal.confidence,
                    signal.processed as i64,
                    signal.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn unprocessed_signals(&self, limit: usize) -> StorageResult<Vec<Signal>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT * FROM signals WHERE processed = 0 ORDER BY created_at ASC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], row_to_signal)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_signal(&self, id: Uuid) -> StorageResult<Option<Signal>> {
        let conn = self.reader()?;
        conn.query_row("SELECT * FROM signals WHERE id = ?1", params![id.to_string()], row_to_signal)
            .optional()
            .map_err(crate::error::StorageError::from)
    }

    pub fn mark_signals_processed(&self, ids: &[Uuid]) -> StorageResult<()> {
        self.write(|tx| {
            for id in ids {
                tx.execute("UPDATE signals SET processed = 1 WHERE id = ?1", params![id.to_string()])?;
            }
            Ok(())
        })
    }
}
