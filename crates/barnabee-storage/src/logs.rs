//! Append-only operational logs (90-day retention) and training examples
//! (spec.md §6 persisted state layout). Logs are ambient observability, not a
//! spec feature; the retention sweep is invoked by the Request Orchestrator's
//! maintenance loop, not automatically on every write.

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::store::Store;

impl Store {
    pub fn log_operational_event(
        &self,
        component: &str,
        trace_id: Option<&str>,
        level: &str,
        message: &str,
        context: &serde_json::Value,
    ) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO operational_logs (id, component, trace_id, level, message, context_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Uuid::new_v4().to_string(),
                    component,
                    trace_id,
                    level,
                    message,
                    context.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Deletes operational log rows older than 90 days. Idempotent: a second
    /// call with nothing left to delete is a no-op.
    pub fn prune_operational_logs(&self) -> StorageResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(90);
        self.write(|tx| {
            Ok(tx.execute("DELETE FROM operational_logs WHERE created_at < ?1", params![cutoff.to_rfc3339()])?)
        })
    }

    pub fn insert_training_example(&self, intent: &str, utterance: &str, embedding_ref: Option<&str>, source: &str) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO training_examples (id, intent, utterance, embedding_ref, source, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![Uuid::new_v4().to_string(), intent, utterance, embedding_ref, source, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn training_examples_for_intent(&self, intent: &str) -> StorageResult<Vec<String>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT utterance FROM training_examples WHERE intent = ?1")?;
        let rows = stmt.query_map(params![intent], |row| row.get::<_, String>(0))?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
