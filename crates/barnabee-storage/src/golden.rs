//! Golden dataset repository. Used by `ingest-golden` and the Improvement
//! Pipeline's shadow test (spec.md §3 "GoldenCase", §4.10 "Shadow test").
//! The acceptance target is fixed at 500 cases (spec.md §9 Open Questions).

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::entities::GoldenCase;
use crate::error::StorageResult;
use crate::store::Store;

pub const GOLDEN_DATASET_MINIMUM: usize = 500;

impl Store {
    pub fn insert_golden_case(&self, case: &GoldenCase) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO golden_cases (id, utterance, expected_intent, expected_entities_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    case.id.to_string(),
                    case.utterance,
                    case.expected_intent,
                    case.expected_entities.to_string(),
                    case.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn all_golden_cases(&self) -> StorageResult<Vec<GoldenCase>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT * FROM golden_cases ORDER BY created_at ASC")?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get("id")?;
                let expected_entities_json: String = row.get("expected_entities_json")?;
                let created_at: String = row.get("created_at")?;
                Ok(GoldenCase {
                    id: Uuid::parse_str(&id).unwrap_or_default(),
                    utterance: row.get("utterance")?,
                    expected_intent: row.get("expected_intent")?,
                    expected_entities: serde_json::from_str(&expected_entities_json).unwrap_or_default(),
                    created_at: DateTime::parse_from_rfc3339(&created_at).unwrap_or_default().with_timezone(&Utc),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn golden_case_count(&self) -> StorageResult<usize> {
        let conn = self.reader()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM golden_cases", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}
