//! Improvement repository (spec.md §3, §4.10). Atomic application is handled
//! by the `Store::write` transaction wrapper: snapshotting a backup and
//! flipping `status` happen in the same sqlite transaction, so a crash
//! mid-apply never leaves an improvement `applied` without a backup
//! (spec.md §8 property 3).

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::entities::{Improvement, ImprovementSource, ImprovementStatus, ImprovementTier, ImprovementType};
use crate::error::{StorageError, StorageResult};
use crate::store::Store;

fn row_to_improvement(row: &Row) -> rusqlite::Result<Improvement> {
    let id: String = row.get("id")?;
    let improvement_type: String = row.get("improvement_type")?;
    let tier: i64 = row.get("tier")?;
    let current_value_json: Option<String> = row.get("current_value_json")?;
    let proposed_value_json: String = row.get("proposed_value_json")?;
    let contributing: String = row.get("contributing_signal_ids_json")?;
    let source: String = row.get("source")?;
    let shadow_test_passed: Option<i64> = row.get("shadow_test_passed")?;
    let shadow_results_json: Option<String> = row.get("shadow_results_json")?;
    let status: String = row.get("status")?;
    let monitoring_start: Option<String> = row.get("monitoring_start")?;
    let monitoring_end: Option<String> = row.get("monitoring_end")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Improvement {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        improvement_type: ImprovementType::parse(&improvement_type).unwrap_or(ImprovementType::Alias),
        tier: ImprovementTier::from_i64(tier),
        target: row.get("target")?,
        current_value: current_value_json.and_then(|s| serde_json::from_str(&s).ok()),
        proposed_value: serde_json::from_str(&proposed_value_json).unwrap_or_default(),
        rationale: row.get("rationale")?,
        contributing_signal_ids: serde_json::from_str::<Vec<String>>(&contributing)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| Uuid::parse_str(&s).ok())
            .collect(),
        source: ImprovementSource::parse(&source).unwrap_or(ImprovementSource::Automatic),
        shadow_test_passed: shadow_test_passed.map(|v| v != 0),
        shadow_results: shadow_results_json.and_then(|s| serde_json::from_str(&s).ok()),
        status: ImprovementStatus::parse(&status).unwrap_or(ImprovementStatus::Pending),
        monitoring_start: monitoring_start.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        monitoring_end: monitoring_end.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap_or_default().with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at).unwrap_or_default().with_timezone(&Utc),
    })
}

impl Store {
    pub fn create_improvement(&self, imp: &Improvement) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                r#"INSERT INTO pending_improvements
                    (id, improvement_type, tier, target, current_value_json, proposed_value_json,
                     rationale, contributing_signal_ids_json, source, shadow_test_passed,
                     shadow_results_json, status, monitoring_start, monitoring_end, created_at, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"#,
                params![
                    imp.id.to_string(),
                    imp.improvement_type.as_str(),
                    imp.tier.as_i64(),
                    imp.target,
                    imp.current_value.as_ref().map(|v| v.to_string()),
                    imp.proposed_value.to_string(),
                    imp.rationale,
                    serde_json::to_string(&imp.contributing_signal_ids.iter().map(|u| u.to_string()).collect::<Vec<_>>()).unwrap(),
                    imp.source.as_str(),
                    imp.shadow_test_passed.map(|b| b as i64),
                    imp.shadow_results.as_ref().map(|v| v.to_string()),
                    imp.status.as_str(),
                    imp.monitoring_start.map(|d| d.to_rfc3339()),
                    imp.monitoring_end.map(|d| d.to_rfc3339()),
                    imp.created_at.to_rfc3339(),
                    imp.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_improvement(&self, id: Uuid) -> StorageResult<Option<Improvement>> {
        let conn = self.reader()?;
        conn.query_row("SELECT * FROM pending_improvements WHERE id = ?1", params![id.to_string()], row_to_improvement)
            .optional()
            .map_err(StorageError::from)
    }

    pub fn improvements_by_status(&self, status: ImprovementStatus) -> StorageResult<Vec<Improvement>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT * FROM pending_improvements WHERE status = ?1 ORDER BY created_at ASC")?;
        let rows = stmt.query_map(params![status.as_str()], row_to_improvement)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_shadow_result(&self, id: Uuid, passed: bool, results: &serde_json::Value, status: ImprovementStatus) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                "UPDATE pending_improvements SET shadow_test_passed = ?2, shadow_results_json = ?3, status = ?4, updated_at = ?5 WHERE id = ?1",
                params![id.to_string(), passed as i64, results.to_string(), status.as_str(), Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn set_status(&self, id: Uuid, status: ImprovementStatus) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                "UPDATE pending_improvements SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), status.as_str(), Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Atomic application: writes the backup row and flips status to
    /// `applied` with a monitoring window in one transaction (spec.md §4.10
    /// "Atomic application", §8 property 3: `applied` implies a retrievable
    /// backup).
    pub fn apply_improvement(
        &self,
        id: Uuid,
        target: &str,
        backup_snapshot: &serde_json::Value,
        monitoring_hours: i64,
    ) -> StorageResult<Uuid> {
        let backup_id = Uuid::new_v4();
        let now = Utc::now();
        let monitoring_end = now + chrono::Duration::hours(monitoring_hours);
        self.write(|tx| {
            tx.execute(
                "INSERT INTO improvement_backups (id, improvement_id, target, snapshot_json, discarded, created_at) VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![backup_id.to_string(), id.to_string(), target, backup_snapshot.to_string(), now.to_rfc3339()],
            )?;
            tx.execute(
                r#"UPDATE pending_improvements SET status = 'applied', monitoring_start = ?2, monitoring_end = ?3, updated_at = ?2
                   WHERE id = ?1"#,
                params![id.to_string(), now.to_rfc3339(), monitoring_end.to_rfc3339()],
            )?;
            tx.execute(
                "INSERT INTO improvement_audit (id, improvement_id, event, reason, created_at) VALUES (?1, ?2, 'applied', NULL, ?3)",
                params![Uuid::new_v4().to_string(), id.to_string(), now.to_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(backup_id)
    }

    pub fn latest_backup(&self, improvement_id: Uuid) -> StorageResult<Option<(Uuid, serde_json::Value)>> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT id, snapshot_json FROM improvement_backups WHERE improvement_id = ?1 AND discarded = 0 ORDER BY created_at DESC LIMIT 1",
            params![improvement_id.to_string()],
            |row| {
                let id: String = row.get(0)?;
                let json: String = row.get(1)?;
                Ok((Uuid::parse_str(&id).unwrap_or_default(), serde_json::from_str(&json).unwrap_or_default()))
            },
        )
        .optional()
        .map_err(StorageError::from)
    }

    /// Rollback: marks the improvement `rolled_back` with a reason and writes
    /// an audit entry, in the same transaction (spec.md §4.10 "Monitoring and
    /// rollback").
    pub fn rollback_improvement(&self, id: Uuid, reason: &str) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                "UPDATE pending_improvements SET status = 'rolled_back', updated_at = ?2 WHERE id = ?1",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )?;
            tx.execute(
                "INSERT INTO improvement_audit (id, improvement_id, event, reason, created_at) VALUES (?1, ?2, 'rolled_back', ?3, ?4)",
                params![Uuid::new_v4().to_string(), id.to_string(), reason, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn discard_backup(&self, backup_id: Uuid) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute("UPDATE improvement_backups SET discarded = 1 WHERE id = ?1", params![backup_id.to_string()])?;
            Ok(())
        })
    }

    /// A tier-3 improvement must never transition out of `pending`/`rejected`
    /// (spec.md §3 invariant, §8 property 4). Enforced here so every caller
    /// gets the same guard regardless of pipeline path.
    pub fn guard_tier3_transition(imp: &Improvement, new_status: ImprovementStatus) -> StorageResult<()> {
        if imp.tier == ImprovementTier::Tier3
            && !matches!(new_status, ImprovementStatus::Pending | ImprovementStatus::Rejected)
        {
            return Err(StorageError::Validation(format!(
                "tier-3 improvement {} cannot transition to {:?}",
                imp.id, new_status
            )));
        }
        Ok(())
    }
}
