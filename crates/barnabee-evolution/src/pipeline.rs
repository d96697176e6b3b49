//! Orchestrates the nightly improvement run and the hourly monitor (spec.md
//! §4.10). The pipeline holds a global lock during shadow-test application
//! and deployment so two improvements targeting the same data never race
//! (spec.md §5 "Shared-resource policy"); rollbacks acquire the same lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use barnabee_nlu::providers::EmbeddingProvider;
use barnabee_storage::{Improvement, ImprovementStatus, ImprovementTier, Store};

use crate::clustering::cluster_signals;
use crate::error::{EvolutionError, EvolutionResult};
use crate::monitor::{rollback_reason, MetricsWindow, RollbackThresholds};
use crate::proposal::propose_for_cluster;
use crate::shadow::{run_shadow_test, ClassifierUnderTest};

const SIGNAL_BATCH_LIMIT: usize = 1000;

/// Supplies classifier instances for shadow testing: the one currently
/// live, and a candidate with a given improvement's proposed data applied.
/// Implemented in `barnabee-core`, which owns the live classifier/resolver
/// state this pipeline only reasons about abstractly.
#[async_trait]
pub trait CandidateClassifierFactory: Send + Sync {
    async fn current(&self) -> Box<dyn ClassifierUnderTest>;
    async fn with_improvement_applied(&self, improvement: &Improvement) -> Box<dyn ClassifierUnderTest>;
    /// Writes `snapshot` back over `target`, undoing an applied improvement.
    async fn restore_backup(&self, target: &str, snapshot: &serde_json::Value);
    /// Reloads the live classifier/resolver after an atomic apply or rollback.
    async fn reload(&self);
}

pub struct PipelineConfig {
    pub cluster_similarity: f32,
    pub cluster_min_size: usize,
    pub monitoring_hours: i64,
    pub rollback_thresholds: RollbackThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { cluster_similarity: 0.85, cluster_min_size: 3, monitoring_hours: 24, rollback_thresholds: RollbackThresholds::default() }
    }
}

pub struct ImprovementPipeline {
    store: Arc<Store>,
    config: PipelineConfig,
    lock: Mutex<()>,
}

impl ImprovementPipeline {
    pub fn new(store: Arc<Store>, config: PipelineConfig) -> Self {
        Self { store, config, lock: Mutex::new(()) }
    }

    /// Runs one nightly pass: cluster unprocessed signals, propose, shadow
    /// test, and auto-apply tier-1 passes. Tier-2 passes are parked at
    /// `approved`, awaiting an operator's explicit apply.
    pub async fn run_nightly(
        &self,
        embedder: &dyn EmbeddingProvider,
        factory: &dyn CandidateClassifierFactory,
    ) -> EvolutionResult<Vec<Uuid>> {
        let _guard = self.lock.try_lock().map_err(|_| EvolutionError::LockContended)?;

        let signals = self.store.spawn_blocking(|s| s.unprocessed_signals(SIGNAL_BATCH_LIMIT)).await?;
        if signals.is_empty() {
            return Ok(Vec::new());
        }

        let clusters = cluster_signals(&signals, embedder, self.config.cluster_similarity, self.config.cluster_min_size).await?;
        let contexts_by_id: HashMap<Uuid, serde_json::Value> = signals.iter().map(|s| (s.id, s.context.clone())).collect();

        let mut applied = Vec::new();
        let mut covered_signal_ids = Vec::new();

        for cluster in &clusters {
            let contexts: Vec<serde_json::Value> =
                cluster.signal_ids.iter().filter_map(|id| contexts_by_id.get(id).cloned()).collect();
            let Some(improvement) = propose_for_cluster(cluster, &contexts) else { continue };
            covered_signal_ids.extend(cluster.signal_ids.iter().copied());

            if self.shadow_test_and_maybe_apply(&improvement, embedder, factory).await? {
                applied.push(improvement.id);
            }
        }

        if !covered_signal_ids.is_empty() {
            self.store.spawn_blocking(move |s| s.mark_signals_processed(&covered_signal_ids)).await?;
        }

        Ok(applied)
    }

    /// User suggestions and voice-teach commands bypass clustering entirely
    /// (spec.md §4.10 "User suggestions and voice learning").
    pub async fn submit_bypassing_clustering(
        &self,
        improvement: Improvement,
        embedder: &dyn EmbeddingProvider,
        factory: &dyn CandidateClassifierFactory,
    ) -> EvolutionResult<bool> {
        let _guard = self.lock.try_lock().map_err(|_| EvolutionError::LockContended)?;
        self.shadow_test_and_maybe_apply(&improvement, embedder, factory).await
    }

    async fn shadow_test_and_maybe_apply(
        &self,
        improvement: &Improvement,
        _embedder: &dyn EmbeddingProvider,
        factory: &dyn CandidateClassifierFactory,
    ) -> EvolutionResult<bool> {
        let improvement_for_create = improvement.clone();
        self.store.spawn_blocking(move |s| s.create_improvement(&improvement_for_create)).await?;

        let golden = self.store.spawn_blocking(|s| s.all_golden_cases()).await?;
        let current = factory.current().await;
        let candidate = factory.with_improvement_applied(improvement).await;
        let report = run_shadow_test(&golden, current.as_ref(), candidate.as_ref()).await;

        let results_json = serde_json::json!({
            "accuracy_old": report.accuracy_old,
            "accuracy_new": report.accuracy_new,
            "p95_latency_old_ms": report.p95_latency_old_ms,
            "p95_latency_new_ms": report.p95_latency_new_ms,
            "newly_failing": report.newly_failing,
        });

        if !report.passed {
            let id = improvement.id;
            let results = results_json.clone();
            self.store.spawn_blocking(move |s| s.set_shadow_result(id, false, &results, ImprovementStatus::Rejected)).await?;
            return Ok(false);
        }

        let next_status = if improvement.tier == ImprovementTier::Tier2 { ImprovementStatus::Approved } else { ImprovementStatus::Pending };
        Store::guard_tier3_transition(improvement, next_status)?;
        let id = improvement.id;
        self.store.spawn_blocking(move |s| s.set_shadow_result(id, true, &results_json, next_status)).await?;

        if improvement.tier != ImprovementTier::Tier1 {
            info!(improvement_id = %improvement.id, "tier-2 improvement awaiting operator approval");
            return Ok(false);
        }

        self.apply(improvement.id, factory).await?;
        Ok(true)
    }

    /// Applies an approved improvement: snapshot, flip status, reload.
    pub async fn apply(&self, improvement_id: Uuid, factory: &dyn CandidateClassifierFactory) -> EvolutionResult<()> {
        let Some(improvement) = self.store.spawn_blocking(move |s| s.get_improvement(improvement_id)).await? else { return Ok(()) };
        Store::guard_tier3_transition(&improvement, ImprovementStatus::Applied)?;

        let backup_snapshot = improvement.current_value.clone().unwrap_or(serde_json::json!(null));
        let target = improvement.target.clone();
        let monitoring_hours = self.config.monitoring_hours;
        self.store
            .spawn_blocking(move |s| s.apply_improvement(improvement_id, &target, &backup_snapshot, monitoring_hours))
            .await?;
        factory.reload().await;
        info!(improvement_id = %improvement_id, target = %improvement.target, "improvement applied");
        Ok(())
    }

    /// Hourly monitoring tick for one applied, still-monitored improvement
    /// (spec.md §4.10 "Monitoring and rollback").
    pub async fn check_and_maybe_rollback(
        &self,
        improvement_id: Uuid,
        baseline: MetricsWindow,
        current: MetricsWindow,
        factory: &dyn CandidateClassifierFactory,
    ) -> EvolutionResult<Option<String>> {
        let _guard = self.lock.try_lock().map_err(|_| EvolutionError::LockContended)?;

        let Some(reason) = rollback_reason(&baseline, &current, &self.config.rollback_thresholds) else { return Ok(None) };

        let Some(backup) = self.store.spawn_blocking(move |s| s.latest_backup(improvement_id)).await? else {
            warn!(improvement_id = %improvement_id, "rollback triggered but no backup on file");
            return Ok(Some(reason));
        };
        let (_backup_id, snapshot) = backup;
        let Some(improvement) = self.store.spawn_blocking(move |s| s.get_improvement(improvement_id)).await? else { return Ok(Some(reason)) };

        factory.restore_backup(&improvement.target, &snapshot).await;
        let reason_owned = reason.clone();
        self.store.spawn_blocking(move |s| s.rollback_improvement(improvement_id, &reason_owned)).await?;
        factory.reload().await;
        warn!(improvement_id = %improvement_id, %reason, "improvement rolled back");
        Ok(Some(reason))
    }

    /// Called once an applied improvement's monitoring window closes without
    /// a rollback firing: its backup is no longer needed (spec.md example 5,
    /// "Backup discardable").
    pub async fn complete_monitoring(&self, improvement_id: Uuid) -> EvolutionResult<()> {
        if let Some((backup_id, _)) = self.store.spawn_blocking(move |s| s.latest_backup(improvement_id)).await? {
            self.store.spawn_blocking(move |s| s.discard_backup(backup_id)).await?;
        }
        Ok(())
    }
}
