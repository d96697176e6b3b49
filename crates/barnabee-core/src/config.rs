//! Closed configuration record (spec.md §6 "Configuration surface", §9
//! "Dynamic introspection of configuration objects" → replaced with an
//! enumerated record; unknown keys are a startup error). Grounded on
//! `pagi-core::shared::CoreConfig::load()`'s builder pattern: defaults, an
//! optional file source, then environment overrides.

use serde::{Deserialize, Serialize};

use crate::error::{BarnabeeError, BarnabeeResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarnabeeConfig {
    pub sqlite_path: String,
    pub session_ttl_seconds: i64,

    pub embedding_model: String,
    pub embedding_dimension: usize,

    pub fast_threshold: f32,
    pub embedding_threshold: f32,
    pub local_threshold: f32,
    pub low_confidence_threshold: f32,
    pub speculative_confidence_threshold: f32,
    pub speculative_head_start_ms: u64,
    pub request_deadline_ms: u64,

    pub improvement_monitoring_hours: i64,
    pub rollback_accuracy_drop: f32,
    pub rollback_latency_ms: i64,
    pub rollback_error_rate: f32,
    pub cluster_similarity: f32,
    pub cluster_min_size: usize,

    pub context_token_budget: usize,

    pub ha_ws_url: String,
    pub ha_http_url: String,
    pub ha_access_token: String,

    pub llm_api_base: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub embedding_api_base: String,
    pub embedding_api_key: String,
}

impl BarnabeeConfig {
    /// Load config from file and environment. Precedence: env `BARNABEE_CONFIG`
    /// path > `config/barnabee.toml` > defaults. Environment variables use the
    /// `BARNABEE__` prefix with `__` as the nesting separator, e.g.
    /// `BARNABEE__SQLITE_PATH`.
    pub fn load() -> BarnabeeResult<Self> {
        let config_path = std::env::var("BARNABEE_CONFIG").unwrap_or_else(|_| "config/barnabee".to_string());

        let builder = config::Config::builder()
            .set_default("sqlite_path", "./data/barnabee.sqlite3")
            .map_err(config_err)?
            .set_default("session_ttl_seconds", 1800_i64)
            .map_err(config_err)?
            .set_default("embedding_model", "text-embedding-3-small")
            .map_err(config_err)?
            .set_default("embedding_dimension", 1536_i64)
            .map_err(config_err)?
            .set_default("fast_threshold", 0.95_f64)
            .map_err(config_err)?
            .set_default("embedding_threshold", 0.85_f64)
            .map_err(config_err)?
            .set_default("local_threshold", 0.80_f64)
            .map_err(config_err)?
            .set_default("low_confidence_threshold", 0.70_f64)
            .map_err(config_err)?
            .set_default("speculative_confidence_threshold", 0.98_f64)
            .map_err(config_err)?
            .set_default("speculative_head_start_ms", 100_i64)
            .map_err(config_err)?
            .set_default("request_deadline_ms", 2000_i64)
            .map_err(config_err)?
            .set_default("improvement_monitoring_hours", 24_i64)
            .map_err(config_err)?
            .set_default("rollback_accuracy_drop", 0.02_f64)
            .map_err(config_err)?
            .set_default("rollback_latency_ms", 50_i64)
            .map_err(config_err)?
            .set_default("rollback_error_rate", 0.05_f64)
            .map_err(config_err)?
            .set_default("cluster_similarity", 0.85_f64)
            .map_err(config_err)?
            .set_default("cluster_min_size", 3_i64)
            .map_err(config_err)?
            .set_default("context_token_budget", 500_i64)
            .map_err(config_err)?
            .set_default("ha_ws_url", "ws://homeassistant.local:8123/api/websocket")
            .map_err(config_err)?
            .set_default("ha_http_url", "http://homeassistant.local:8123")
            .map_err(config_err)?
            .set_default("ha_access_token", "")
            .map_err(config_err)?
            .set_default("llm_api_base", "https://openrouter.ai/api/v1")
            .map_err(config_err)?
            .set_default("llm_api_key", "")
            .map_err(config_err)?
            .set_default("llm_model", "meta-llama/llama-3.3-70b-instruct")
            .map_err(config_err)?
            .set_default("embedding_api_base", "https://openrouter.ai/api/v1")
            .map_err(config_err)?
            .set_default("embedding_api_key", "")
            .map_err(config_err)?;

        let path = std::path::Path::new(&config_path);
        let builder = if path.with_extension("toml").exists() || path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("BARNABEE").separator("__"))
            .build()
            .map_err(config_err)?;

        built.try_deserialize().map_err(config_err)
    }
}

fn config_err(err: config::ConfigError) -> BarnabeeError {
    BarnabeeError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_with_no_file_or_env() {
        let config = BarnabeeConfig::load().expect("defaults alone must be sufficient to build a config");
        assert_eq!(config.session_ttl_seconds, 1800);
        assert_eq!(config.cluster_min_size, 3);
        assert!((config.speculative_confidence_threshold - 0.98).abs() < f32::EPSILON);
    }
}
