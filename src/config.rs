use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_DATABASE_URL: &str = "sqlite://emmo.db?mode=rwc";
const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "EMMO";
const DEFAULT_MIN_RATIO: f64 = 0.7;
const DEFAULT_HISTORY_MIN_SAMPLES: usize = 3;
const DEFAULT_HISTORY_LOOKBACK: u64 = 200;
const DEFAULT_PREFIX_LEN: usize = 3;
const DEFAULT_HASH_LEN: usize = 12;

/// Policy applied when a line price falls below the plausibility floor.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CorrectionMode {
    /// Flag implausible prices, never rewrite them
    #[default]
    FlagOnly,
    /// Raise prices below the cost floor to the master unit cost
    FloorToCost,
    /// Raise prices below the history floor to the reference median
    FloorToReferenceMedian,
}

/// Settings consumed by the resolver, the evaluator and the orchestrator.
///
/// Built once at start-up and passed by reference; nothing in the core reads
/// ambient configuration.
#[derive(Clone, Debug, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Fraction of the baseline under which a price is implausible
    #[serde(default = "default_min_ratio")]
    #[validate(custom = "validate_min_ratio")]
    pub min_ratio: f64,

    #[serde(default)]
    pub correction_mode: CorrectionMode,

    /// Observations required before the historical median is trusted
    #[serde(default = "default_history_min_samples")]
    pub history_min_samples: usize,

    /// Most recent observations considered for the median
    #[serde(default = "default_history_lookback")]
    #[validate(range(min = 1))]
    pub history_lookback: u64,

    #[serde(default = "default_prefix_len")]
    #[validate(range(min = 1, max = 8))]
    pub reference_code_prefix_len: usize,

    /// Length of the base64 digest kept in generated codes (SHA-256 gives 43)
    #[serde(default = "default_hash_len")]
    #[validate(range(min = 1, max = 43))]
    pub reference_code_hash_len: usize,

    /// Canonicalize supplied codes to `<SUP>_<CODE>`
    #[serde(default = "default_true_bool")]
    pub enforce_reference_code_prefix: bool,

    /// Fabricate a deterministic code when OCR provided none
    #[serde(default)]
    pub auto_reference_code: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_ratio: default_min_ratio(),
            correction_mode: CorrectionMode::default(),
            history_min_samples: default_history_min_samples(),
            history_lookback: default_history_lookback(),
            reference_code_prefix_len: default_prefix_len(),
            reference_code_hash_len: default_hash_len(),
            enforce_reference_code_prefix: true,
            auto_reference_code: false,
        }
    }
}

impl IngestConfig {
    pub fn with_correction_mode(mut self, mode: CorrectionMode) -> Self {
        self.correction_mode = mode;
        self
    }

    pub fn with_auto_reference_code(mut self, enabled: bool) -> Self {
        self.auto_reference_code = enabled;
        self
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Resolution and pricing rules
    #[serde(default)]
    #[validate]
    pub ingest: IngestConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the database
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            ingest: IngestConfig::default(),
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_true_bool() -> bool {
    true
}

fn default_min_ratio() -> f64 {
    DEFAULT_MIN_RATIO
}

fn default_history_min_samples() -> usize {
    DEFAULT_HISTORY_MIN_SAMPLES
}

fn default_history_lookback() -> u64 {
    DEFAULT_HISTORY_LOOKBACK
}

fn default_prefix_len() -> usize {
    DEFAULT_PREFIX_LEN
}

fn default_hash_len() -> usize {
    DEFAULT_HASH_LEN
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// A ratio above 1 would let a correction lower the price it replaces.
fn validate_min_ratio(ratio: f64) -> Result<(), ValidationError> {
    if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
        let mut err = ValidationError::new("min_ratio");
        err.message = Some("min_ratio must be a finite value in (0.0, 1.0]".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("emmo_ingest={},sea_orm=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .with_target(true)
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (EMMO__*, e.g. `EMMO__INGEST__MIN_RATIO`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Loads configuration from an explicit directory and profile name
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!(
        correction_mode = %app_config.ingest.correction_mode,
        min_ratio = app_config.ingest.min_ratio,
        "Configuration loaded successfully"
    );
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_profile(content: &str, name: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(format!("{name}.toml")), content).unwrap();
        dir
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = IngestConfig::default();
        assert_eq!(cfg.min_ratio, 0.7);
        assert_eq!(cfg.correction_mode, CorrectionMode::FlagOnly);
        assert_eq!(cfg.history_min_samples, 3);
        assert_eq!(cfg.history_lookback, 200);
        assert_eq!(cfg.reference_code_prefix_len, 3);
        assert_eq!(cfg.reference_code_hash_len, 12);
        assert!(cfg.enforce_reference_code_prefix);
        assert!(!cfg.auto_reference_code);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn profile_file_overrides_ingest_rules() {
        let dir = write_profile(
            r#"
            database_url = "sqlite::memory:"
            log_level = "debug"

            [ingest]
            min_ratio = 0.5
            correction_mode = "floor_to_reference_median"
            auto_reference_code = true
            "#,
            "default",
        );

        let cfg = load_config_from(dir.path(), "test").unwrap();
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.environment, "test");
        assert_eq!(cfg.ingest.min_ratio, 0.5);
        assert_eq!(
            cfg.ingest.correction_mode,
            CorrectionMode::FloorToReferenceMedian
        );
        assert!(cfg.ingest.auto_reference_code);
        assert_eq!(cfg.ingest.history_lookback, 200);
    }

    #[test]
    fn ratio_above_one_is_rejected() {
        let dir = write_profile(
            r#"
            [ingest]
            min_ratio = 1.5
            "#,
            "default",
        );

        let err = load_config_from(dir.path(), "test").unwrap_err();
        assert!(matches!(err, AppConfigError::Validation(_)));
    }

    #[test]
    fn min_ratio_bounds() {
        let mut cfg = IngestConfig::default();
        for ok in [1.0, 0.01] {
            cfg.min_ratio = ok;
            assert!(cfg.validate().is_ok(), "{ok}");
        }
        for bad in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            cfg.min_ratio = bad;
            assert!(cfg.validate().is_err(), "{bad}");
        }
    }

    #[test]
    fn unknown_correction_mode_fails_to_load() {
        let dir = write_profile(
            r#"
            [ingest]
            correction_mode = "round_up"
            "#,
            "default",
        );

        assert!(matches!(
            load_config_from(dir.path(), "test"),
            Err(AppConfigError::Load(_))
        ));
    }

    #[test]
    fn correction_mode_round_trips_through_strings() {
        assert_eq!(CorrectionMode::FloorToCost.to_string(), "floor_to_cost");
        assert_eq!(
            "floor_to_reference_median".parse::<CorrectionMode>().unwrap(),
            CorrectionMode::FloorToReferenceMedian
        );
    }
}
