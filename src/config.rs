use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Strategic optimizer (Bayesian policy search) tuning.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StrategicConfig {
    /// Maximum surrogate-guided iterations per product
    #[serde(default = "default_max_iterations")]
    #[validate(range(min = 2, max = 500))]
    pub max_iterations: u32,

    /// Random-restart candidates per acquisition search
    #[serde(default = "default_n_candidates")]
    #[validate(range(min = 1, max = 1000))]
    pub n_candidates: u32,

    /// Homoscedastic observation noise added to the kernel diagonal
    #[serde(default = "default_noise_variance")]
    #[validate(custom = "validate_positive")]
    pub noise_variance: f64,

    /// Demand history window consulted per run (days)
    #[serde(default = "default_lookback_days")]
    #[validate(range(min = 30, max = 3650))]
    pub lookback_days: u32,

    /// Minimum non-forecast history required to optimize (days)
    #[serde(default = "default_min_history_days")]
    #[validate(range(min = 1))]
    pub min_history_days: u32,

    /// Re-run cadence consumed by the scheduler (days)
    #[serde(default = "default_optimization_interval_days")]
    #[validate(range(min = 1, max = 90))]
    pub optimization_interval_days: u32,
}

impl Default for StrategicConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            n_candidates: default_n_candidates(),
            noise_variance: default_noise_variance(),
            lookback_days: default_lookback_days(),
            min_history_days: default_min_history_days(),
            optimization_interval_days: default_optimization_interval_days(),
        }
    }
}

/// Tactical controller (predictive step + learned correction) tuning.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TacticalConfig {
    /// Days projected ahead by the predictive step
    #[serde(default = "default_prediction_horizon")]
    #[validate(range(min = 1, max = 60))]
    pub prediction_horizon: u32,

    /// Days for which orders are actually decided (<= prediction horizon)
    #[serde(default = "default_control_horizon")]
    #[validate(range(min = 1, max = 60))]
    pub control_horizon: u32,

    /// Semi-gradient TD step size
    #[serde(default = "default_learning_rate")]
    #[validate(custom = "validate_positive")]
    pub learning_rate: f64,

    /// Reward discount factor
    #[serde(default = "default_discount_factor")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub discount_factor: f64,

    /// Initial epsilon for epsilon-greedy action selection
    #[serde(default = "default_exploration_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub exploration_rate: f64,

    /// Multiplicative epsilon decay applied after each training step
    #[serde(default = "default_exploration_decay")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub exploration_decay: f64,

    /// Mini-batch size for replay training
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 10000))]
    pub batch_size: u32,

    /// Per-product experience buffer capacity
    #[serde(default = "default_memory_size")]
    #[validate(range(min = 100))]
    pub memory_size: u32,

    /// Use the exhaustive constrained planner; false forces the
    /// z-score heuristic for every product
    #[serde(default = "default_use_constrained_solver")]
    pub use_constrained_solver: bool,
}

impl Default for TacticalConfig {
    fn default() -> Self {
        Self {
            prediction_horizon: default_prediction_horizon(),
            control_horizon: default_control_horizon(),
            learning_rate: default_learning_rate(),
            discount_factor: default_discount_factor(),
            exploration_rate: default_exploration_rate(),
            exploration_decay: default_exploration_decay(),
            batch_size: default_batch_size(),
            memory_size: default_memory_size(),
            use_constrained_solver: default_use_constrained_solver(),
        }
    }
}

/// Process-wide economic constants shared by the simulator, the solvers,
/// and reward computation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EconomicsConfig {
    /// Warehouse capacity ceiling in units
    #[serde(default = "default_warehouse_capacity")]
    #[validate(range(min = 1.0))]
    pub warehouse_capacity: f64,

    /// Target fraction of demand served from stock
    #[serde(default = "default_service_level_target")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub service_level_target: f64,

    /// Annual holding cost as a fraction of unit cost
    #[serde(default = "default_holding_cost_rate")]
    #[validate(custom = "validate_positive")]
    pub holding_cost_rate: f64,

    /// Penalty per unmet unit of demand
    #[serde(default = "default_stockout_penalty")]
    #[validate(custom = "validate_positive")]
    pub stockout_penalty: f64,

    /// Fixed cost per order event
    #[serde(default = "default_order_cost")]
    #[validate(custom = "validate_positive")]
    pub order_cost: f64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            warehouse_capacity: default_warehouse_capacity(),
            service_level_target: default_service_level_target(),
            holding_cost_rate: default_holding_cost_rate(),
            stockout_penalty: default_stockout_penalty(),
            order_cost: default_order_cost(),
        }
    }
}

/// Cadences for the three background loops.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Strategic re-optimization interval (days)
    #[serde(default = "default_strategic_interval_days")]
    #[validate(range(min = 1, max = 90))]
    pub strategic_interval_days: u32,

    /// Tactical decision interval (minutes)
    #[serde(default = "default_tactical_interval_minutes")]
    #[validate(range(min = 1))]
    pub tactical_interval_minutes: u32,

    /// Daily aggregation/consistency interval (hours)
    #[serde(default = "default_coordination_interval_hours")]
    #[validate(range(min = 1, max = 168))]
    pub coordination_interval_hours: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategic_interval_days: default_strategic_interval_days(),
            tactical_interval_minutes: default_tactical_interval_minutes(),
            coordination_interval_hours: default_coordination_interval_hours(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
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

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Seed for reproducible strategic runs; None draws from entropy
    #[serde(default)]
    pub random_seed: Option<u64>,

    #[serde(default)]
    #[validate]
    pub strategic: StrategicConfig,

    #[serde(default)]
    #[validate]
    pub tactical: TacticalConfig,

    #[serde(default)]
    #[validate]
    pub economics: EconomicsConfig,

    #[serde(default)]
    #[validate]
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Cross-field constraints the derive attributes cannot express.
    fn validate_additional_constraints(&self) -> Result<(), validator::ValidationErrors> {
        let mut errors = validator::ValidationErrors::new();

        if self.tactical.control_horizon > self.tactical.prediction_horizon {
            let mut err = ValidationError::new("control_horizon_exceeds_prediction");
            err.message =
                Some("tactical.control_horizon must not exceed tactical.prediction_horizon".into());
            errors.add("tactical", err);
        }

        if self.strategic.min_history_days > self.strategic.lookback_days {
            let mut err = ValidationError::new("min_history_exceeds_lookback");
            err.message =
                Some("strategic.min_history_days must not exceed strategic.lookback_days".into());
            errors.add("strategic", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://replenish.db?mode=rwc".to_string(),
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            random_seed: None,
            strategic: StrategicConfig::default(),
            tactical: TacticalConfig::default(),
            economics: EconomicsConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
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

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_max_iterations() -> u32 {
    50
}
fn default_n_candidates() -> u32 {
    20
}
fn default_noise_variance() -> f64 {
    0.01
}
fn default_lookback_days() -> u32 {
    180
}
fn default_min_history_days() -> u32 {
    30
}
fn default_optimization_interval_days() -> u32 {
    7
}

fn default_prediction_horizon() -> u32 {
    7
}
fn default_control_horizon() -> u32 {
    3
}
fn default_learning_rate() -> f64 {
    0.001
}
fn default_discount_factor() -> f64 {
    0.95
}
fn default_exploration_rate() -> f64 {
    0.1
}
fn default_exploration_decay() -> f64 {
    0.995
}
fn default_batch_size() -> u32 {
    32
}
fn default_memory_size() -> u32 {
    10_000
}
fn default_use_constrained_solver() -> bool {
    true
}

fn default_warehouse_capacity() -> f64 {
    100_000.0
}
fn default_service_level_target() -> f64 {
    0.95
}
fn default_holding_cost_rate() -> f64 {
    0.25
}
fn default_stockout_penalty() -> f64 {
    10.0
}
fn default_order_cost() -> f64 {
    50.0
}

fn default_strategic_interval_days() -> u32 {
    7
}
fn default_tactical_interval_minutes() -> u32 {
    30
}
fn default_coordination_interval_hours() -> u32 {
    24
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

fn validate_positive(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        let mut err = ValidationError::new("positive");
        err.message = Some("Must be a finite value greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("replenish_engine={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads engine configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<EngineConfig, EngineConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    let builder = Config::builder()
        .set_default("database_url", "sqlite://replenish.db?mode=rwc")?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let engine_config: EngineConfig = config.try_deserialize()?;

    engine_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        EngineConfigError::Validation(e)
    })?;

    engine_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        EngineConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(engine_config)
}
