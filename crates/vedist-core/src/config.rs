//! Configuration for the escrow, distributors and logging.
//!
//! # Configuration Sources
//!
//! Configuration can be loaded from:
//! - Environment variables (prefixed with `VEDIST_`)
//! - JSON documents (`VedistConfig::from_json`)
//! - Programmatic defaults and the builder
//!
//! # Example
//!
//! ```rust,ignore
//! use vedist_core::config::VedistConfig;
//!
//! let config = VedistConfig::builder()
//!     .min_lock_duration(4 * WEEK)
//!     .weighting(Weighting::Weighted)
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::bounds::RuntimeBounds;
use crate::types::{Timestamp, Weighting, DAY, WEEK, YEAR};
use crate::{Result, VedistError};

/// Complete configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VedistConfig {
    /// Lock manager parameters.
    pub escrow: EscrowConfig,

    /// Weekly distributor parameters (also used by the merkle distributor's lock gate).
    pub distributor: DistributorConfig,

    /// Iteration bounds.
    pub bounds: RuntimeBounds,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl VedistConfig {
    /// Create a new configuration builder.
    pub fn builder() -> VedistConfigBuilder {
        VedistConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Looks for variables prefixed with `VEDIST_`:
    /// - `VEDIST_MAX_LOCK_DURATION` - Maximum lock duration in seconds
    /// - `VEDIST_WEIGHT_MULTIPLIER` - Boost applied to the decaying balance
    /// - `VEDIST_MIN_LOCK_DURATION` - Claim gate in seconds (0 disables)
    /// - `VEDIST_TOKEN_CHECKPOINT_DEADLINE` - Seconds between public token checkpoints
    /// - `VEDIST_MAX_FILL_WEEKS` - Fill-forward bound per ledger mutation
    /// - `VEDIST_MAX_CLAIM_WEEKS` - Weeks processed per claim call
    /// - `VEDIST_LOG_LEVEL` - Logging level or filter directive
    /// - `VEDIST_LOG_JSON` - `true` for JSON log lines
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<u64>("VEDIST_MAX_LOCK_DURATION")? {
            config.escrow.max_lock_duration = v;
        }
        if let Some(v) = env_parse::<u64>("VEDIST_WEIGHT_MULTIPLIER")? {
            config.escrow.weight_multiplier = v;
        }
        if let Some(v) = env_parse::<u64>("VEDIST_MIN_LOCK_DURATION")? {
            config.distributor.min_lock_duration = v;
        }
        if let Some(v) = env_parse::<u64>("VEDIST_TOKEN_CHECKPOINT_DEADLINE")? {
            config.distributor.token_checkpoint_deadline = v;
        }
        if let Some(v) = env_parse::<u64>("VEDIST_MAX_FILL_WEEKS")? {
            config.bounds.max_fill_weeks = v;
        }
        if let Some(v) = env_parse::<u64>("VEDIST_MAX_CLAIM_WEEKS")? {
            config.bounds.max_claim_weeks = v;
        }
        if let Ok(level) = std::env::var("VEDIST_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(v) = env_parse::<bool>("VEDIST_LOG_JSON")? {
            config.logging.json_output = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: VedistConfig = serde_json::from_str(json)
            .map_err(|e| VedistError::ConfigError(format!("invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        let max = self.escrow.max_lock_duration;
        if max < WEEK || max % DAY != 0 {
            return Err(VedistError::ConfigError(
                "max_lock_duration must be a whole number of days and at least one week".into(),
            ));
        }
        if self.escrow.weight_multiplier == 0 {
            return Err(VedistError::ConfigError(
                "weight_multiplier must be greater than 0".into(),
            ));
        }

        if self.distributor.min_lock_duration % WEEK != 0 {
            return Err(VedistError::ConfigError(
                "min_lock_duration must be a multiple of one week".into(),
            ));
        }
        if self.distributor.min_lock_duration > max {
            return Err(VedistError::ConfigError(
                "min_lock_duration cannot exceed max_lock_duration".into(),
            ));
        }
        if self.distributor.token_checkpoint_deadline == 0 {
            return Err(VedistError::ConfigError(
                "token_checkpoint_deadline must be greater than 0".into(),
            ));
        }

        self.bounds
            .validate()
            .map_err(|e| VedistError::ConfigError(e.to_string()))?;

        self.logging.validate()
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| VedistError::ConfigError(format!("Invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Lock manager parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Longest allowed lock, in seconds from now.
    pub max_lock_duration: u64,

    /// Boost applied to the decaying component of weighted balances.
    pub weight_multiplier: u64,

    /// Initial state of the emergency-unlock override.
    pub emergency_unlock: bool,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            max_lock_duration: YEAR,
            weight_multiplier: 3,
            emergency_unlock: false,
        }
    }
}

/// How a distributor pays a computed claim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMode {
    /// Transfer the reward token to the claimant.
    #[default]
    Transfer,
    /// Deposit the reward into the claimant's existing lock.
    Relock,
}

/// Weekly distributor parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// Balance curve used for shares.
    pub weighting: Weighting,

    /// Payout path for claims.
    pub payout: PayoutMode,

    /// Seconds after the last token checkpoint before a public checkpoint is allowed.
    pub token_checkpoint_deadline: Timestamp,

    /// Required remaining lock time at claim, in seconds (0 disables the gate).
    pub min_lock_duration: Timestamp,

    /// Initial state of the public checkpoint flag.
    pub allow_checkpoint_public: bool,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            weighting: Weighting::Unweighted,
            payout: PayoutMode::Transfer,
            token_checkpoint_deadline: DAY,
            min_lock_duration: 0,
            allow_checkpoint_public: false,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or an `EnvFilter` directive.
    pub level: String,

    /// Whether to include span context in logs.
    pub include_spans: bool,

    /// JSON output format.
    pub json_output: bool,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        let level = self.level.trim();
        if level.is_empty() {
            return Err(VedistError::ConfigError("log level must not be empty".into()));
        }
        if level.contains('=') || level.contains(',') {
            return tracing_subscriber::EnvFilter::try_new(level)
                .map(|_| ())
                .map_err(|e| VedistError::ConfigError(format!("invalid log filter: {e}")));
        }
        level
            .parse::<tracing::Level>()
            .map(|_| ())
            .map_err(|_| VedistError::ConfigError(format!("unknown log level: {level}")))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            include_spans: true,
            json_output: false,
        }
    }
}

/// Builder for VedistConfig.
#[derive(Default)]
pub struct VedistConfigBuilder {
    config: VedistConfig,
}

impl VedistConfigBuilder {
    /// Set the maximum lock duration in seconds.
    pub fn max_lock_duration(mut self, seconds: u64) -> Self {
        self.config.escrow.max_lock_duration = seconds;
        self
    }

    /// Set the weighted-balance multiplier.
    pub fn weight_multiplier(mut self, multiplier: u64) -> Self {
        self.config.escrow.weight_multiplier = multiplier;
        self
    }

    /// Start with the emergency unlock enabled.
    pub fn emergency_unlock(mut self, enabled: bool) -> Self {
        self.config.escrow.emergency_unlock = enabled;
        self
    }

    /// Set the distributor balance curve.
    pub fn weighting(mut self, weighting: Weighting) -> Self {
        self.config.distributor.weighting = weighting;
        self
    }

    /// Set the distributor payout path.
    pub fn payout(mut self, payout: PayoutMode) -> Self {
        self.config.distributor.payout = payout;
        self
    }

    /// Set the claim gate in seconds.
    pub fn min_lock_duration(mut self, seconds: u64) -> Self {
        self.config.distributor.min_lock_duration = seconds;
        self
    }

    /// Set the public token checkpoint deadline.
    pub fn token_checkpoint_deadline(mut self, seconds: u64) -> Self {
        self.config.distributor.token_checkpoint_deadline = seconds;
        self
    }

    /// Start with public token checkpoints allowed.
    pub fn allow_checkpoint_public(mut self, enabled: bool) -> Self {
        self.config.distributor.allow_checkpoint_public = enabled;
        self
    }

    /// Replace the iteration bounds.
    pub fn bounds(mut self, bounds: RuntimeBounds) -> Self {
        self.config.bounds = bounds;
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Enable JSON log output.
    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.config.logging.json_output = enabled;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<VedistConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VedistConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.escrow.max_lock_duration, YEAR);
        assert_eq!(config.escrow.weight_multiplier, 3);
        assert_eq!(config.distributor.token_checkpoint_deadline, DAY);
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = VedistConfig::builder()
            .min_lock_duration(4 * WEEK)
            .weighting(Weighting::Weighted)
            .payout(PayoutMode::Relock)
            .log_level("debug")
            .build()
            .expect("should build");

        assert_eq!(config.distributor.min_lock_duration, 4 * WEEK);
        assert_eq!(config.distributor.weighting, Weighting::Weighted);
        assert_eq!(config.distributor.payout, PayoutMode::Relock);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn min_lock_duration_must_be_week_aligned() {
        let result = VedistConfig::builder().min_lock_duration(WEEK + 1).build();
        assert!(matches!(result, Err(VedistError::ConfigError(_))));
    }

    #[test]
    fn zero_multiplier_rejected() {
        assert!(VedistConfig::builder().weight_multiplier(0).build().is_err());
    }

    #[test]
    fn short_max_lock_rejected() {
        assert!(VedistConfig::builder().max_lock_duration(DAY).build().is_err());
    }

    #[test]
    fn max_lock_must_be_whole_days() {
        assert!(VedistConfig::builder()
            .max_lock_duration(WEEK + 1)
            .build()
            .is_err());
        assert!(VedistConfig::builder().max_lock_duration(WEEK).build().is_ok());
        assert!(VedistConfig::builder()
            .max_lock_duration(10 * DAY)
            .build()
            .is_ok());
    }

    #[test]
    fn unknown_log_level_rejected() {
        assert!(VedistConfig::builder().log_level("chatty").build().is_err());
        assert!(VedistConfig::builder()
            .log_level("vedist_core=debug")
            .build()
            .is_ok());
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = VedistConfig::from_json(
            r#"{ "distributor": { "weighting": "weighted", "min_lock_duration": 604800 } }"#,
        )
        .expect("valid json config");
        assert_eq!(config.distributor.weighting, Weighting::Weighted);
        assert_eq!(config.distributor.min_lock_duration, WEEK);
        assert_eq!(config.escrow, EscrowConfig::default());
        assert_eq!(config.bounds, RuntimeBounds::default());
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = VedistConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, VedistError::ConfigError(_)));
    }
}
