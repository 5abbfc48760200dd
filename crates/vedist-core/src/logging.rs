//! Tracing subscriber setup for hosts embedding the engines.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{Result, VedistError};

/// Build the filter: `RUST_LOG` wins, otherwise the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(config.level.trim())
            .map_err(|e| VedistError::ConfigError(format!("invalid log filter: {e}"))),
    }
}

/// Install a global `fmt` subscriber.
///
/// Returns `Ok(false)` if a global subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    config.validate()?;
    let filter = env_filter(config)?;
    let spans = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let installed = if config.json_output {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_span_events(spans)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(spans)
            .try_init()
    };
    Ok(installed.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_existing_subscriber() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config).expect("valid config");
        assert!(!init_tracing(&config).expect("valid config"));
    }

    #[test]
    fn invalid_level_is_rejected_before_install() {
        let config = LoggingConfig {
            level: "loud".into(),
            ..LoggingConfig::default()
        };
        assert!(init_tracing(&config).is_err());
    }
}
