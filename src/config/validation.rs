//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds fit a platform timer)
//! - Validate observability settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SupervisorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::SupervisorConfig;
use crate::phase::Phase;

/// Largest threshold accepted, the range of a signed 32-bit millisecond timer.
pub const MAX_THRESHOLD_MS: u64 = 2_147_483_647;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("delays.{phase}: {threshold_ms}ms exceeds the maximum of {max}ms", max = MAX_THRESHOLD_MS)]
    ThresholdTooLarge { phase: Phase, threshold_ms: u64 },

    #[error("observability.log_level: unknown level '{0}'")]
    UnknownLogLevel(String),
}

pub fn validate_config(config: &SupervisorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors: Vec<ValidationError> = config
        .delays
        .enabled()
        .filter(|(_, threshold_ms)| *threshold_ms > MAX_THRESHOLD_MS)
        .map(|(phase, threshold_ms)| ValidationError::ThresholdTooLarge {
            phase,
            threshold_ms,
        })
        .collect();

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::DelayConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&SupervisorConfig::default()), Ok(()));
    }

    #[test]
    fn zero_and_maximum_thresholds_are_valid() {
        let config = SupervisorConfig {
            delays: DelayConfig::new()
                .with(Phase::SecureConnect, 0)
                .with(Phase::Request, MAX_THRESHOLD_MS),
            ..SupervisorConfig::default()
        };
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = SupervisorConfig {
            delays: DelayConfig::new()
                .with(Phase::Connect, MAX_THRESHOLD_MS + 1)
                .with(Phase::Read, u64::MAX),
            ..SupervisorConfig::default()
        };
        config.observability.log_level = "loud".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::UnknownLogLevel("loud".to_string())));
        assert!(errors[0].to_string().starts_with("delays.connect:"));
    }
}
