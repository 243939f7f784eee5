//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Phase thresholds reuse [`DelayConfig`] so the `[delays]` table is exactly
//! what `attach` receives.

use serde::{Deserialize, Serialize};

use crate::phase::DelayConfig;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Per-phase thresholds in milliseconds. Absent phases are disabled.
    pub delays: DelayConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, for development.
    #[default]
    Pretty,
    /// One JSON object per event, for log aggregation.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Record supervisor counters through the metrics facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;

    #[test]
    fn empty_document_uses_defaults() {
        let config: SupervisorConfig = toml::from_str("").unwrap();
        assert_eq!(config, SupervisorConfig::default());
        assert!(config.delays.is_empty());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn parses_camel_case_phase_keys() {
        let config: SupervisorConfig = toml::from_str(
            r#"
            [delays]
            secureConnect = 250
            request = 10000

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.delays.get(Phase::SecureConnect), Some(250));
        assert_eq!(config.delays.get(Phase::Request), Some(10_000));
        assert_eq!(config.delays.get(Phase::Lookup), None);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert!(config.observability.metrics_enabled);
    }

    #[test]
    fn rejects_unknown_phase_and_negative_threshold() {
        assert!(toml::from_str::<SupervisorConfig>("[delays]\nhandshake = 5").is_err());
        assert!(toml::from_str::<SupervisorConfig>("[delays]\nconnect = -1").is_err());
    }
}
