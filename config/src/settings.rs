// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Forwarding manager settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ConfigError, ConfigResult};

/// Settings of the forwarding manager.  Every field may be omitted and takes its default value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowManagerConfig {
    /// Deadline of a single switch RPC.
    pub rpc_timeout_ms: u64,
    /// Deadline of each RPC of a removal batch.
    pub bulk_rpc_timeout_ms: u64,
    /// Follow every add-flow with a barrier.
    pub install_barrier: bool,
    /// Period of the statistics poll.
    pub stats_interval_ms: u64,
    /// Age after which statistics records are dropped.
    pub stats_lifetime_ms: u64,
    /// Non-periodic statistics closer than this are coalesced.
    pub stats_min_interval_ms: u64,
    pub table_miss_priority: u16,
    pub flow_priority: u16,
    /// Default log level, overridden by `RUST_LOG`.
    pub log_level: String,
}

impl Default for FlowManagerConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 3_000,
            bulk_rpc_timeout_ms: 10_000,
            install_barrier: true,
            stats_interval_ms: 10_000,
            stats_lifetime_ms: 60_000,
            stats_min_interval_ms: 1_000,
            table_miss_priority: 0,
            flow_priority: 10,
            log_level: "info".to_string(),
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

impl FlowManagerConfig {
    const LOG_LEVELS: [&'static str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

    /// Check the consistency of the settings.
    pub fn validate(&self) -> ConfigResult {
        for (field, value) in [
            ("rpc_timeout_ms", self.rpc_timeout_ms),
            ("bulk_rpc_timeout_ms", self.bulk_rpc_timeout_ms),
            ("stats_interval_ms", self.stats_interval_ms),
            ("stats_lifetime_ms", self.stats_lifetime_ms),
            ("stats_min_interval_ms", self.stats_min_interval_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.stats_min_interval_ms >= self.stats_lifetime_ms {
            return Err(invalid(
                "stats_min_interval_ms",
                "must be smaller than stats_lifetime_ms",
            ));
        }
        if self.flow_priority <= self.table_miss_priority {
            return Err(invalid(
                "flow_priority",
                "must be greater than table_miss_priority",
            ));
        }
        if !Self::LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid {
                field: "log_level",
                reason: format!("unknown level '{}'", self.log_level),
            });
        }
        Ok(())
    }

    /// Parse settings from YAML text and validate them.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: FlowManagerConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        debug!("loaded configuration: {config:?}");
        Ok(config)
    }

    /// Read settings from a YAML file and validate them.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    #[must_use]
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    #[must_use]
    pub fn bulk_rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.bulk_rpc_timeout_ms)
    }

    #[must_use]
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_gives_defaults() {
        let config = FlowManagerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, FlowManagerConfig::default());
        assert_eq!(config.rpc_timeout(), Duration::from_secs(3));
        assert_eq!(config.stats_lifetime_ms, 60_000);
        assert_eq!(config.stats_min_interval_ms, 1_000);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let yaml = "rpc_timeout_ms: 500\ninstall_barrier: false\nlog_level: debug\n";
        let config = FlowManagerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config,
            FlowManagerConfig {
                rpc_timeout_ms: 500,
                install_barrier: false,
                log_level: "debug".to_string(),
                ..FlowManagerConfig::default()
            }
        );
    }

    #[test]
    fn yaml_round_trip() {
        let config = FlowManagerConfig {
            flow_priority: 100,
            ..FlowManagerConfig::default()
        };
        let yaml = config.to_yaml_string().unwrap();
        assert_eq!(FlowManagerConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = FlowManagerConfig::from_yaml_str("rpc_timeout: 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            ("rpc_timeout_ms: 0", "rpc_timeout_ms"),
            ("stats_interval_ms: 0", "stats_interval_ms"),
            ("stats_min_interval_ms: 60000", "stats_min_interval_ms"),
            ("table_miss_priority: 10", "flow_priority"),
            ("log_level: loud", "log_level"),
        ];
        for (yaml, expected) in cases {
            match FlowManagerConfig::from_yaml_str(yaml) {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected, "{yaml}"),
                other => panic!("{yaml}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn missing_file() {
        let err = FlowManagerConfig::from_yaml_file(Path::new("/nonexistent/vtn.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
