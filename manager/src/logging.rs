// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing setup.

use config::FlowManagerConfig;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::errors::FlowManagerError;

/// Build the subscriber logging at `default_level` unless `RUST_LOG` says otherwise.
pub fn subscriber(
    default_level: &str,
) -> Result<impl Subscriber + Send + Sync + 'static, FlowManagerError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| FlowManagerError::Tracing(e.to_string()))?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true);
    Ok(Registry::default().with(filter).with(fmt_layer))
}

/// Install the global tracing subscriber, logging at `default_level` unless `RUST_LOG` says
/// otherwise.
///
/// Returns `Ok(false)` if a global subscriber was already installed, which is left in place.
pub fn init_tracing(default_level: &str) -> Result<bool, FlowManagerError> {
    Ok(subscriber(default_level)?.try_init().is_ok())
}

/// Install the global tracing subscriber at the level configured in `config`.
pub fn init_from_config(config: &FlowManagerConfig) -> Result<bool, FlowManagerError> {
    init_tracing(&config.log_level)
}

#[cfg(test)]
mod test {
    use super::*;
    use tracing::Level;

    fn env_is_clear() -> bool {
        std::env::var_os("RUST_LOG").is_none()
    }

    #[test]
    fn bad_level_is_reported() {
        if env_is_clear() {
            assert!(matches!(
                subscriber("vtn=notalevel"),
                Err(FlowManagerError::Tracing(_))
            ));
        }
    }

    #[test]
    fn configured_level_filters_events() {
        if !env_is_clear() {
            return;
        }
        let config = FlowManagerConfig {
            log_level: "warn".to_string(),
            ..FlowManagerConfig::default()
        };
        tracing::subscriber::with_default(subscriber(&config.log_level).unwrap(), || {
            assert!(tracing::enabled!(Level::WARN));
            assert!(!tracing::enabled!(Level::INFO));
        });
    }
}
