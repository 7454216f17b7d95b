// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use config::FlowManagerConfig;
use tracing::Level;
use vtn_manager::logging::{init_from_config, init_tracing};

// Installs the process-wide subscriber: keep it the only test of this binary.
#[test]
fn global_subscriber_follows_config() {
    let config = FlowManagerConfig {
        log_level: "debug".to_string(),
        ..FlowManagerConfig::default()
    };
    assert!(init_from_config(&config).unwrap());
    if std::env::var_os("RUST_LOG").is_none() {
        assert!(tracing::enabled!(Level::DEBUG));
        assert!(!tracing::enabled!(Level::TRACE));
    }

    // a second installation leaves the first in place
    assert!(!init_tracing("error").unwrap());
    if std::env::var_os("RUST_LOG").is_none() {
        assert!(tracing::enabled!(Level::DEBUG));
    }
}
