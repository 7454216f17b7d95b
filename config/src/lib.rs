// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration of the forwarding manager.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod errors;
mod settings;

pub use errors::{ConfigError, ConfigResult};
pub use settings::FlowManagerConfig;
