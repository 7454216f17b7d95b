// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Forwarding manager of virtual tenant networks.
//!
//! [`FlowManager`] drives the life cycle of data flows on top of the flow model, the flow index
//! and the switch RPC layer: it installs the table-miss flow on connecting switches, installs and
//! indexes data flows, and removes them when asked to, when a switch disconnects or when a switch
//! expires their ingress entry.  [`StatsReader`] keeps the statistics histories of installed flows
//! up to date.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod errors;
pub mod logging;
mod manager;
mod selector;
mod stats_reader;

pub use errors::FlowManagerError;
pub use manager::{ExpiredFlow, FlowManager};
pub use selector::FlowSelector;
pub use stats_reader::StatsReader;
