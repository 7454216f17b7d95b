// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Traffic statistics of data flows.
//!
//! Counters are sampled periodically and also obtained opportunistically, for instance when a
//! switch reports the final counters of a removed flow.  [`StatsHistory`] merges both sources into
//! a bounded, time-ordered history from which average rates are computed.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod history;
mod store;

pub use history::{
    MergePolicy, Merged, PeriodicMerge, StatsAverage, StatsError, StatsHistory, StatsRecord,
};
pub use store::FlowStatsStore;
