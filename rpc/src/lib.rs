// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracked switch RPCs.
//!
//! Every RPC issued to a switch is owned by one tracker which settles it exactly once: with the
//! transport outcome, as canceled when the switch disconnects, or as timed out.  Failures caused
//! by a departing switch are told apart from genuine protocol errors so that only the latter are
//! logged as errors.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod batch;
mod error;
mod lifecycle;
mod request;
mod rpcs;
mod service;
mod tracker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use batch::RemovalBatch;
pub use error::{DISCONNECT_SIGNATURES, RpcError, is_disconnect_message};
pub use lifecycle::NodeLifecycle;
pub use request::{
    AddFlowRequest, FlowRemoved, FlowStatsReply, ReadStatsRequest, RemoveFlowRequest,
    RemovedReason,
};
pub use rpcs::{FlowRpcs, InstallHandle, RpcOptions, settle_all};
pub use service::FlowService;
pub use tracker::{
    AddFlowRpc, BarrierRpc, ReadStatsRpc, RemoveFlowRpc, RpcHandle, RpcKind, RpcTracker, Settler,
};
