// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The switch transport as seen by the forwarding manager.

use async_trait::async_trait;
use flow::NodeId;

use crate::error::RpcError;
use crate::request::{AddFlowRequest, FlowStatsReply, ReadStatsRequest, RemoveFlowRequest};

/// Flow programming calls offered by the switch transport.
///
/// Implementations only carry requests to switches and report their outcome; they do not
/// time out calls nor watch switch connections, which is left to [`crate::RpcTracker`].
#[async_trait]
pub trait FlowService: Send + Sync + 'static {
    async fn add_flow(&self, request: AddFlowRequest) -> Result<(), RpcError>;
    async fn remove_flow(&self, request: RemoveFlowRequest) -> Result<(), RpcError>;
    async fn barrier(&self, node: NodeId) -> Result<(), RpcError>;
    async fn read_statistics(
        &self,
        request: ReadStatsRequest,
    ) -> Result<Vec<FlowStatsReply>, RpcError>;
}
