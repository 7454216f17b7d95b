// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors of the forwarding manager.

use config::ConfigError;
use flow::{DataFlowError, FlowId, NodeId, TenantName};
use flow_index::IndexError;
use rpc::RpcError;
use stats::StatsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowManagerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    DataFlow(#[from] DataFlowError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("No flow id left for tenant {0}")]
    FlowIdExhausted(TenantName),
    #[error("Node {0} is not connected")]
    NodeNotConnected(NodeId),
    #[error("Failed to install data flow {tenant}/{id} on {node}: {error}")]
    Install {
        tenant: TenantName,
        id: FlowId,
        node: NodeId,
        #[source]
        error: RpcError,
    },
    #[error("Failed to set up tracing: {0}")]
    Tracing(String),
}
