// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors settling a switch RPC.

use flow::NodeId;

/// Messages reported by the transport when the secure channel to a switch goes away.
pub const DISCONNECT_SIGNATURES: [&str; 5] = [
    "Device disconnected",
    "Connection was closed",
    "Outbound queue wasn't able to reserve XID",
    "Session closed",
    "Device reached timeout",
];

/// Tell if a transport error message reports the loss of the switch connection.
#[must_use]
pub fn is_disconnect_message(msg: &str) -> bool {
    DISCONNECT_SIGNATURES.iter().any(|sig| msg.contains(sig))
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("RPC to {0} canceled: node disconnected")]
    Canceled(NodeId),
    #[error("RPC timed out")]
    Timeout,
    #[error("No RPC implementation available")]
    NoImplementation,
    #[error("RPC failed: {}", .errors.join("; "))]
    Failed { errors: Vec<String> },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("RPC result abandoned")]
    Abandoned,
}

impl RpcError {
    /// Tell if this error is the expected outcome of a switch going away rather than a genuine
    /// protocol failure.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            RpcError::Canceled(_) | RpcError::NoImplementation => true,
            RpcError::Transport(msg) => is_disconnect_message(msg),
            RpcError::Failed { errors } => errors.iter().any(|e| is_disconnect_message(e)),
            RpcError::Timeout | RpcError::Abandoned => false,
        }
    }
}
