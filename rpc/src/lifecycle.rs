// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Switch connection tracking and disconnect fan-out.

use std::collections::HashMap;

use flow::NodeId;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Delivers switch disconnect notifications to outstanding RPCs.
///
/// Every connected switch owns one cancellation token.  RPC trackers subscribe to a child of it,
/// so disconnecting a switch cancels every outstanding RPC addressed to it at once, and each
/// tracker observes the cancellation at most once.
#[derive(Debug, Default)]
pub struct NodeLifecycle {
    nodes: Mutex<HashMap<NodeId, CancellationToken>>,
}

impl NodeLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `node` as connected.  Returns `false` if it already was.
    pub fn connected(&self, node: NodeId) -> bool {
        let mut nodes = self.nodes.lock();
        if nodes.get(&node).is_some_and(|token| !token.is_cancelled()) {
            return false;
        }
        nodes.insert(node, CancellationToken::new());
        info!("node {node} connected");
        true
    }

    /// Mark `node` as disconnected, canceling every RPC subscribed to it.
    ///
    /// Returns `false` if the node was not known as connected.
    pub fn disconnected(&self, node: NodeId) -> bool {
        let token = self.nodes.lock().remove(&node);
        match token {
            Some(token) => {
                info!("node {node} disconnected");
                token.cancel();
                true
            }
            None => {
                debug!("node {node} was not connected");
                false
            }
        }
    }

    #[must_use]
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.nodes.lock().contains_key(&node)
    }

    /// Get a token canceled when `node` disconnects.
    ///
    /// A node not known as connected has no disconnect to wait for: the token returned for it is
    /// never canceled.
    pub fn subscribe(&self, node: NodeId) -> CancellationToken {
        match self.nodes.lock().get(&node) {
            Some(token) => token.child_token(),
            None => {
                trace!("node {node} is not connected, not watching it");
                CancellationToken::new()
            }
        }
    }

    /// Every node currently connected.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<_> = self.nodes.lock().keys().copied().collect();
        nodes.sort_unstable();
        nodes
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn disconnect_cancels_subscribers() {
        let lifecycle = NodeLifecycle::new();
        assert!(lifecycle.connected(NodeId(1)));
        assert!(!lifecycle.connected(NodeId(1)));
        lifecycle.connected(NodeId(2));
        let a = lifecycle.subscribe(NodeId(1));
        let b = lifecycle.subscribe(NodeId(1));
        let other = lifecycle.subscribe(NodeId(2));

        assert!(lifecycle.disconnected(NodeId(1)));
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(!other.is_cancelled());
        assert!(!lifecycle.is_connected(NodeId(1)));

        // repeated notification is harmless
        assert!(!lifecycle.disconnected(NodeId(1)));
        assert_eq!(lifecycle.nodes(), [NodeId(2)]);
    }

    #[test]
    fn unknown_node_is_not_watched() {
        let lifecycle = NodeLifecycle::new();
        let token = lifecycle.subscribe(NodeId(7));
        assert!(!lifecycle.is_connected(NodeId(7)));
        assert!(!lifecycle.disconnected(NodeId(7)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn reconnect_starts_a_new_generation() {
        let lifecycle = NodeLifecycle::new();
        lifecycle.connected(NodeId(1));
        let old = lifecycle.subscribe(NodeId(1));
        lifecycle.disconnected(NodeId(1));
        assert!(lifecycle.connected(NodeId(1)));
        let new = lifecycle.subscribe(NodeId(1));
        assert!(old.is_cancelled());
        assert!(!new.is_cancelled());
    }
}
