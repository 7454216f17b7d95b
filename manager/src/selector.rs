// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Selection of the data flows to remove.

use std::fmt::Display;

use flow::{FlowId, L2Host, NodeId, SwitchPort};
use flow_index::IndexKey;

/// Which data flows of a tenant an operation applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowSelector {
    Id(FlowId),
    /// Every flow traversing a switch.
    Node(NodeId),
    /// Every flow entering or leaving a switch through a port.
    Port(SwitchPort),
    /// Every flow sent by a host.
    SourceHost(L2Host),
    /// Every flow matching a condition, as rendered by `FlowMatch::condition_key`.
    Condition(String),
    All,
}

impl FlowSelector {
    /// The index bucket holding the selected flows, if the selector maps to one.
    #[must_use]
    pub fn index_key(&self) -> Option<IndexKey> {
        match self {
            FlowSelector::Node(node) => Some(IndexKey::Node(*node)),
            FlowSelector::Port(port) => Some(IndexKey::Port(*port)),
            FlowSelector::SourceHost(host) => Some(IndexKey::SourceHost(*host)),
            FlowSelector::Condition(cond) => Some(IndexKey::Condition(cond.clone())),
            FlowSelector::Id(_) | FlowSelector::All => None,
        }
    }
}

impl Display for FlowSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowSelector::Id(id) => write!(f, "id {id}"),
            FlowSelector::Node(node) => write!(f, "node {node}"),
            FlowSelector::Port(port) => write!(f, "port {port}"),
            FlowSelector::SourceHost(host) => write!(f, "source {host}"),
            FlowSelector::Condition(cond) => write!(f, "condition {cond}"),
            FlowSelector::All => write!(f, "all"),
        }
    }
}
