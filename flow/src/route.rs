// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Virtual route of a data flow.
//!
//! The virtual route records which virtual nodes a packet traversed inside the tenant network
//! and why.  It is carried along with the data flow for diagnostics and is otherwise opaque.

use std::fmt::Display;

/// Why a packet was routed through a virtual node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RouteReason {
    PortMapped,
    VlanMapped,
    MacMapped,
    Forwarded,
    Redirected,
    Linked,
}

impl Display for RouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PortMapped => write!(f, "port-mapped"),
            Self::VlanMapped => write!(f, "vlan-mapped"),
            Self::MacMapped => write!(f, "mac-mapped"),
            Self::Forwarded => write!(f, "forwarded"),
            Self::Redirected => write!(f, "redirected"),
            Self::Linked => write!(f, "linked"),
        }
    }
}

/// One hop of a virtual route.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VirtualHop {
    Node { path: String, reason: RouteReason },
    /// Placeholder marking that the flow terminates without further forwarding.
    Empty,
}

impl VirtualHop {
    #[must_use]
    pub fn new(path: &str, reason: RouteReason) -> Self {
        VirtualHop::Node {
            path: path.to_owned(),
            reason,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, VirtualHop::Empty)
    }
}

impl Display for VirtualHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VirtualHop::Node { path, reason } => write!(f, "{path}({reason})"),
            VirtualHop::Empty => write!(f, "-"),
        }
    }
}

/// The sequence of virtual hops of a data flow, in traversal order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VirtualRoute(Vec<VirtualHop>);

impl VirtualRoute {
    pub fn push(&mut self, hop: VirtualHop) {
        self.0.push(hop);
    }

    /// Mark the route as terminating here.  Idempotent: no placeholder is added if the last hop
    /// already is one.
    pub fn terminate(&mut self) {
        if !self.0.last().is_some_and(VirtualHop::is_empty) {
            self.0.push(VirtualHop::Empty);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualHop> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for VirtualRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (n, hop) in self.0.iter().enumerate() {
            if n > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{hop}")?;
        }
        Ok(())
    }
}
