// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Data flows: the ordered set of switch rules realizing one end-to-end path.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cookie::{FlowCookie, FlowId};
use crate::entry::FlowEntry;
use crate::ident::{L2Host, NodeId, PortNumber, SwitchPort, TenantName};
use crate::route::VirtualRoute;

/// Milliseconds elapsed since the UNIX epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// One switch traversed by a data flow.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PhysicalHop {
    pub node: NodeId,
    pub in_port: Option<PortNumber>,
    pub out_port: Option<PortNumber>,
}

/// An installed end-to-end forwarding path.
///
/// A `DataFlow` is built by [`crate::DataFlowBuilder`] and is immutable afterwards.  It holds at
/// least one entry; the first is the ingress entry and the last the egress entry, and no two
/// entries live on the same switch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataFlow {
    pub(crate) tenant: TenantName,
    pub(crate) id: FlowId,
    pub(crate) entries: Vec<FlowEntry>,
    pub(crate) route: VirtualRoute,
    pub(crate) source_host: Option<L2Host>,
    pub(crate) created_at: u64,
}

impl DataFlow {
    #[must_use]
    pub fn tenant(&self) -> &TenantName {
        &self.tenant
    }

    #[must_use]
    pub fn id(&self) -> FlowId {
        self.id
    }

    #[must_use]
    pub fn cookie(&self) -> FlowCookie {
        FlowCookie::encode(self.id)
    }

    #[must_use]
    pub fn entries(&self) -> &[FlowEntry] {
        &self.entries
    }

    #[must_use]
    pub fn virtual_route(&self) -> &VirtualRoute {
        &self.route
    }

    /// Creation time in milliseconds since the UNIX epoch.
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    #[must_use]
    pub fn ingress(&self) -> &FlowEntry {
        // non-empty by construction
        &self.entries[0]
    }

    #[must_use]
    pub fn egress(&self) -> &FlowEntry {
        &self.entries[self.entries.len() - 1]
    }

    /// The source host captured from the ingress match, if it could be determined.
    #[must_use]
    pub fn source_host(&self) -> Option<L2Host> {
        self.source_host
    }

    /// The match-condition index key of this flow.
    #[must_use]
    pub fn condition_key(&self) -> String {
        self.ingress().fmatch().condition_key()
    }

    /// Every switch this flow touches.
    #[must_use]
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        self.entries.iter().map(FlowEntry::node).collect()
    }

    /// Every switch port this flow touches: the ingress port and every output port of each entry.
    #[must_use]
    pub fn ports(&self) -> BTreeSet<SwitchPort> {
        self.entries
            .iter()
            .flat_map(|entry| {
                let node = entry.node();
                entry
                    .in_port()
                    .into_iter()
                    .chain(entry.out_port_numbers().map(move |p| SwitchPort::new(node, p)))
            })
            .collect()
    }

    #[must_use]
    pub fn physical_route(&self) -> Vec<PhysicalHop> {
        self.entries
            .iter()
            .map(|entry| PhysicalHop {
                node: entry.node(),
                in_port: entry.fmatch().in_port,
                out_port: entry.out_port_numbers().next(),
            })
            .collect()
    }

    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.entries.iter().any(|entry| entry.node() == node)
    }

    #[must_use]
    pub fn contains_port(&self, port: SwitchPort) -> bool {
        self.entries.iter().any(|entry| {
            entry.node() == port.node
                && (entry.in_port() == Some(port)
                    || entry.out_port_numbers().any(|p| p == port.port))
        })
    }

    /// The entry installed on `node`, if any.
    #[must_use]
    pub fn entry_on(&self, node: NodeId) -> Option<&FlowEntry> {
        self.entries.iter().find(|entry| entry.node() == node)
    }
}

impl Display for DataFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "data flow {}/{} cookie={} created={}",
            self.tenant,
            self.id,
            self.cookie(),
            self.created_at
        )?;
        for entry in &self.entries {
            writeln!(f, "  {entry}")?;
        }
        if !self.route.is_empty() {
            writeln!(f, "  route: {}", self.route)?;
        }
        Ok(())
    }
}
