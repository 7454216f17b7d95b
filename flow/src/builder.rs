// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Data flow builder.
//!
//! [`DataFlowBuilder`] accumulates the per-switch entries realizing a path computed elsewhere, then
//! freezes them into a [`DataFlow`].  A builder is in one of two states: *building*, where entries
//! and virtual hops may be appended, and *sealed*, where the data flow is frozen and any further
//! mutation is rejected.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::action::{FlowAction, vlan_rewrite};
use crate::cookie::{FlowCookie, FlowId};
use crate::dataflow::{DataFlow, now_millis};
use crate::entry::{DEFAULT_TABLE, FlowEntry};
use crate::fmatch::{FlowMatch, MatchError};
use crate::ident::{L2Host, NodeId, SwitchPort, TenantName, VlanId};
use crate::route::{VirtualHop, VirtualRoute};

/// Errors raised while building a data flow.
///
/// These are programming or routing errors: a failed build must not be retried as is.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DataFlowError {
    #[error("Path visits {0} more than once")]
    Loop(NodeId),
    #[error("Data flow is already sealed")]
    Sealed,
    #[error("Data flow has no entries")]
    Empty,
    #[error("Internal hop from {src} to {dst} crosses switches")]
    NodeMismatch { src: SwitchPort, dst: SwitchPort },
    #[error("Data flow was sealed as {sealed}, not {requested}")]
    IdMismatch { sealed: FlowId, requested: FlowId },
    #[error("Invalid match condition: {0}")]
    InvalidMatch(#[from] MatchError),
}

/// An entry appended to a builder, not yet bound to a data flow.
#[derive(Debug)]
struct PendingEntry {
    node: NodeId,
    fmatch: FlowMatch,
    actions: Vec<FlowAction>,
}

#[derive(Debug)]
struct Building {
    entries: Vec<PendingEntry>,
    visited: HashSet<NodeId>,
    route: VirtualRoute,
    source_host: Option<L2Host>,
}

#[derive(Debug)]
enum BuildState {
    Building(Building),
    Sealed(DataFlow),
}

/// Builder of a [`DataFlow`].
#[derive(Debug)]
pub struct DataFlowBuilder {
    tenant: TenantName,
    condition: FlowMatch,
    priority: u16,
    idle_timeout: u16,
    hard_timeout: u16,
    state: BuildState,
}

impl DataFlowBuilder {
    /// Start building a data flow of `tenant` for packets matching `condition`.
    ///
    /// The ingress port of `condition` is ignored: every entry matches on the port it was
    /// appended with.  `idle_timeout` and `hard_timeout` apply to the ingress entry only.
    ///
    /// # Errors
    ///
    /// Returns an error if `condition` is inconsistent.
    pub fn new(
        tenant: TenantName,
        condition: FlowMatch,
        priority: u16,
        idle_timeout: u16,
        hard_timeout: u16,
    ) -> Result<Self, DataFlowError> {
        condition.validate()?;
        Ok(Self {
            tenant,
            condition: FlowMatch {
                in_port: None,
                ..condition
            },
            priority,
            idle_timeout,
            hard_timeout,
            state: BuildState::Building(Building {
                entries: Vec::new(),
                visited: HashSet::new(),
                route: VirtualRoute::default(),
                source_host: None,
            }),
        })
    }

    #[must_use]
    pub fn tenant(&self) -> &TenantName {
        &self.tenant
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        matches!(self.state, BuildState::Sealed(_))
    }

    /// Number of entries appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.state {
            BuildState::Building(building) => building.entries.len(),
            BuildState::Sealed(flow) => flow.entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn building(&mut self) -> Result<&mut Building, DataFlowError> {
        match &mut self.state {
            BuildState::Building(building) => Ok(building),
            BuildState::Sealed(_) => Err(DataFlowError::Sealed),
        }
    }

    fn push(
        &mut self,
        node: NodeId,
        fmatch: FlowMatch,
        actions: Vec<FlowAction>,
    ) -> Result<&mut Self, DataFlowError> {
        let building = self.building()?;
        if !building.visited.insert(node) {
            debug!("loop detected: {node} is already part of the path");
            return Err(DataFlowError::Loop(node));
        }
        if building.entries.is_empty() {
            building.source_host = fmatch.source_host();
        }
        trace!("appending entry #{} on {node}", building.entries.len());
        building.entries.push(PendingEntry {
            node,
            fmatch,
            actions,
        });
        Ok(self)
    }

    /// Append an entry forwarding packets received on `src` to `dst`, on the same switch.
    ///
    /// # Errors
    ///
    /// Fails if the builder is sealed, if `src` and `dst` live on different switches or if the
    /// switch is already part of the path.
    pub fn add_internal_flow(
        &mut self,
        src: SwitchPort,
        dst: SwitchPort,
    ) -> Result<&mut Self, DataFlowError> {
        if src.node != dst.node {
            return Err(DataFlowError::NodeMismatch { src, dst });
        }
        let fmatch = self.condition.clone().with_in_port(src.port);
        self.push(src.node, fmatch, vec![FlowAction::Output(dst.port)])
    }

    /// Append the entry which delivers packets received on `ingress` out of `egress`.
    ///
    /// Packets are matched with VLAN `in_vlan`, rewritten to `out_vlan`, run through
    /// `filter_actions` and sent out of `egress`.
    ///
    /// # Errors
    ///
    /// Fails if the builder is sealed, if the ports live on different switches or if the switch is
    /// already part of the path.
    pub fn add_egress_flow(
        &mut self,
        ingress: SwitchPort,
        egress: SwitchPort,
        in_vlan: VlanId,
        out_vlan: VlanId,
        filter_actions: impl IntoIterator<Item = FlowAction>,
    ) -> Result<&mut Self, DataFlowError> {
        if ingress.node != egress.node {
            return Err(DataFlowError::NodeMismatch {
                src: ingress,
                dst: egress,
            });
        }
        let fmatch = self
            .condition
            .clone()
            .with_in_port(ingress.port)
            .with_vlan(in_vlan);
        let mut actions = vlan_rewrite(in_vlan, out_vlan);
        actions.extend(filter_actions);
        actions.push(FlowAction::Output(egress.port));
        self.push(ingress.node, fmatch, actions)
    }

    /// Append an entry discarding every packet received on `ingress`.
    ///
    /// # Errors
    ///
    /// Fails if the builder is sealed or if the switch is already part of the path.
    pub fn add_drop_flow(&mut self, ingress: SwitchPort) -> Result<&mut Self, DataFlowError> {
        let fmatch = self.condition.clone().with_in_port(ingress.port);
        self.push(ingress.node, fmatch, vec![])
    }

    /// Append a hop to the virtual route.
    ///
    /// # Errors
    ///
    /// Fails if the builder is sealed.
    pub fn add_virtual_hop(&mut self, hop: VirtualHop) -> Result<&mut Self, DataFlowError> {
        self.building()?.route.push(hop);
        Ok(self)
    }

    /// Mark the virtual route as terminating without further forwarding.
    ///
    /// # Errors
    ///
    /// Fails if the builder is sealed.
    pub fn terminate_route(&mut self) -> Result<&mut Self, DataFlowError> {
        self.building()?.route.terminate();
        Ok(self)
    }

    /// Freeze the data flow under `id`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// See [`DataFlowBuilder::seal_at`].
    pub fn seal(&mut self, id: FlowId) -> Result<&DataFlow, DataFlowError> {
        self.seal_at(id, now_millis())
    }

    /// Freeze the data flow under `id`, created at `created_at` milliseconds since the epoch.
    ///
    /// Entries get the cookie of `id` and consecutive order numbers starting at
    /// [`FlowEntry::MIN_ORDER`].  Only the ingress entry gets the builder timeouts; every other
    /// entry never expires on its own and is removed through the flow index instead.
    ///
    /// Sealing an already sealed builder again does not rebuild the entries: it only refreshes the
    /// creation time.
    ///
    /// # Errors
    ///
    /// Fails if no entry was appended, or if the builder was already sealed with another id.
    pub fn seal_at(&mut self, id: FlowId, created_at: u64) -> Result<&DataFlow, DataFlowError> {
        match &mut self.state {
            BuildState::Sealed(flow) => {
                if flow.id != id {
                    return Err(DataFlowError::IdMismatch {
                        sealed: flow.id,
                        requested: id,
                    });
                }
                flow.created_at = created_at;
            }
            BuildState::Building(building) => {
                if building.entries.is_empty() {
                    return Err(DataFlowError::Empty);
                }
                let cookie = FlowCookie::encode(id);
                let entries = std::mem::take(&mut building.entries)
                    .into_iter()
                    .zip(FlowEntry::MIN_ORDER..)
                    .map(|(pending, order)| {
                        let (idle_timeout, hard_timeout) = if order == FlowEntry::MIN_ORDER {
                            (self.idle_timeout, self.hard_timeout)
                        } else {
                            (0, 0)
                        };
                        FlowEntry {
                            node: pending.node,
                            cookie,
                            order,
                            table: DEFAULT_TABLE,
                            priority: self.priority,
                            idle_timeout,
                            hard_timeout,
                            fmatch: pending.fmatch,
                            actions: pending.actions,
                        }
                    })
                    .collect();
                let flow = DataFlow {
                    tenant: self.tenant.clone(),
                    id,
                    entries,
                    route: std::mem::take(&mut building.route),
                    source_host: building.source_host,
                    created_at,
                };
                debug!("sealed data flow {}/{id}", self.tenant);
                self.state = BuildState::Sealed(flow);
            }
        }
        self.data_flow().ok_or(DataFlowError::Empty)
    }

    /// The sealed data flow, if any.
    #[must_use]
    pub fn data_flow(&self) -> Option<&DataFlow> {
        match &self.state {
            BuildState::Sealed(flow) => Some(flow),
            BuildState::Building(_) => None,
        }
    }

    /// Consume the builder, returning the sealed data flow if any.
    #[must_use]
    pub fn into_data_flow(self) -> Option<DataFlow> {
        match self.state {
            BuildState::Sealed(flow) => Some(flow),
            BuildState::Building(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ident::MacAddr;
    use crate::route::RouteReason;
    use tracing_test::traced_test;

    fn tenant() -> TenantName {
        TenantName::new("vtn1").unwrap()
    }

    fn port(node: u64, port: u32) -> SwitchPort {
        SwitchPort::new(NodeId(node), port)
    }

    fn condition() -> FlowMatch {
        FlowMatch::any()
            .with_dl_src(MacAddr([0x00, 0x00, 0x5e, 0x00, 0x01, 0x01]))
            .with_dl_dst(MacAddr([0x00, 0x00, 0x5e, 0x00, 0x01, 0x02]))
            .with_vlan(0)
    }

    fn three_hop() -> DataFlowBuilder {
        let mut builder = DataFlowBuilder::new(tenant(), condition(), 10, 300, 0).unwrap();
        builder
            .add_internal_flow(port(1, 1), port(1, 2))
            .unwrap()
            .add_internal_flow(port(2, 1), port(2, 2))
            .unwrap()
            .add_egress_flow(port(3, 1), port(3, 9), 0, 0, [])
            .unwrap();
        builder
    }

    #[test]
    fn seal_assigns_cookie_order_and_timeouts() {
        let mut builder = three_hop();
        let id = FlowId::new(7).unwrap();
        let flow = builder.seal_at(id, 1000).unwrap();
        assert_eq!(flow.entries().len(), 3);
        for (n, entry) in flow.entries().iter().enumerate() {
            assert_eq!(entry.cookie(), FlowCookie(FlowCookie::TAG | 7));
            assert_eq!(entry.order() as usize, n);
            assert_eq!(entry.priority(), 10);
            if n == 0 {
                assert_eq!((entry.idle_timeout(), entry.hard_timeout()), (300, 0));
            } else {
                assert_eq!((entry.idle_timeout(), entry.hard_timeout()), (0, 0));
            }
        }
        assert_eq!(flow.ingress().node(), NodeId(1));
        assert_eq!(flow.egress().node(), NodeId(3));
        assert_eq!(flow.egress().out_port(), Some(port(3, 9)));
        assert_eq!(flow.created_at(), 1000);
        assert!(flow.source_host().is_some());
    }

    #[test]
    #[traced_test]
    fn loop_is_rejected_before_append() {
        let mut builder = DataFlowBuilder::new(tenant(), condition(), 10, 0, 0).unwrap();
        builder
            .add_internal_flow(port(1, 1), port(1, 2))
            .unwrap()
            .add_internal_flow(port(2, 1), port(2, 2))
            .unwrap();
        assert_eq!(
            builder.add_drop_flow(port(1, 3)).unwrap_err(),
            DataFlowError::Loop(NodeId(1))
        );
        assert_eq!(builder.len(), 2);
        assert!(logs_contain("loop detected: openflow:1"));
    }

    #[test]
    fn loop_prevention_contract() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|nodes: Vec<u8>| {
                let mut builder = DataFlowBuilder::new(tenant(), condition(), 1, 0, 0).unwrap();
                let mut seen = HashSet::new();
                for node in nodes {
                    let result = builder.add_drop_flow(port(u64::from(node), 1)).map(|_| ());
                    if seen.insert(node) {
                        assert!(result.is_ok());
                    } else {
                        assert_eq!(result, Err(DataFlowError::Loop(NodeId(u64::from(node)))));
                    }
                    assert_eq!(builder.len(), seen.len());
                }
            });
    }

    #[test]
    fn internal_flow_must_stay_on_one_switch() {
        let mut builder = DataFlowBuilder::new(tenant(), condition(), 10, 0, 0).unwrap();
        assert_eq!(
            builder.add_internal_flow(port(1, 1), port(2, 2)).unwrap_err(),
            DataFlowError::NodeMismatch {
                src: port(1, 1),
                dst: port(2, 2)
            }
        );
        assert!(builder.is_empty());
    }

    #[test]
    fn egress_flow_actions() {
        let mut builder = DataFlowBuilder::new(tenant(), condition(), 10, 0, 0).unwrap();
        builder
            .add_egress_flow(port(4, 1), port(4, 2), 0, 20, [FlowAction::SetDscp(10)])
            .unwrap();
        let flow = builder.seal_at(FlowId::new(1).unwrap(), 0).unwrap();
        let entry = flow.ingress();
        assert_eq!(entry.fmatch().in_port, Some(1));
        assert_eq!(entry.fmatch().vlan, Some(0));
        assert_eq!(
            entry.actions(),
            &[
                FlowAction::PushVlan,
                FlowAction::SetVlanId(20),
                FlowAction::SetDscp(10),
                FlowAction::Output(2),
            ]
        );
    }

    #[test]
    fn drop_flow_has_no_actions() {
        let mut builder = DataFlowBuilder::new(tenant(), condition(), 10, 0, 0).unwrap();
        builder.add_drop_flow(port(4, 1)).unwrap();
        let flow = builder.seal_at(FlowId::new(1).unwrap(), 0).unwrap();
        assert!(flow.ingress().is_drop());
        assert_eq!(flow.ports().len(), 1);
    }

    #[test]
    fn reseal_refreshes_timestamp_only() {
        let mut builder = three_hop();
        let id = FlowId::new(7).unwrap();
        let first = builder.seal_at(id, 1000).unwrap().clone();
        let second = builder.seal_at(id, 2000).unwrap();
        assert_eq!(first.entries(), second.entries());
        assert_eq!(second.created_at(), 2000);
        assert_eq!(
            builder.seal_at(FlowId::new(8).unwrap(), 3000).unwrap_err(),
            DataFlowError::IdMismatch {
                sealed: id,
                requested: FlowId::new(8).unwrap()
            }
        );
    }

    #[test]
    fn sealed_builder_rejects_mutation() {
        let mut builder = three_hop();
        builder.seal_at(FlowId::new(7).unwrap(), 0).unwrap();
        assert!(builder.is_sealed());
        assert_eq!(
            builder.add_drop_flow(port(9, 1)).unwrap_err(),
            DataFlowError::Sealed
        );
        assert_eq!(builder.terminate_route().unwrap_err(), DataFlowError::Sealed);
        assert_eq!(builder.len(), 3);
    }

    #[test]
    fn empty_builder_cannot_seal() {
        let mut builder = DataFlowBuilder::new(tenant(), condition(), 10, 0, 0).unwrap();
        assert_eq!(
            builder.seal(FlowId::new(1).unwrap()).unwrap_err(),
            DataFlowError::Empty
        );
        assert!(!builder.is_sealed());
    }

    #[test]
    fn source_host_comes_from_ingress_only() {
        let mut builder =
            DataFlowBuilder::new(tenant(), FlowMatch::any().with_vlan(5), 10, 0, 0).unwrap();
        builder.add_drop_flow(port(1, 1)).unwrap();
        let flow = builder.seal_at(FlowId::new(1).unwrap(), 0).unwrap();
        assert_eq!(flow.source_host(), None);
    }

    #[test]
    fn virtual_route_is_carried() {
        let mut builder = three_hop();
        builder
            .add_virtual_hop(VirtualHop::new("vtn1/vbr1", RouteReason::VlanMapped))
            .unwrap()
            .terminate_route()
            .unwrap()
            .terminate_route()
            .unwrap();
        let flow = builder.seal_at(FlowId::new(2).unwrap(), 0).unwrap();
        assert_eq!(flow.virtual_route().len(), 2);
    }

    #[test]
    fn derived_views() {
        let mut builder = three_hop();
        let flow = builder.seal_at(FlowId::new(7).unwrap(), 0).unwrap();
        let nodes: Vec<_> = flow.nodes().into_iter().collect();
        assert_eq!(nodes, vec![NodeId(1), NodeId(2), NodeId(3)]);
        let ports: Vec<_> = flow.ports().into_iter().collect();
        assert_eq!(
            ports,
            vec![
                port(1, 1),
                port(1, 2),
                port(2, 1),
                port(2, 2),
                port(3, 1),
                port(3, 9)
            ]
        );
        let route = flow.physical_route();
        assert_eq!(route[1].in_port, Some(1));
        assert_eq!(route[1].out_port, Some(2));
        for p in flow.ports() {
            assert!(flow.contains_port(p));
        }
        // port numbers only count on their own switch
        assert!(!flow.contains_port(port(1, 9)));
        assert!(!flow.contains_port(port(2, 3)));
        assert!(!flow.contains_node(NodeId(4)));
        assert_eq!(flow.entry_on(NodeId(2)).map(FlowEntry::order), Some(1));
    }
}
