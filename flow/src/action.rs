// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow actions.

use std::fmt::Display;
use std::net::Ipv4Addr;

use crate::ident::{MacAddr, PortNumber, VlanId};

/// An action applied by a switch rule to the packets it matches.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FlowAction {
    Output(PortNumber),
    PushVlan,
    PopVlan,
    SetVlanId(VlanId),
    SetDlSrc(MacAddr),
    SetDlDst(MacAddr),
    SetInet4Src(Ipv4Addr),
    SetInet4Dst(Ipv4Addr),
    SetDscp(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    /// Punt the packet to the controller, truncated to `max_len` bytes.
    ToController { max_len: u16 },
}

impl FlowAction {
    /// Maximum length requested when punting a packet to the controller: the whole packet.
    pub const CONTROLLER_MAX_LEN: u16 = u16::MAX;

    /// The output port of this action, if it is an output action.
    #[must_use]
    pub fn output_port(&self) -> Option<PortNumber> {
        match self {
            FlowAction::Output(port) => Some(*port),
            _ => None,
        }
    }
}

/// Actions rewriting the VLAN of a packet forwarded from `in_vlan` to `out_vlan`.
///
/// A VLAN id of zero stands for untagged frames.
#[must_use]
pub fn vlan_rewrite(in_vlan: VlanId, out_vlan: VlanId) -> Vec<FlowAction> {
    match (in_vlan, out_vlan) {
        (a, b) if a == b => vec![],
        (0, out) => vec![FlowAction::PushVlan, FlowAction::SetVlanId(out)],
        (_, 0) => vec![FlowAction::PopVlan],
        (_, out) => vec![FlowAction::SetVlanId(out)],
    }
}

impl Display for FlowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowAction::Output(port) => write!(f, "output:{port}"),
            FlowAction::PushVlan => write!(f, "push_vlan"),
            FlowAction::PopVlan => write!(f, "pop_vlan"),
            FlowAction::SetVlanId(vid) => write!(f, "set_vlan_vid:{vid}"),
            FlowAction::SetDlSrc(mac) => write!(f, "set_dl_src:{mac}"),
            FlowAction::SetDlDst(mac) => write!(f, "set_dl_dst:{mac}"),
            FlowAction::SetInet4Src(ip) => write!(f, "set_nw_src:{ip}"),
            FlowAction::SetInet4Dst(ip) => write!(f, "set_nw_dst:{ip}"),
            FlowAction::SetDscp(dscp) => write!(f, "set_dscp:{dscp}"),
            FlowAction::SetTpSrc(port) => write!(f, "set_tp_src:{port}"),
            FlowAction::SetTpDst(port) => write!(f, "set_tp_dst:{port}"),
            FlowAction::ToController { max_len } => write!(f, "controller:{max_len}"),
        }
    }
}
