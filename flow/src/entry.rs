// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Switch flow entries.

use std::fmt::Display;

use crate::action::FlowAction;
use crate::cookie::FlowCookie;
use crate::fmatch::FlowMatch;
use crate::ident::{NodeId, PortNumber, SwitchPort};

/// Flow table where every rule of ours is installed.
pub const DEFAULT_TABLE: u8 = 0;

/// A single switch rule.  Entries are immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlowEntry {
    pub(crate) node: NodeId,
    pub(crate) cookie: FlowCookie,
    pub(crate) order: u32,
    pub(crate) table: u8,
    pub(crate) priority: u16,
    pub(crate) idle_timeout: u16,
    pub(crate) hard_timeout: u16,
    pub(crate) fmatch: FlowMatch,
    pub(crate) actions: Vec<FlowAction>,
}

impl FlowEntry {
    /// Order of the first entry of a data flow.
    pub const MIN_ORDER: u32 = 0;

    /// Priority of the table-miss entry.
    pub const TABLE_MISS_PRIORITY: u16 = 0;

    /// Build the table-miss entry of `node`: the lowest priority catch-all rule punting every
    /// unmatched packet to the controller.
    #[must_use]
    pub fn table_miss(node: NodeId) -> FlowEntry {
        Self::table_miss_at(node, Self::TABLE_MISS_PRIORITY)
    }

    /// Same as [`FlowEntry::table_miss`], installed with `priority`.
    #[must_use]
    pub fn table_miss_at(node: NodeId, priority: u16) -> FlowEntry {
        FlowEntry {
            node,
            cookie: FlowCookie::TABLE_MISS,
            order: Self::MIN_ORDER,
            table: DEFAULT_TABLE,
            priority,
            idle_timeout: 0,
            hard_timeout: 0,
            fmatch: FlowMatch::any(),
            actions: vec![FlowAction::ToController {
                max_len: FlowAction::CONTROLLER_MAX_LEN,
            }],
        }
    }

    /// The identifier under which the table-miss entry of `node` is installed.
    #[must_use]
    pub fn table_miss_id(node: NodeId) -> String {
        format!("vtn:table-miss:{node}")
    }

    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn cookie(&self) -> FlowCookie {
        self.cookie
    }

    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn table(&self) -> u8 {
        self.table
    }

    #[must_use]
    pub fn priority(&self) -> u16 {
        self.priority
    }

    #[must_use]
    pub fn idle_timeout(&self) -> u16 {
        self.idle_timeout
    }

    #[must_use]
    pub fn hard_timeout(&self) -> u16 {
        self.hard_timeout
    }

    #[must_use]
    pub fn fmatch(&self) -> &FlowMatch {
        &self.fmatch
    }

    #[must_use]
    pub fn actions(&self) -> &[FlowAction] {
        &self.actions
    }

    /// The port this entry matches packets on.
    #[must_use]
    pub fn in_port(&self) -> Option<SwitchPort> {
        self.fmatch
            .in_port
            .map(|port| SwitchPort::new(self.node, port))
    }

    /// The first port this entry forwards packets to; `None` for a drop entry.
    #[must_use]
    pub fn out_port(&self) -> Option<SwitchPort> {
        self.actions
            .iter()
            .find_map(FlowAction::output_port)
            .map(|port| SwitchPort::new(self.node, port))
    }

    /// Every port number this entry outputs to.
    pub fn out_port_numbers(&self) -> impl Iterator<Item = PortNumber> + '_ {
        self.actions.iter().filter_map(FlowAction::output_port)
    }

    #[must_use]
    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Display for FlowEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cookie={} order={} table={} priority={} idle={} hard={} match=[{}] actions=[",
            self.node,
            self.cookie,
            self.order,
            self.table,
            self.priority,
            self.idle_timeout,
            self.hard_timeout,
            self.fmatch
        )?;
        for (n, action) in self.actions.iter().enumerate() {
            if n > 0 {
                write!(f, ",")?;
            }
            write!(f, "{action}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_miss_entry() {
        let entry = FlowEntry::table_miss(NodeId(5));
        assert_eq!(entry.cookie(), FlowCookie::TABLE_MISS);
        assert_eq!(entry.priority(), 0);
        assert_eq!(entry.idle_timeout(), 0);
        assert_eq!(entry.hard_timeout(), 0);
        assert!(entry.fmatch().is_empty());
        assert_eq!(
            entry.actions(),
            &[FlowAction::ToController { max_len: u16::MAX }]
        );
        assert_eq!(entry.in_port(), None);
        assert_eq!(entry.out_port(), None);
        assert_eq!(FlowEntry::table_miss_id(NodeId(5)), "vtn:table-miss:openflow:5");
    }
}
