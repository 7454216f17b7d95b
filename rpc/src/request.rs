// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Requests sent to switches and the replies and notifications received from them.

use std::fmt::Display;
use std::time::Duration;

use flow::{DEFAULT_TABLE, FlowCookie, FlowEntry, FlowMatch, NodeId};

/// Install one flow entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddFlowRequest {
    pub node: NodeId,
    /// Identifier under which the entry is installed.
    pub flow_id: String,
    pub entry: FlowEntry,
}

impl AddFlowRequest {
    #[must_use]
    pub fn new(entry: FlowEntry) -> Self {
        let flow_id = match entry.cookie().decode() {
            Some(id) => format!("vtn:{id}-{}", entry.order()),
            None if entry.cookie().is_table_miss() => FlowEntry::table_miss_id(entry.node()),
            None => format!("vtn:{}-{}", entry.cookie(), entry.order()),
        };
        Self {
            node: entry.node(),
            flow_id,
            entry,
        }
    }
}

/// Delete flow entries matching a cookie, and optionally a match and a priority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoveFlowRequest {
    pub node: NodeId,
    pub table: u8,
    pub cookie: FlowCookie,
    pub cookie_mask: u64,
    pub fmatch: Option<FlowMatch>,
    pub priority: Option<u16>,
    /// Match and priority must be equal rather than a superset.
    pub strict: bool,
    /// Ask the switch to complete every earlier flow-mod before acknowledging this one.
    pub barrier: bool,
}

impl RemoveFlowRequest {
    /// A strict removal of exactly `entry`.
    #[must_use]
    pub fn for_entry(entry: &FlowEntry) -> Self {
        Self {
            node: entry.node(),
            table: entry.table(),
            cookie: entry.cookie(),
            cookie_mask: FlowCookie::EXACT_MASK,
            fmatch: Some(entry.fmatch().clone()),
            priority: Some(entry.priority()),
            strict: true,
            barrier: false,
        }
    }

    /// A removal of every entry of `node` whose cookie matches `cookie` under `cookie_mask`.
    #[must_use]
    pub fn by_cookie(node: NodeId, cookie: FlowCookie, cookie_mask: u64) -> Self {
        Self {
            node,
            table: DEFAULT_TABLE,
            cookie,
            cookie_mask,
            fmatch: None,
            priority: None,
            strict: false,
            barrier: false,
        }
    }
}

impl Display for RemoveFlowRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "remove {} table={} cookie={}/{:#018x}",
            self.node, self.table, self.cookie, self.cookie_mask
        )?;
        if let Some(fmatch) = &self.fmatch {
            write!(f, " match=[{fmatch}]")?;
        }
        if let Some(priority) = self.priority {
            write!(f, " priority={priority}")?;
        }
        if self.strict {
            write!(f, " strict")?;
        }
        if self.barrier {
            write!(f, " barrier")?;
        }
        Ok(())
    }
}

/// Read the statistics of the flow entries of a switch matching a cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadStatsRequest {
    pub node: NodeId,
    pub table: u8,
    pub cookie: FlowCookie,
    pub cookie_mask: u64,
}

impl ReadStatsRequest {
    /// Statistics of every entry of ours installed on `node`.
    #[must_use]
    pub fn vtn_flows(node: NodeId) -> Self {
        Self {
            node,
            table: DEFAULT_TABLE,
            cookie: FlowCookie(FlowCookie::TAG),
            cookie_mask: FlowCookie::TAG_MASK,
        }
    }
}

/// Counters of one flow entry as reported by a switch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowStatsReply {
    pub cookie: FlowCookie,
    pub table: u8,
    pub priority: u16,
    pub fmatch: FlowMatch,
    pub packets: u64,
    pub bytes: u64,
    /// How long the entry has been installed.
    pub duration: Duration,
}

/// Why a switch removed a flow entry on its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RemovedReason {
    IdleTimeout,
    HardTimeout,
    Delete,
    GroupDelete,
}

impl Display for RemovedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovedReason::IdleTimeout => write!(f, "idle-timeout"),
            RemovedReason::HardTimeout => write!(f, "hard-timeout"),
            RemovedReason::Delete => write!(f, "delete"),
            RemovedReason::GroupDelete => write!(f, "group-delete"),
        }
    }
}

/// Notification that a switch removed a flow entry, with its final counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowRemoved {
    pub node: NodeId,
    pub cookie: FlowCookie,
    pub table: u8,
    pub priority: u16,
    pub fmatch: FlowMatch,
    pub reason: RemovedReason,
    pub packets: u64,
    pub bytes: u64,
    pub duration: Duration,
}
