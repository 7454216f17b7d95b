// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow model of the forwarding manager.
//!
//! This crate defines how a path through the physical network is expressed as switch rules:
//!
//! - [`FlowCookie`] ties an installed rule back to the [`FlowId`] of the data flow it belongs to.
//! - [`DataFlowBuilder`] turns a path into an ordered, loop-free list of [`FlowEntry`]s and freezes
//!   them into a [`DataFlow`].
//! - [`FlowEntry::table_miss`] builds the per-switch rule punting unmatched packets to the
//!   controller.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod action;
mod alloc;
mod builder;
mod cookie;
mod dataflow;
mod entry;
mod fmatch;
mod ident;
mod route;

pub use action::{FlowAction, vlan_rewrite};
pub use alloc::FlowIdAllocator;
pub use builder::{DataFlowBuilder, DataFlowError};
pub use cookie::{FlowCookie, FlowId, InvalidFlowId};
pub use dataflow::{DataFlow, PhysicalHop, now_millis};
pub use entry::{DEFAULT_TABLE, FlowEntry};
pub use fmatch::{ETH_TYPE_IPV4, FlowMatch, MatchError};
pub use ident::{
    IdentError, L2Host, MAX_VLAN_ID, MacAddr, NodeId, PortNumber, SwitchPort, TenantName, VlanId,
};
pub use route::{RouteReason, VirtualHop, VirtualRoute};
