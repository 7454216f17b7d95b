// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Data flow records and their lookup indices.
//!
//! Data flows are kept per tenant and indexed by switch, by switch port, by source host and by
//! match condition, so that the flows affected by a topology or host change can be found without
//! scanning.  Records and index buckets are only ever modified together, in one
//! [`FlowStore::transact`] call.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod indexer;
mod store;

pub use indexer::{FlowIndexer, IndexError, index_keys};
pub use store::{FlowIdSet, FlowStore, FlowTxn, IndexKey, MemoryStore, StoreError};
