// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Maintains the flow indices of every tenant alongside the data flow records.

use std::sync::Arc;

use flow::{DataFlow, FlowId, L2Host, NodeId, SwitchPort, TenantName};
use tracing::{debug, trace};

use crate::store::{FlowIdSet, FlowStore, FlowTxn, IndexKey, StoreError};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("Data flow {tenant}/{id} already exists")]
    Duplicate { tenant: TenantName, id: FlowId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Every index key under which `flow` is recorded.
#[must_use]
pub fn index_keys(flow: &DataFlow) -> Vec<IndexKey> {
    let mut keys = vec![IndexKey::Condition(flow.condition_key())];
    keys.extend(flow.nodes().into_iter().map(IndexKey::Node));
    keys.extend(flow.ports().into_iter().map(IndexKey::Port));
    if let Some(host) = flow.source_host() {
        keys.push(IndexKey::SourceHost(host));
    }
    keys
}

/// Keeps data flow records and their index buckets consistent.
///
/// A data flow is reachable from a bucket if and only if its record exists: every mutation adds
/// or removes the record together with all of its index entries in a single transaction, and a
/// bucket is deleted as soon as it becomes empty.
#[derive(Debug)]
pub struct FlowIndexer<S: FlowStore> {
    store: Arc<S>,
}

impl<S: FlowStore> Clone for FlowIndexer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: FlowStore> FlowIndexer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Record the id of `flow` in every bucket it belongs to.
    pub fn index(txn: &mut dyn FlowTxn, flow: &DataFlow) -> Result<(), StoreError> {
        let tenant = flow.tenant();
        for key in index_keys(flow) {
            let mut ids = txn.read_index(tenant, &key)?.unwrap_or_default();
            ids.insert(flow.id());
            trace!("index {tenant}/{} under {key}", flow.id());
            txn.put_index(tenant, key, ids);
        }
        Ok(())
    }

    /// Remove the id of `flow` from every bucket it belongs to, deleting the buckets left empty.
    pub fn unindex(txn: &mut dyn FlowTxn, flow: &DataFlow) -> Result<(), StoreError> {
        let tenant = flow.tenant();
        for key in index_keys(flow) {
            let Some(mut ids) = txn.read_index(tenant, &key)? else {
                continue;
            };
            ids.remove(&flow.id());
            trace!("unindex {tenant}/{} from {key}", flow.id());
            if ids.is_empty() {
                txn.delete_index(tenant, &key);
            } else {
                txn.put_index(tenant, key, ids);
            }
        }
        Ok(())
    }

    /// Store `flow` and index it.
    pub fn add_data_flow(&self, flow: Arc<DataFlow>) -> Result<(), IndexError> {
        self.store.transact(|txn| {
            if txn.read_flow(flow.tenant(), flow.id())?.is_some() {
                return Err(IndexError::Duplicate {
                    tenant: flow.tenant().clone(),
                    id: flow.id(),
                });
            }
            Self::index(txn, &flow)?;
            txn.put_flow(flow.clone());
            Ok(())
        })?;
        debug!("added data flow {}/{}", flow.tenant(), flow.id());
        Ok(())
    }

    /// Remove `flow` and its index entries.
    ///
    /// Returns `false` if the flow record no longer exists, in which case nothing is modified.
    pub fn remove_data_flow(&self, flow: &DataFlow) -> Result<bool, IndexError> {
        Ok(self.take_data_flow(flow.tenant(), flow.id())?.is_some())
    }

    /// Remove the data flow `id` of `tenant` and its index entries, returning the removed record.
    pub fn take_data_flow(
        &self,
        tenant: &TenantName,
        id: FlowId,
    ) -> Result<Option<Arc<DataFlow>>, IndexError> {
        let taken = self.store.transact(|txn| {
            let Some(stored) = txn.read_flow(tenant, id)? else {
                return Ok::<_, IndexError>(None);
            };
            txn.delete_flow(tenant, id);
            Self::unindex(txn, &stored)?;
            Ok(Some(stored))
        })?;
        if taken.is_some() {
            debug!("removed data flow {tenant}/{id}");
        }
        Ok(taken)
    }

    /// Remove every data flow of `tenant`, returning the removed records.
    ///
    /// Each flow is removed in its own transaction, so readers are never blocked for the whole
    /// tenant.
    pub fn remove_tenant(&self, tenant: &TenantName) -> Result<Vec<Arc<DataFlow>>, IndexError> {
        let ids = self.store.read(|view| Ok::<_, IndexError>(view.flow_ids(tenant)?))?;
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(flow) = self.take_data_flow(tenant, id)? {
                removed.push(flow);
            }
        }
        debug!("removed {} data flows of {tenant}", removed.len());
        Ok(removed)
    }

    pub fn get(&self, tenant: &TenantName, id: FlowId) -> Result<Option<Arc<DataFlow>>, IndexError> {
        self.store.read(|view| Ok(view.read_flow(tenant, id)?))
    }

    /// Every data flow of `tenant`, ordered by id.
    pub fn all_flows(&self, tenant: &TenantName) -> Result<Vec<Arc<DataFlow>>, IndexError> {
        self.store.read(|view| {
            let mut flows = Vec::new();
            for id in view.flow_ids(tenant)? {
                if let Some(flow) = view.read_flow(tenant, id)? {
                    flows.push(flow);
                }
            }
            Ok(flows)
        })
    }

    /// Every data flow of `tenant` recorded under `key`, ordered by id.
    pub fn lookup(
        &self,
        tenant: &TenantName,
        key: &IndexKey,
    ) -> Result<Vec<Arc<DataFlow>>, IndexError> {
        self.store.read(|view| {
            let mut flows = Vec::new();
            for id in view.read_index(tenant, key)?.unwrap_or_default() {
                if let Some(flow) = view.read_flow(tenant, id)? {
                    flows.push(flow);
                }
            }
            Ok(flows)
        })
    }

    /// The ids recorded under `key`.
    pub fn index_bucket(&self, tenant: &TenantName, key: &IndexKey) -> Result<FlowIdSet, IndexError> {
        self.store
            .read(|view| Ok(view.read_index(tenant, key)?.unwrap_or_default()))
    }

    pub fn flows_by_node(
        &self,
        tenant: &TenantName,
        node: NodeId,
    ) -> Result<Vec<Arc<DataFlow>>, IndexError> {
        self.lookup(tenant, &IndexKey::Node(node))
    }

    pub fn flows_by_port(
        &self,
        tenant: &TenantName,
        port: SwitchPort,
    ) -> Result<Vec<Arc<DataFlow>>, IndexError> {
        self.lookup(tenant, &IndexKey::Port(port))
    }

    pub fn flows_by_source_host(
        &self,
        tenant: &TenantName,
        host: L2Host,
    ) -> Result<Vec<Arc<DataFlow>>, IndexError> {
        self.lookup(tenant, &IndexKey::SourceHost(host))
    }

    pub fn flows_by_condition(
        &self,
        tenant: &TenantName,
        condition: &str,
    ) -> Result<Vec<Arc<DataFlow>>, IndexError> {
        self.lookup(tenant, &IndexKey::Condition(condition.to_owned()))
    }
}
