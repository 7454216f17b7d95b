// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Transactional store of data flows and flow indices.
//!
//! The store holds two logical structures per tenant: data flow records keyed by [`FlowId`], and
//! index buckets keyed by [`IndexKey`].  All mutation goes through [`FlowStore::transact`], whose
//! closure sees its own writes and whose writes become visible to other readers all at once, or
//! not at all if the closure fails.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::sync::Arc;

use ahash::RandomState;
use flow::{DataFlow, FlowId, L2Host, NodeId, SwitchPort, TenantName};
use parking_lot::RwLock;
use tracing::trace;

/// Set of flow ids held by one index bucket.
pub type FlowIdSet = BTreeSet<FlowId>;

/// Key of an index bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    Node(NodeId),
    Port(SwitchPort),
    SourceHost(L2Host),
    Condition(String),
}

impl Display for IndexKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKey::Node(node) => write!(f, "node:{node}"),
            IndexKey::Port(port) => write!(f, "port:{port}"),
            IndexKey::SourceHost(host) => write!(f, "host:{host}"),
            IndexKey::Condition(cond) => write!(f, "condition:{cond}"),
        }
    }
}

/// Errors reported by a [`FlowStore`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Transaction aborted: {0}")]
    Aborted(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Operations available inside a transaction.
pub trait FlowTxn {
    fn read_flow(&self, tenant: &TenantName, id: FlowId)
    -> Result<Option<Arc<DataFlow>>, StoreError>;
    fn put_flow(&mut self, flow: Arc<DataFlow>);
    fn delete_flow(&mut self, tenant: &TenantName, id: FlowId);

    fn read_index(&self, tenant: &TenantName, key: &IndexKey)
    -> Result<Option<FlowIdSet>, StoreError>;
    fn put_index(&mut self, tenant: &TenantName, key: IndexKey, ids: FlowIdSet);
    fn delete_index(&mut self, tenant: &TenantName, key: &IndexKey);

    /// Ids of every data flow of `tenant`, as seen by this transaction.
    fn flow_ids(&self, tenant: &TenantName) -> Result<Vec<FlowId>, StoreError>;
}

/// A store applying read-modify-write plans atomically.
pub trait FlowStore: Send + Sync {
    /// Run `plan` in a transaction.
    ///
    /// The writes made by `plan` are applied atomically if it returns `Ok`, and discarded if it
    /// returns `Err`.
    fn transact<R, E, F>(&self, plan: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn FlowTxn) -> Result<R, E>,
        E: From<StoreError>;

    /// Run `query` against a consistent view of the store.
    fn read<R, E, F>(&self, query: F) -> Result<R, E>
    where
        F: FnOnce(&dyn FlowTxn) -> Result<R, E>,
        E: From<StoreError>;
}

#[derive(Debug)]
struct TenantTables {
    flows: HashMap<FlowId, Arc<DataFlow>, RandomState>,
    index: HashMap<IndexKey, FlowIdSet, RandomState>,
}

impl Default for TenantTables {
    fn default() -> Self {
        Self {
            flows: HashMap::with_hasher(RandomState::with_seed(0)),
            index: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }
}

impl TenantTables {
    fn is_empty(&self) -> bool {
        self.flows.is_empty() && self.index.is_empty()
    }
}

type Tables = HashMap<TenantName, TenantTables>;

/// A transaction staging its writes over a borrowed view of the tables.
struct StagedTxn<'a> {
    base: &'a Tables,
    flows: HashMap<(TenantName, FlowId), Option<Arc<DataFlow>>>,
    index: HashMap<(TenantName, IndexKey), Option<FlowIdSet>>,
}

impl<'a> StagedTxn<'a> {
    fn new(base: &'a Tables) -> Self {
        Self {
            base,
            flows: HashMap::new(),
            index: HashMap::new(),
        }
    }
}

impl FlowTxn for StagedTxn<'_> {
    fn read_flow(
        &self,
        tenant: &TenantName,
        id: FlowId,
    ) -> Result<Option<Arc<DataFlow>>, StoreError> {
        if let Some(staged) = self.flows.get(&(tenant.clone(), id)) {
            return Ok(staged.clone());
        }
        Ok(self
            .base
            .get(tenant)
            .and_then(|tables| tables.flows.get(&id))
            .cloned())
    }

    fn put_flow(&mut self, flow: Arc<DataFlow>) {
        self.flows
            .insert((flow.tenant().clone(), flow.id()), Some(flow));
    }

    fn delete_flow(&mut self, tenant: &TenantName, id: FlowId) {
        self.flows.insert((tenant.clone(), id), None);
    }

    fn read_index(
        &self,
        tenant: &TenantName,
        key: &IndexKey,
    ) -> Result<Option<FlowIdSet>, StoreError> {
        if let Some(staged) = self.index.get(&(tenant.clone(), key.clone())) {
            return Ok(staged.clone());
        }
        Ok(self
            .base
            .get(tenant)
            .and_then(|tables| tables.index.get(key))
            .cloned())
    }

    fn put_index(&mut self, tenant: &TenantName, key: IndexKey, ids: FlowIdSet) {
        self.index.insert((tenant.clone(), key), Some(ids));
    }

    fn delete_index(&mut self, tenant: &TenantName, key: &IndexKey) {
        self.index.insert((tenant.clone(), key.clone()), None);
    }

    fn flow_ids(&self, tenant: &TenantName) -> Result<Vec<FlowId>, StoreError> {
        let mut ids: BTreeSet<FlowId> = self
            .base
            .get(tenant)
            .map(|tables| tables.flows.keys().copied().collect())
            .unwrap_or_default();
        for ((t, id), staged) in &self.flows {
            if t == tenant {
                if staged.is_some() {
                    ids.insert(*id);
                } else {
                    ids.remove(id);
                }
            }
        }
        Ok(ids.into_iter().collect())
    }
}

/// An in-memory [`FlowStore`].
///
/// Transactions are serialized by a write lock and staged until the plan succeeds, so a reader
/// never observes part of a plan.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of data flow records held for `tenant`.
    #[must_use]
    pub fn flow_count(&self, tenant: &TenantName) -> usize {
        self.tables
            .read()
            .get(tenant)
            .map_or(0, |tables| tables.flows.len())
    }

    /// Every index bucket of `tenant`.
    #[must_use]
    pub fn index_snapshot(&self, tenant: &TenantName) -> Vec<(IndexKey, FlowIdSet)> {
        let tables = self.tables.read();
        let mut buckets: Vec<_> = tables
            .get(tenant)
            .map(|tables| {
                tables
                    .index
                    .iter()
                    .map(|(key, ids)| (key.clone(), ids.clone()))
                    .collect()
            })
            .unwrap_or_default();
        buckets.sort();
        buckets
    }
}

impl FlowStore for MemoryStore {
    fn transact<R, E, F>(&self, plan: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn FlowTxn) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut tables = self.tables.write();
        let mut txn = StagedTxn::new(&tables);
        let result = plan(&mut txn)?;
        let StagedTxn { flows, index, .. } = txn;
        trace!(
            "committing {} flow writes and {} index writes",
            flows.len(),
            index.len()
        );

        for ((tenant, id), staged) in flows {
            match staged {
                Some(flow) => {
                    tables.entry(tenant).or_default().flows.insert(id, flow);
                }
                None => {
                    if let Some(t) = tables.get_mut(&tenant) {
                        t.flows.remove(&id);
                    }
                }
            }
        }
        for ((tenant, key), staged) in index {
            match staged {
                Some(ids) => {
                    tables.entry(tenant).or_default().index.insert(key, ids);
                }
                None => {
                    if let Some(t) = tables.get_mut(&tenant) {
                        t.index.remove(&key);
                    }
                }
            }
        }
        tables.retain(|_, t| !t.is_empty());
        Ok(result)
    }

    fn read<R, E, F>(&self, query: F) -> Result<R, E>
    where
        F: FnOnce(&dyn FlowTxn) -> Result<R, E>,
        E: From<StoreError>,
    {
        let tables = self.tables.read();
        let view = StagedTxn::new(&tables);
        query(&view)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flow::{DataFlowBuilder, FlowMatch};

    fn tenant() -> TenantName {
        TenantName::new("vtn1").unwrap()
    }

    fn sample_flow(id: u64) -> Arc<DataFlow> {
        let mut builder = DataFlowBuilder::new(tenant(), FlowMatch::any(), 1, 0, 0).unwrap();
        builder.add_drop_flow(SwitchPort::new(NodeId(1), 1)).unwrap();
        builder.seal_at(FlowId::new(id).unwrap(), 0).unwrap();
        Arc::new(builder.into_data_flow().unwrap())
    }

    #[test]
    fn failed_plan_leaves_no_trace() {
        let store = MemoryStore::new();
        let result: Result<(), StoreError> = store.transact(|txn| {
            txn.put_flow(sample_flow(1));
            txn.put_index(
                &tenant(),
                IndexKey::Node(NodeId(1)),
                [FlowId::new(1).unwrap()].into(),
            );
            Err(StoreError::Aborted("test".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.flow_count(&tenant()), 0);
        assert!(store.index_snapshot(&tenant()).is_empty());
    }

    #[test]
    fn plan_sees_its_own_writes() {
        let store = MemoryStore::new();
        let id = FlowId::new(1).unwrap();
        store
            .transact(|txn| {
                txn.put_flow(sample_flow(1));
                assert!(txn.read_flow(&tenant(), id)?.is_some());
                assert_eq!(txn.flow_ids(&tenant())?, vec![id]);
                txn.delete_flow(&tenant(), id);
                assert!(txn.read_flow(&tenant(), id)?.is_none());
                assert!(txn.flow_ids(&tenant())?.is_empty());
                txn.put_flow(sample_flow(1));
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert_eq!(store.flow_count(&tenant()), 1);
        let found = store
            .read(|view| view.read_flow(&tenant(), id))
            .map_err(|e: StoreError| e)
            .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn empty_tenant_tables_are_dropped() {
        let store = MemoryStore::new();
        let id = FlowId::new(1).unwrap();
        store
            .transact(|txn| {
                txn.put_flow(sample_flow(1));
                Ok::<_, StoreError>(())
            })
            .unwrap();
        store
            .transact(|txn| {
                txn.delete_flow(&tenant(), id);
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert!(store.tables.read().is_empty());
    }
}
