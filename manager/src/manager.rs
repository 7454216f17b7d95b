// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Life cycle of data flows: installation, indexing, removal and expiry.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use config::FlowManagerConfig;
use flow::{
    DataFlow, DataFlowBuilder, FlowEntry, FlowId, FlowIdAllocator, FlowMatch, NodeId,
    TenantName, now_millis,
};
use flow_index::{FlowIndexer, FlowStore};
use futures::future::join_all;
use parking_lot::Mutex;
use rpc::{
    FlowRemoved, FlowRpcs, FlowService, InstallHandle, NodeLifecycle, RemovalBatch,
    RemoveFlowRequest, RpcOptions, settle_all,
};
use stats::{FlowStatsStore, MergePolicy, StatsHistory, StatsRecord};
use tracing::{debug, info, instrument, trace, warn};

use crate::errors::FlowManagerError;
use crate::selector::FlowSelector;

/// A data flow removed after its switch expired it, with its final statistics.
#[derive(Debug)]
pub struct ExpiredFlow {
    pub flow: Arc<DataFlow>,
    pub history: Option<StatsHistory>,
}

/// Installs data flows on switches, keeps them indexed and removes them again.
pub struct FlowManager<S: FlowStore> {
    config: FlowManagerConfig,
    indexer: FlowIndexer<S>,
    rpcs: FlowRpcs,
    stats: FlowStatsStore,
    /// Switches holding our table-miss flow.
    table_miss: Mutex<HashSet<NodeId>>,
    allocators: Mutex<BTreeMap<TenantName, FlowIdAllocator>>,
}

impl<S: FlowStore> FlowManager<S> {
    pub fn new(
        config: FlowManagerConfig,
        store: Arc<S>,
        service: Arc<dyn FlowService>,
    ) -> Result<Self, FlowManagerError> {
        config.validate()?;
        let options = RpcOptions {
            timeout: config.rpc_timeout(),
            bulk_timeout: config.bulk_rpc_timeout(),
            install_barrier: config.install_barrier,
        };
        let policy = MergePolicy {
            lifetime_ms: config.stats_lifetime_ms,
            min_interval_ms: config.stats_min_interval_ms,
        };
        Ok(Self {
            indexer: FlowIndexer::new(store),
            rpcs: FlowRpcs::new(service, Arc::new(NodeLifecycle::new()), options),
            stats: FlowStatsStore::new(policy),
            table_miss: Mutex::new(HashSet::new()),
            allocators: Mutex::new(BTreeMap::new()),
            config,
        })
    }

    pub fn config(&self) -> &FlowManagerConfig {
        &self.config
    }

    pub fn indexer(&self) -> &FlowIndexer<S> {
        &self.indexer
    }

    pub fn rpcs(&self) -> &FlowRpcs {
        &self.rpcs
    }

    pub fn stats(&self) -> &FlowStatsStore {
        &self.stats
    }

    pub fn lifecycle(&self) -> &Arc<NodeLifecycle> {
        self.rpcs.lifecycle()
    }

    /// Every tenant which had a data flow installed.
    pub fn tenants(&self) -> Vec<TenantName> {
        self.allocators.lock().keys().cloned().collect()
    }

    pub fn has_table_miss(&self, node: NodeId) -> bool {
        self.table_miss.lock().contains(&node)
    }

    /// Start managing `node` and make sure it holds the table-miss flow.
    #[instrument(level = "debug", skip(self))]
    pub async fn node_connected(&self, node: NodeId) -> Result<bool, FlowManagerError> {
        self.lifecycle().connected(node);
        self.ensure_table_miss(node).await
    }

    /// Install the table-miss flow on `node` unless it is known to be there.
    ///
    /// Returns `true` if the flow was installed by this call.
    pub async fn ensure_table_miss(&self, node: NodeId) -> Result<bool, FlowManagerError> {
        if !self.table_miss.lock().insert(node) {
            trace!("table-miss flow already on {node}");
            return Ok(false);
        }
        let entry = FlowEntry::table_miss_at(node, self.config.table_miss_priority);
        match self.rpcs.install(entry).applied().await {
            Ok(()) => {
                info!("installed table-miss flow on {node}");
                Ok(true)
            }
            Err(e) => {
                self.table_miss.lock().remove(&node);
                Err(e.into())
            }
        }
    }

    /// Stop managing `node`: cancel the RPCs outstanding to it and remove every data flow
    /// traversing it from the other switches.
    #[instrument(level = "debug", skip(self))]
    pub async fn node_disconnected(
        &self,
        node: NodeId,
    ) -> Result<Vec<Arc<DataFlow>>, FlowManagerError> {
        self.lifecycle().disconnected(node);
        self.table_miss.lock().remove(&node);

        let mut batch = RemovalBatch::new();
        let mut removed = Vec::new();
        for tenant in self.tenants() {
            let ids = self
                .indexer
                .index_bucket(&tenant, &flow_index::IndexKey::Node(node))?;
            removed.extend(self.take_flows(&tenant, ids, &mut batch)?);
        }
        self.submit(batch).await;
        info!("removed {} data flows through {node}", removed.len());
        Ok(removed)
    }

    fn allocate(&self, tenant: &TenantName) -> Result<FlowId, FlowManagerError> {
        let mut allocators = self.allocators.lock();
        allocators
            .entry(tenant.clone())
            .or_default()
            .allocate(|id| !matches!(self.indexer.get(tenant, id), Ok(None)))
            .ok_or_else(|| FlowManagerError::FlowIdExhausted(tenant.clone()))
    }

    /// Start building a data flow of `tenant` at the configured flow priority.
    pub fn builder(
        &self,
        tenant: TenantName,
        condition: FlowMatch,
        idle_timeout: u16,
        hard_timeout: u16,
    ) -> Result<DataFlowBuilder, FlowManagerError> {
        Ok(DataFlowBuilder::new(
            tenant,
            condition,
            self.config.flow_priority,
            idle_timeout,
            hard_timeout,
        )?)
    }

    /// Seal the data flow held by `builder` under a fresh id, install it on every switch it
    /// traverses and index it.
    ///
    /// Every entry but the ingress one is applied first, the ingress entry last.  The flow is
    /// indexed only once every entry is applied.  If any switch fails, the entries installed on
    /// the others are removed again.  If a switch of the path disconnects meanwhile, the flow is
    /// removed again as well.
    #[instrument(level = "debug", skip_all, fields(tenant = %builder.tenant()))]
    pub async fn install(
        &self,
        mut builder: DataFlowBuilder,
    ) -> Result<Arc<DataFlow>, FlowManagerError> {
        let tenant = builder.tenant().clone();
        let id = self.allocate(&tenant)?;
        let flow = Arc::new(builder.seal(id)?.clone());
        if let Some(entry) = flow
            .entries()
            .iter()
            .find(|entry| !self.lifecycle().is_connected(entry.node()))
        {
            return Err(FlowManagerError::NodeNotConnected(entry.node()));
        }

        // the rest of the path is applied before the ingress entry admits any packet to it
        let entries = flow.entries();
        let (ingress, path) = entries.split_at(entries.len().min(1));
        let mut installed = RemovalBatch::new();
        let mut failure = None;
        for stage in [path, ingress] {
            let outcomes = join_all(
                stage
                    .iter()
                    .map(|entry| self.rpcs.install(entry.clone()))
                    .map(InstallHandle::applied),
            )
            .await;
            for (entry, outcome) in stage.iter().zip(outcomes) {
                match outcome {
                    Ok(()) => installed.push(RemoveFlowRequest::for_entry(entry)),
                    Err(error) => {
                        failure.get_or_insert((entry.node(), error));
                    }
                }
            }
            if failure.is_some() {
                break;
            }
        }
        if let Some((node, error)) = failure {
            warn!("installing data flow {tenant}/{id} failed on {node}: {error}");
            self.submit(installed).await;
            return Err(FlowManagerError::Install {
                tenant,
                id,
                node,
                error,
            });
        }
        if let Err(e) = self.indexer.add_data_flow(flow.clone()) {
            self.submit(installed).await;
            return Err(e.into());
        }

        // a switch lost after its entry was applied may have been scanned before the flow was
        // indexed
        if let Some(node) = flow
            .nodes()
            .into_iter()
            .find(|node| !self.lifecycle().is_connected(*node))
        {
            warn!("{node} went away while installing data flow {tenant}/{id}");
            let mut batch = RemovalBatch::new();
            self.take_flows(&tenant, [id], &mut batch)?;
            self.submit(batch).await;
            return Err(FlowManagerError::NodeNotConnected(node));
        }
        info!("installed data flow {tenant}/{id} over {} switches", flow.entries().len());
        debug!("{flow}");
        Ok(flow)
    }

    /// Remove the data flows of `tenant` picked by `selector`, from the index and from the
    /// switches.  Returns the removed flows.
    #[instrument(level = "debug", skip(self, selector), fields(selector = %selector))]
    pub async fn remove_flows(
        &self,
        tenant: &TenantName,
        selector: &FlowSelector,
    ) -> Result<Vec<Arc<DataFlow>>, FlowManagerError> {
        let ids: Vec<FlowId> = match selector {
            FlowSelector::Id(id) => vec![*id],
            FlowSelector::All => self
                .indexer
                .all_flows(tenant)?
                .iter()
                .map(|flow| flow.id())
                .collect(),
            _ => match selector.index_key() {
                Some(key) => self.indexer.index_bucket(tenant, &key)?.into_iter().collect(),
                None => Vec::new(),
            },
        };
        let mut batch = RemovalBatch::new();
        let removed = self.take_flows(tenant, ids, &mut batch)?;
        self.submit(batch).await;
        debug!("removed {} data flows of {tenant}", removed.len());
        Ok(removed)
    }

    /// Remove every data flow and statistics history of `tenant`.
    pub async fn remove_tenant(
        &self,
        tenant: &TenantName,
    ) -> Result<Vec<Arc<DataFlow>>, FlowManagerError> {
        let mut batch = RemovalBatch::new();
        let removed = self.indexer.remove_tenant(tenant)?;
        for flow in &removed {
            batch.push_data_flow(flow, |node| self.lifecycle().is_connected(node));
        }
        self.submit(batch).await;
        self.stats.remove_tenant(tenant);
        self.allocators.lock().remove(tenant);
        info!("removed tenant {tenant} with {} data flows", removed.len());
        Ok(removed)
    }

    /// Handle a switch report that it removed a flow entry on its own.
    ///
    /// Expiry of the ingress entry of a data flow removes the whole flow; its final counters are
    /// merged into its statistics history, which is handed back.  The removal of the table-miss
    /// flow is repaired.  Every other report is ignored.
    #[instrument(level = "debug", skip_all, fields(node = %removed.node, cookie = %removed.cookie))]
    pub async fn flow_removed(
        &self,
        removed: &FlowRemoved,
    ) -> Result<Option<ExpiredFlow>, FlowManagerError> {
        if removed.cookie.is_table_miss() {
            warn!("table-miss flow removed from {}: {}", removed.node, removed.reason);
            self.table_miss.lock().remove(&removed.node);
            if self.lifecycle().is_connected(removed.node) {
                self.ensure_table_miss(removed.node).await?;
            }
            return Ok(None);
        }
        let Some(id) = removed.cookie.decode() else {
            trace!("ignoring removal of foreign flow");
            return Ok(None);
        };

        for tenant in self.tenants() {
            let Some(flow) = self.indexer.get(&tenant, id)? else {
                continue;
            };
            let ingress = flow.ingress();
            if ingress.node() != removed.node || *ingress.fmatch() != removed.fmatch {
                continue;
            }
            let Some(flow) = self.indexer.take_data_flow(&tenant, id)? else {
                continue;
            };
            let record =
                StatsRecord::new(now_millis(), removed.packets, removed.bytes, removed.duration);
            self.stats.add_non_periodic(&tenant, id, record)?;
            let history = self.stats.remove(&tenant, id);

            let mut batch = RemovalBatch::new();
            batch.push_data_flow(&flow, |node| {
                node != removed.node && self.lifecycle().is_connected(node)
            });
            self.submit(batch).await;
            info!("data flow {tenant}/{id} removed by {}: {}", removed.node, removed.reason);
            return Ok(Some(ExpiredFlow { flow, history }));
        }
        debug!("no data flow for removed entry");
        Ok(None)
    }

    /// Take the flows `ids` of `tenant` out of the index, one transaction each, adding the
    /// removal of their entries from connected switches to `batch`.
    fn take_flows(
        &self,
        tenant: &TenantName,
        ids: impl IntoIterator<Item = FlowId>,
        batch: &mut RemovalBatch,
    ) -> Result<Vec<Arc<DataFlow>>, FlowManagerError> {
        let mut removed = Vec::new();
        for id in ids {
            if let Some(flow) = self.indexer.take_data_flow(tenant, id)? {
                self.stats.remove(tenant, id);
                batch.push_data_flow(&flow, |node| self.lifecycle().is_connected(node));
                removed.push(flow);
            }
        }
        Ok(removed)
    }

    /// Submit `batch` and wait for it to settle.  Returns the number of failed removals.
    async fn submit(&self, batch: RemovalBatch) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let outcomes = settle_all(self.rpcs.submit_removals(batch)).await;
        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        if failed > 0 {
            warn!("{failed} of {} flow removals failed", outcomes.len());
        }
        failed
    }
}
