// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Periodic collection of data flow statistics.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use flow::{DataFlow, FlowId, NodeId, TenantName, now_millis};
use flow_index::FlowStore;
use futures::future::join_all;
use rpc::{FlowStatsReply, ReadStatsRequest};
use stats::StatsRecord;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::errors::FlowManagerError;
use crate::manager::FlowManager;

/// Reads the counters of the ingress entries of data flows and merges them into their histories.
pub struct StatsReader<S: FlowStore> {
    manager: Arc<FlowManager<S>>,
}

impl<S: FlowStore + 'static> StatsReader<S> {
    #[must_use]
    pub fn new(manager: Arc<FlowManager<S>>) -> Self {
        Self { manager }
    }

    /// Poll the switches holding an ingress entry of a data flow of `tenant`.
    ///
    /// Returns the number of samples merged.
    #[instrument(level = "debug", skip(self))]
    pub async fn poll(&self, tenant: &TenantName) -> Result<usize, FlowManagerError> {
        let mut by_node: BTreeMap<NodeId, HashMap<FlowId, Arc<DataFlow>>> = BTreeMap::new();
        for flow in self.manager.indexer().all_flows(tenant)? {
            by_node
                .entry(flow.ingress().node())
                .or_default()
                .insert(flow.id(), flow);
        }
        let lifecycle = self.manager.lifecycle();
        by_node.retain(|node, _| lifecycle.is_connected(*node));
        if by_node.is_empty() {
            return Ok(0);
        }

        let rpcs = self.manager.rpcs();
        let replies = join_all(
            by_node
                .keys()
                .map(|node| rpcs.read_statistics(ReadStatsRequest::vtn_flows(*node))),
        )
        .await;

        let now = now_millis();
        let mut merged = 0;
        for ((node, flows), outcome) in by_node.iter().zip(replies) {
            let Ok(replies) = outcome else {
                // already logged by the tracker; the next poll supersedes this one
                continue;
            };
            for reply in &replies {
                if let Some(id) = match_reply(*node, flows, reply) {
                    let sample = StatsRecord::new(now, reply.packets, reply.bytes, reply.duration);
                    self.manager.stats().add_periodic(tenant, id, now, sample);
                    merged += 1;
                }
            }
        }
        debug!("merged {merged} samples for {tenant}");
        Ok(merged)
    }

    /// Poll every tenant.  A failing tenant does not prevent polling the others.
    pub async fn poll_all(&self) -> usize {
        let mut merged = 0;
        for tenant in self.manager.tenants() {
            match self.poll(&tenant).await {
                Ok(count) => merged += count,
                Err(e) => warn!("failed to poll statistics of {tenant}: {e}"),
            }
        }
        merged
    }

    /// Poll every tenant at the configured interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.manager.config().stats_interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("polling flow statistics every {period:?}");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_all().await;
                }
            }
        }
        info!("stopped polling flow statistics");
    }
}

/// The data flow whose ingress entry `reply` describes, if any.
fn match_reply(
    node: NodeId,
    flows: &HashMap<FlowId, Arc<DataFlow>>,
    reply: &FlowStatsReply,
) -> Option<FlowId> {
    let id = reply.cookie.decode()?;
    let flow = flows.get(&id)?;
    let ingress = flow.ingress();
    if ingress.node() != node || ingress.fmatch() != &reply.fmatch {
        trace!("reply for {} does not match the ingress of {id}", reply.cookie);
        return None;
    }
    Some(id)
}
