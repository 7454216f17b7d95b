// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow programming facade over the switch transport.

use std::sync::Arc;
use std::time::Duration;

use flow::{FlowEntry, NodeId};
use futures::future::join_all;
use tracing::debug;

use crate::batch::RemovalBatch;
use crate::error::RpcError;
use crate::lifecycle::NodeLifecycle;
use crate::request::{AddFlowRequest, FlowStatsReply, ReadStatsRequest, RemoveFlowRequest};
use crate::service::FlowService;
use crate::tracker::{
    AddFlowRpc, BarrierRpc, ReadStatsRpc, RemoveFlowRpc, RpcHandle, RpcTracker,
};

/// Deadlines and options of [`FlowRpcs`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RpcOptions {
    pub timeout: Duration,
    pub bulk_timeout: Duration,
    /// Follow every add-flow with a barrier to the same switch.
    pub install_barrier: bool,
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3000),
            bulk_timeout: Duration::from_millis(10_000),
            install_barrier: true,
        }
    }
}

/// Handles of an add-flow RPC and of the barrier issued after it.
///
/// The add-flow result only tells that the switch accepted the request; the entry is known to be
/// applied once the barrier completes.
#[derive(Debug)]
pub struct InstallHandle {
    pub install: RpcHandle<()>,
    pub barrier: Option<RpcHandle<()>>,
}

impl InstallHandle {
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.install.node()
    }

    /// Wait for the add-flow RPC, then for its barrier.
    pub async fn applied(self) -> Result<(), RpcError> {
        self.install.await?;
        match self.barrier {
            Some(barrier) => barrier.await,
            None => Ok(()),
        }
    }
}

/// Issues tracked flow RPCs.  Every method returns immediately with handles to the outcome.
#[derive(Clone)]
pub struct FlowRpcs {
    tracker: RpcTracker,
    options: RpcOptions,
}

impl FlowRpcs {
    #[must_use]
    pub fn new(
        service: Arc<dyn FlowService>,
        lifecycle: Arc<NodeLifecycle>,
        options: RpcOptions,
    ) -> Self {
        Self {
            tracker: RpcTracker::new(service, lifecycle),
            options,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Arc<NodeLifecycle> {
        self.tracker.lifecycle()
    }

    #[must_use]
    pub fn options(&self) -> &RpcOptions {
        &self.options
    }

    /// Install `entry`, followed by a barrier if so configured.
    pub fn install(&self, entry: FlowEntry) -> InstallHandle {
        let request = AddFlowRequest::new(entry);
        let node = request.node;
        debug!("install {} on {node}", request.flow_id);
        let install = self.tracker.track(AddFlowRpc(request), self.options.timeout);
        let barrier = self
            .options
            .install_barrier
            .then(|| self.barrier(node));
        InstallHandle { install, barrier }
    }

    pub fn remove(&self, request: RemoveFlowRequest) -> RpcHandle<()> {
        debug!("{request}");
        self.tracker
            .track(RemoveFlowRpc(request), self.options.timeout)
    }

    pub fn barrier(&self, node: NodeId) -> RpcHandle<()> {
        self.tracker.track(BarrierRpc(node), self.options.timeout)
    }

    pub fn read_statistics(&self, request: ReadStatsRequest) -> RpcHandle<Vec<FlowStatsReply>> {
        self.tracker
            .track(ReadStatsRpc(request), self.options.timeout)
    }

    /// Issue one independent removal RPC per request of `batch`.
    pub fn submit_removals(&self, batch: RemovalBatch) -> Vec<RpcHandle<()>> {
        debug!("submitting {} flow removals", batch.len());
        batch
            .into_requests()
            .into_iter()
            .map(|request| {
                self.tracker
                    .track(RemoveFlowRpc(request), self.options.bulk_timeout)
            })
            .collect()
    }
}

/// Wait for every handle, returning the outcomes in order.
pub async fn settle_all<T>(handles: Vec<RpcHandle<T>>) -> Vec<Result<T, RpcError>> {
    join_all(handles).await
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{MockFlowService, Recorded};
    use flow::{DataFlowBuilder, FlowCookie, FlowId, FlowMatch, SwitchPort, TenantName};
    use tracing_test::traced_test;

    fn rpcs(service: &Arc<MockFlowService>, install_barrier: bool) -> FlowRpcs {
        let transport: Arc<dyn FlowService> = service.clone();
        FlowRpcs::new(
            transport,
            Arc::new(NodeLifecycle::new()),
            RpcOptions {
                install_barrier,
                ..RpcOptions::default()
            },
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn install_schedules_barrier() {
        let service = Arc::new(MockFlowService::new());
        let rpcs = rpcs(&service, true);
        let handle = rpcs.install(FlowEntry::table_miss(NodeId(4)));
        assert_eq!(handle.node(), NodeId(4));
        assert!(handle.barrier.is_some());
        handle.applied().await.unwrap();

        let recorded = service.recorded();
        assert_eq!(recorded.len(), 2);
        assert!(matches!(&recorded[0], Recorded::AddFlow(r) if r.node == NodeId(4)));
        assert_eq!(recorded[1], Recorded::Barrier(NodeId(4)));
    }

    #[tokio::test]
    #[traced_test]
    async fn install_without_barrier() {
        let service = Arc::new(MockFlowService::new());
        let rpcs = rpcs(&service, false);
        let handle = rpcs.install(FlowEntry::table_miss(NodeId(4)));
        assert!(handle.barrier.is_none());
        handle.applied().await.unwrap();
        assert!(service.barriers().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_install_skips_barrier_wait() {
        let service = Arc::new(MockFlowService::new());
        service.fail(NodeId(4), RpcError::Transport("bad match".to_string()));
        let rpcs = rpcs(&service, true);
        let err = rpcs
            .install(FlowEntry::table_miss(NodeId(4)))
            .applied()
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::Transport("bad match".to_string()));
    }

    #[tokio::test]
    #[traced_test]
    async fn removal_batch_barriers_per_switch() {
        let service = Arc::new(MockFlowService::new());
        let rpcs = rpcs(&service, true);
        let mut batch = RemovalBatch::new();
        for cookie in 1..=3 {
            batch.push(RemoveFlowRequest::by_cookie(
                NodeId(0xa),
                FlowCookie(cookie),
                FlowCookie::EXACT_MASK,
            ));
        }
        batch.push(RemoveFlowRequest::by_cookie(
            NodeId(0xb),
            FlowCookie(4),
            FlowCookie::EXACT_MASK,
        ));

        let outcomes = settle_all(rpcs.submit_removals(batch)).await;
        assert!(outcomes.iter().all(Result::is_ok));

        let mut removed = service.removals();
        removed.sort_by_key(|r| r.cookie);
        let barriers: Vec<_> = removed.iter().map(|r| (r.node, r.barrier)).collect();
        assert_eq!(
            barriers,
            [
                (NodeId(0xa), false),
                (NodeId(0xa), false),
                (NodeId(0xa), true),
                (NodeId(0xb), true)
            ]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn removal_of_data_flow_skips_node() {
        let service = Arc::new(MockFlowService::new());
        let rpcs = rpcs(&service, true);
        let mut builder = DataFlowBuilder::new(
            TenantName::new("vtn1").unwrap(),
            FlowMatch::any(),
            10,
            0,
            0,
        )
        .unwrap();
        builder
            .add_internal_flow(SwitchPort::new(NodeId(1), 1), SwitchPort::new(NodeId(1), 2))
            .unwrap()
            .add_internal_flow(SwitchPort::new(NodeId(2), 1), SwitchPort::new(NodeId(2), 2))
            .unwrap();
        let flow = builder.seal_at(FlowId::new(5).unwrap(), 0).unwrap();
        let mut batch = RemovalBatch::new();
        batch.push_data_flow(flow, |node| node != NodeId(1));

        settle_all(rpcs.submit_removals(batch)).await;
        let removed = service.removals();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].node, NodeId(2));
        assert!(removed[0].strict);
        assert_eq!(removed[0].cookie, flow.cookie());
    }
}
