// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracking of individual switch RPCs.
//!
//! Each RPC is driven by its own task, which settles the call exactly once with the first of:
//! the transport result, a disconnect notification for the target switch, or the deadline.
//! Whatever comes later is ignored.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use flow::NodeId;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use crate::error::RpcError;
use crate::lifecycle::NodeLifecycle;
use crate::request::{AddFlowRequest, FlowStatsReply, ReadStatsRequest, RemoveFlowRequest};
use crate::service::FlowService;

/// A kind of switch RPC.
pub trait RpcKind: Send + 'static {
    type Output: Send + 'static;

    /// Short name, for diagnostics only.
    const NAME: &'static str;

    /// The switch the RPC is addressed to.
    fn node(&self) -> NodeId;

    /// Tell if a failure deserves an error log.  Failures caused by the switch going away are
    /// expected and only logged at debug level.
    fn needs_error_log(error: &RpcError) -> bool {
        !error.is_disconnect()
    }

    /// Issue the call.
    fn invoke(self, service: Arc<dyn FlowService>) -> BoxFuture<'static, Result<Self::Output, RpcError>>;
}

pub struct AddFlowRpc(pub AddFlowRequest);

impl RpcKind for AddFlowRpc {
    type Output = ();
    const NAME: &'static str = "add-flow";

    fn node(&self) -> NodeId {
        self.0.node
    }

    fn invoke(self, service: Arc<dyn FlowService>) -> BoxFuture<'static, Result<(), RpcError>> {
        Box::pin(async move { service.add_flow(self.0).await })
    }
}

pub struct RemoveFlowRpc(pub RemoveFlowRequest);

impl RpcKind for RemoveFlowRpc {
    type Output = ();
    const NAME: &'static str = "remove-flow";

    fn node(&self) -> NodeId {
        self.0.node
    }

    fn invoke(self, service: Arc<dyn FlowService>) -> BoxFuture<'static, Result<(), RpcError>> {
        Box::pin(async move { service.remove_flow(self.0).await })
    }
}

pub struct BarrierRpc(pub NodeId);

impl RpcKind for BarrierRpc {
    type Output = ();
    const NAME: &'static str = "barrier";

    fn node(&self) -> NodeId {
        self.0
    }

    fn invoke(self, service: Arc<dyn FlowService>) -> BoxFuture<'static, Result<(), RpcError>> {
        Box::pin(async move { service.barrier(self.0).await })
    }
}

pub struct ReadStatsRpc(pub ReadStatsRequest);

impl RpcKind for ReadStatsRpc {
    type Output = Vec<FlowStatsReply>;
    const NAME: &'static str = "read-flow-stats";

    fn node(&self) -> NodeId {
        self.0.node
    }

    // a timed out poll is superseded by the next one
    fn needs_error_log(error: &RpcError) -> bool {
        !error.is_disconnect() && *error != RpcError::Timeout
    }

    fn invoke(
        self,
        service: Arc<dyn FlowService>,
    ) -> BoxFuture<'static, Result<Vec<FlowStatsReply>, RpcError>> {
        Box::pin(async move { service.read_statistics(self.0).await })
    }
}

/// The settling end of an RPC: delivers the outcome once, and ignores every later attempt.
pub struct Settler<T> {
    name: &'static str,
    node: NodeId,
    tx: Mutex<Option<oneshot::Sender<Result<T, RpcError>>>>,
}

impl<T> Settler<T> {
    /// Build a settler and the handle through which its outcome is received.
    #[must_use]
    pub fn new(name: &'static str, node: NodeId) -> (Self, RpcHandle<T>) {
        let (tx, rx) = oneshot::channel();
        let settler = Self {
            name,
            node,
            tx: Mutex::new(Some(tx)),
        };
        (settler, RpcHandle { name, node, rx })
    }

    /// Deliver `result`.  Returns `false` if the RPC had already been settled.
    pub fn settle(&self, result: Result<T, RpcError>) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            trace!("{} to {}: late outcome ignored", self.name, self.node);
            return false;
        };
        if tx.send(result).is_err() {
            trace!("{} to {}: nobody waits for the outcome", self.name, self.node);
        }
        true
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.tx.lock().is_none()
    }
}

/// The receiving end of an RPC.  Resolves once the RPC is settled.
#[derive(Debug)]
pub struct RpcHandle<T> {
    name: &'static str,
    node: NodeId,
    rx: oneshot::Receiver<Result<T, RpcError>>,
}

impl<T> RpcHandle<T> {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl<T> Future for RpcHandle<T> {
    type Output = Result<T, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(RpcError::Abandoned)))
    }
}

fn log_outcome<K: RpcKind>(node: NodeId, result: &Result<K::Output, RpcError>) {
    match result {
        Ok(_) => trace!("{} to {node}: done", K::NAME),
        Err(e) if K::needs_error_log(e) => error!("{} to {node} failed: {e}", K::NAME),
        Err(e) => debug!("{} to {node} failed: {e}", K::NAME),
    }
}

/// Issues RPCs and settles each of them exactly once.
#[derive(Clone)]
pub struct RpcTracker {
    service: Arc<dyn FlowService>,
    lifecycle: Arc<NodeLifecycle>,
}

impl RpcTracker {
    #[must_use]
    pub fn new(service: Arc<dyn FlowService>, lifecycle: Arc<NodeLifecycle>) -> Self {
        Self { service, lifecycle }
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Arc<NodeLifecycle> {
        &self.lifecycle
    }

    /// Issue `rpc`, settling it as canceled if its switch disconnects and as timed out if it
    /// does not complete within `timeout`.
    ///
    /// Must be called from within a tokio runtime.  The call does not block: the returned
    /// handle resolves when the RPC is settled.
    pub fn track<K: RpcKind>(&self, rpc: K, timeout: Duration) -> RpcHandle<K::Output> {
        let node = rpc.node();
        let canceled = self.lifecycle.subscribe(node);
        let (settler, handle) = Settler::new(K::NAME, node);
        let call = rpc.invoke(self.service.clone());
        trace!("{} to {node}: issued", K::NAME);

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = canceled.cancelled() => Err(RpcError::Canceled(node)),
                outcome = tokio::time::timeout(timeout, call) => {
                    outcome.unwrap_or(Err(RpcError::Timeout))
                }
            };
            log_outcome::<K>(node, &result);
            settler.settle(result);
        });
        handle
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::MockFlowService;
    use tracing_test::traced_test;

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn tracker(service: &Arc<MockFlowService>) -> RpcTracker {
        let service: Arc<dyn FlowService> = service.clone();
        RpcTracker::new(service, Arc::new(NodeLifecycle::new()))
    }

    #[tokio::test]
    #[traced_test]
    async fn completes_with_transport_result() {
        let service = Arc::new(MockFlowService::new());
        let tracker = tracker(&service);
        let handle = tracker.track(BarrierRpc(NodeId(1)), TIMEOUT);
        assert_eq!(handle.name(), "barrier");
        assert_eq!(handle.await, Ok(()));
        assert_eq!(service.barriers(), [NodeId(1)]);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn disconnect_cancels_hung_call() {
        let service = Arc::new(MockFlowService::new());
        service.hang(NodeId(1));
        let tracker = tracker(&service);
        tracker.lifecycle().connected(NodeId(1));
        let handles: Vec<_> = (0..3)
            .map(|_| tracker.track(BarrierRpc(NodeId(1)), TIMEOUT))
            .collect();
        let unrelated = tracker.track(BarrierRpc(NodeId(2)), TIMEOUT);
        tokio::task::yield_now().await;

        tracker.lifecycle().disconnected(NodeId(1));
        for handle in handles {
            assert_eq!(handle.await, Err(RpcError::Canceled(NodeId(1))));
        }
        assert_eq!(unrelated.await, Ok(()));
        assert!(logs_contain("barrier to openflow:1 failed"));
        assert!(!logs_contain("ERROR"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn deadline_settles_as_timeout() {
        let service = Arc::new(MockFlowService::new());
        service.hang(NodeId(1));
        let tracker = tracker(&service);
        let handle = tracker.track(BarrierRpc(NodeId(1)), TIMEOUT);
        assert_eq!(handle.await, Err(RpcError::Timeout));
        assert!(logs_contain("ERROR"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn stats_timeout_is_not_an_error_log() {
        let service = Arc::new(MockFlowService::new());
        service.hang(NodeId(1));
        let tracker = tracker(&service);
        let handle = tracker.track(ReadStatsRpc(ReadStatsRequest::vtn_flows(NodeId(1))), TIMEOUT);
        assert_eq!(handle.await, Err(RpcError::Timeout));
        assert!(!logs_contain("ERROR"));
    }

    #[tokio::test]
    #[traced_test]
    async fn disconnect_failures_are_quiet() {
        let service = Arc::new(MockFlowService::new());
        service.fail(
            NodeId(1),
            RpcError::Transport("Connection was closed".to_string()),
        );
        service.fail(NodeId(2), RpcError::Transport("bad request".to_string()));
        let tracker = tracker(&service);

        let quiet = tracker.track(BarrierRpc(NodeId(1)), TIMEOUT).await;
        assert!(quiet.unwrap_err().is_disconnect());
        assert!(!logs_contain("ERROR"));

        let loud = tracker.track(BarrierRpc(NodeId(2)), TIMEOUT).await;
        assert!(!loud.unwrap_err().is_disconnect());
        assert!(logs_contain("ERROR"));
    }

    #[tokio::test]
    async fn late_disconnect_is_a_noop() {
        let service = Arc::new(MockFlowService::new());
        let tracker = tracker(&service);
        let handle = tracker.track(BarrierRpc(NodeId(1)), TIMEOUT);
        assert_eq!(handle.await, Ok(()));
        tracker.lifecycle().disconnected(NodeId(1));
        tracker.lifecycle().disconnected(NodeId(1));
    }

    #[test]
    fn settles_once() {
        let (settler, mut handle) = Settler::<u32>::new("test", NodeId(1));
        assert!(!settler.is_settled());
        assert!(settler.settle(Ok(1)));
        assert!(!settler.settle(Err(RpcError::Canceled(NodeId(1)))));
        assert!(settler.is_settled());
        assert_eq!(handle.rx.try_recv().unwrap(), Ok(1));
    }

    #[tokio::test]
    async fn dropped_settler_abandons_handle() {
        let (settler, handle) = Settler::<()>::new("test", NodeId(1));
        drop(settler);
        assert_eq!(handle.await, Err(RpcError::Abandoned));
    }
}
