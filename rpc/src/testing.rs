// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A scripted in-memory [`FlowService`] for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flow::NodeId;
use parking_lot::Mutex;

use crate::error::RpcError;
use crate::request::{AddFlowRequest, FlowStatsReply, ReadStatsRequest, RemoveFlowRequest};
use crate::service::FlowService;

/// A call received by [`MockFlowService`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recorded {
    AddFlow(AddFlowRequest),
    RemoveFlow(RemoveFlowRequest),
    Barrier(NodeId),
    ReadStats(ReadStatsRequest),
}

/// The kinds of calls a failure can be scripted for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    AddFlow,
    RemoveFlow,
    Barrier,
    ReadStats,
}

impl Recorded {
    fn call(&self) -> Call {
        match self {
            Recorded::AddFlow(_) => Call::AddFlow,
            Recorded::RemoveFlow(_) => Call::RemoveFlow,
            Recorded::Barrier(_) => Call::Barrier,
            Recorded::ReadStats(_) => Call::ReadStats,
        }
    }
}

#[derive(Default)]
struct Script {
    recorded: Vec<Recorded>,
    hung: Vec<NodeId>,
    failures: HashMap<(NodeId, Option<Call>), RpcError>,
    stats: HashMap<NodeId, Vec<FlowStatsReply>>,
    hooks: HashMap<(NodeId, Call), Arc<dyn Fn() + Send + Sync>>,
}

/// Records every call and answers it as scripted: successfully by default, with an error for
/// nodes set to fail, or never for nodes set to hang.
#[derive(Default)]
pub struct MockFlowService {
    script: Mutex<Script>,
}

impl MockFlowService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Never answer calls to `node`.
    pub fn hang(&self, node: NodeId) {
        self.script.lock().hung.push(node);
    }

    /// Fail every call to `node` with `error`.
    pub fn fail(&self, node: NodeId, error: RpcError) {
        self.script.lock().failures.insert((node, None), error);
    }

    /// Fail calls of kind `call` to `node` with `error`.
    pub fn fail_call(&self, node: NodeId, call: Call, error: RpcError) {
        self.script.lock().failures.insert((node, Some(call)), error);
    }

    /// Answer calls to `node` normally again.
    pub fn heal(&self, node: NodeId) {
        let mut script = self.script.lock();
        script.hung.retain(|n| *n != node);
        script.failures.retain(|(n, _), _| *n != node);
    }

    /// Run `hook` whenever a call of kind `call` to `node` is received, before answering it.
    pub fn before(&self, node: NodeId, call: Call, hook: impl Fn() + Send + Sync + 'static) {
        self.script.lock().hooks.insert((node, call), Arc::new(hook));
    }

    /// Set the statistics replied by `node`.
    pub fn set_stats(&self, node: NodeId, replies: Vec<FlowStatsReply>) {
        self.script.lock().stats.insert(node, replies);
    }

    #[must_use]
    pub fn recorded(&self) -> Vec<Recorded> {
        self.script.lock().recorded.clone()
    }

    pub fn clear(&self) {
        self.script.lock().recorded.clear();
    }

    #[must_use]
    pub fn installs(&self) -> Vec<AddFlowRequest> {
        self.recorded()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::AddFlow(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn removals(&self) -> Vec<RemoveFlowRequest> {
        self.recorded()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::RemoveFlow(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn barriers(&self) -> Vec<NodeId> {
        self.recorded()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Barrier(node) => Some(node),
                _ => None,
            })
            .collect()
    }

    async fn answer(&self, node: NodeId, call: Recorded) -> Result<(), RpcError> {
        let (hung, failure, hook) = {
            let mut script = self.script.lock();
            let kind = call.call();
            script.recorded.push(call);
            let failure = script
                .failures
                .get(&(node, Some(kind)))
                .or_else(|| script.failures.get(&(node, None)))
                .cloned();
            let hook = script.hooks.get(&(node, kind)).cloned();
            (script.hung.contains(&node), failure, hook)
        };
        if let Some(hook) = hook {
            hook();
        }
        if hung {
            futures::future::pending::<()>().await;
        }
        failure.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl FlowService for MockFlowService {
    async fn add_flow(&self, request: AddFlowRequest) -> Result<(), RpcError> {
        self.answer(request.node, Recorded::AddFlow(request)).await
    }

    async fn remove_flow(&self, request: RemoveFlowRequest) -> Result<(), RpcError> {
        self.answer(request.node, Recorded::RemoveFlow(request)).await
    }

    async fn barrier(&self, node: NodeId) -> Result<(), RpcError> {
        self.answer(node, Recorded::Barrier(node)).await
    }

    async fn read_statistics(
        &self,
        request: ReadStatsRequest,
    ) -> Result<Vec<FlowStatsReply>, RpcError> {
        let node = request.node;
        self.answer(node, Recorded::ReadStats(request)).await?;
        Ok(self
            .script
            .lock()
            .stats
            .get(&node)
            .cloned()
            .unwrap_or_default())
    }
}
