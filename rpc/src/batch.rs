// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Batches of flow removal requests.

use std::collections::HashMap;

use flow::{DataFlow, NodeId};

use crate::request::RemoveFlowRequest;

/// An ordered batch of removal requests.
///
/// For every switch addressed by the batch, only the last request to that switch carries the
/// barrier flag.  The switch thus completes all removals of the batch before acknowledging the
/// last one, while switches do not wait on each other.
#[derive(Clone, Debug, Default)]
pub struct RemovalBatch {
    requests: Vec<RemoveFlowRequest>,
    last: HashMap<NodeId, usize>,
}

impl RemovalBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `request`, moving the barrier of its switch onto it.
    pub fn push(&mut self, mut request: RemoveFlowRequest) {
        let index = self.requests.len();
        if let Some(previous) = self.last.insert(request.node, index) {
            self.requests[previous].barrier = false;
        }
        request.barrier = true;
        self.requests.push(request);
    }

    /// Append a strict removal of every entry of `flow` installed on a switch accepted by `keep`.
    pub fn push_data_flow(&mut self, flow: &DataFlow, mut keep: impl FnMut(NodeId) -> bool) {
        for entry in flow.entries() {
            if keep(entry.node()) {
                self.push(RemoveFlowRequest::for_entry(entry));
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoveFlowRequest> {
        self.requests.iter()
    }

    /// Every switch addressed by the batch.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.last.keys().copied()
    }

    #[must_use]
    pub fn into_requests(self) -> Vec<RemoveFlowRequest> {
        self.requests
    }
}

impl Extend<RemoveFlowRequest> for RemovalBatch {
    fn extend<I: IntoIterator<Item = RemoveFlowRequest>>(&mut self, iter: I) {
        for request in iter {
            self.push(request);
        }
    }
}

impl FromIterator<RemoveFlowRequest> for RemovalBatch {
    fn from_iter<I: IntoIterator<Item = RemoveFlowRequest>>(iter: I) -> Self {
        let mut batch = RemovalBatch::new();
        batch.extend(iter);
        batch
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flow::FlowCookie;

    fn remove(node: u64, cookie: u64) -> RemoveFlowRequest {
        RemoveFlowRequest::by_cookie(NodeId(node), FlowCookie(cookie), FlowCookie::EXACT_MASK)
    }

    #[test]
    fn barrier_on_last_request_per_node() {
        let batch: RemovalBatch = [remove(1, 1), remove(1, 2), remove(2, 3), remove(1, 4)]
            .into_iter()
            .collect();
        let barriers: Vec<_> = batch.iter().map(|r| (r.node.dpid(), r.barrier)).collect();
        assert_eq!(barriers, [(1, false), (1, false), (2, true), (1, true)]);
        assert_eq!(batch.len(), 4);
    }

    #[test]
    fn incoming_barrier_flags_are_overridden() {
        let mut early = remove(1, 1);
        early.barrier = true;
        let batch: RemovalBatch = [early, remove(1, 2)].into_iter().collect();
        let barriers: Vec<_> = batch.iter().map(|r| r.barrier).collect();
        assert_eq!(barriers, [false, true]);
    }

    #[test]
    fn barrier_placement_contract() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|nodes: Vec<u8>| {
                let nodes: Vec<u64> = nodes.into_iter().map(|n| u64::from(n % 8)).collect();
                let batch: RemovalBatch = nodes
                    .iter()
                    .enumerate()
                    .map(|(n, node)| remove(*node, n as u64))
                    .collect();
                let requests = batch.into_requests();
                assert_eq!(requests.len(), nodes.len());
                for (n, request) in requests.iter().enumerate() {
                    let last_for_node = !nodes[n + 1..].contains(&request.node.dpid());
                    assert_eq!(request.barrier, last_for_node);
                    // insertion order is kept
                    assert_eq!(request.cookie, FlowCookie(n as u64));
                }
            });
    }
}
