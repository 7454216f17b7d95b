// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Statistics histories of every data flow.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use flow::{FlowId, TenantName};
use tracing::debug;

use crate::history::{MergePolicy, Merged, PeriodicMerge, StatsError, StatsHistory, StatsRecord};

type FlowKey = (TenantName, FlowId);

/// Per data flow statistics histories.
///
/// Every merge holds the map entry of its flow exclusively, so merges into the history of one
/// flow are serialized while merges into different flows proceed in parallel.
#[derive(Debug, Default)]
pub struct FlowStatsStore {
    histories: DashMap<FlowKey, StatsHistory>,
    policy: MergePolicy,
}

impl FlowStatsStore {
    #[must_use]
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            histories: DashMap::new(),
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn add_periodic(
        &self,
        tenant: &TenantName,
        id: FlowId,
        now: u64,
        sample: StatsRecord,
    ) -> PeriodicMerge {
        self.histories
            .entry((tenant.clone(), id))
            .or_insert_with(|| StatsHistory::with_policy(self.policy))
            .add_periodic(now, sample)
    }

    /// Merge a non-periodic record.  Returns whether the history changed.
    pub fn add_non_periodic(
        &self,
        tenant: &TenantName,
        id: FlowId,
        record: StatsRecord,
    ) -> Result<bool, StatsError> {
        match self.histories.entry((tenant.clone(), id)) {
            Entry::Occupied(mut history) => Ok(history.get_mut().add_non_periodic(record)?.is_changed()),
            Entry::Vacant(vacant) => {
                let mut history = StatsHistory::with_policy(self.policy);
                let merged = history.add_non_periodic(record)?;
                vacant.insert(history);
                Ok(merged == Merged::Inserted)
            }
        }
    }

    /// A copy of the history of a flow.
    #[must_use]
    pub fn get(&self, tenant: &TenantName, id: FlowId) -> Option<StatsHistory> {
        self.histories
            .get(&(tenant.clone(), id))
            .map(|history| history.clone())
    }

    pub fn remove(&self, tenant: &TenantName, id: FlowId) -> Option<StatsHistory> {
        self.histories
            .remove(&(tenant.clone(), id))
            .map(|(_, history)| history)
    }

    pub fn remove_tenant(&self, tenant: &TenantName) {
        let before = self.histories.len();
        self.histories.retain(|(t, _), _| t != tenant);
        debug!(
            "dropped {} statistics histories of {tenant}",
            before.saturating_sub(self.histories.len())
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn tenant(name: &str) -> TenantName {
        TenantName::new(name).unwrap()
    }

    fn id(n: u64) -> FlowId {
        FlowId::new(n).unwrap()
    }

    #[test]
    #[traced_test]
    fn histories_are_per_flow() {
        let store = FlowStatsStore::default();
        let sample = StatsRecord::new(0, 1, 1, Duration::from_secs(1));
        store.add_periodic(&tenant("vtn1"), id(1), 1_000, sample);
        store.add_periodic(&tenant("vtn1"), id(2), 1_000, sample);
        store.add_periodic(&tenant("vtn2"), id(1), 1_000, sample);
        assert_eq!(store.len(), 3);

        store.remove_tenant(&tenant("vtn1"));
        assert_eq!(store.len(), 1);
        assert!(logs_contain("dropped 2 statistics histories of vtn1"));
        assert!(store.get(&tenant("vtn2"), id(1)).is_some());
        assert!(store.remove(&tenant("vtn2"), id(1)).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn non_periodic_reports_changes() {
        let store = FlowStatsStore::default();
        let t = tenant("vtn1");
        let first = StatsRecord::new(1_000, 1, 1, Duration::from_secs(1));
        assert_eq!(store.add_non_periodic(&t, id(1), first), Ok(true));
        assert_eq!(store.add_non_periodic(&t, id(1), first), Ok(false));
        let close = StatsRecord::new(1_500, 2, 2, Duration::from_secs(1));
        assert_eq!(store.add_non_periodic(&t, id(1), close), Ok(true));
        assert_eq!(store.get(&t, id(1)).unwrap().len(), 1);
    }

    #[test]
    fn parallel_merges_into_distinct_flows() {
        let store = Arc::new(FlowStatsStore::default());
        let workers: Vec<_> = (1..=4)
            .map(|n| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for step in 0..50u64 {
                        let sample = StatsRecord::new(0, step, step, Duration::from_secs(step));
                        store.add_periodic(&tenant("vtn1"), id(n), step * 1_000, sample);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        for n in 1..=4 {
            assert_eq!(store.get(&tenant("vtn1"), id(n)).unwrap().len(), 50);
        }
    }
}
