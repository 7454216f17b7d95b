// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bounded, time-ordered history of the counters of one data flow.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::trace;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    #[error("Periodic sample passed as a non-periodic record at {0}")]
    PeriodicRecord(u64),
}

/// Counters of a data flow at a point in time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatsRecord {
    /// Sample time, in milliseconds since the UNIX epoch.
    pub time: u64,
    pub packets: u64,
    pub bytes: u64,
    /// How long the flow had been installed when the counters were read.
    pub duration: Duration,
    /// Whether the record comes from the periodic poll.
    pub periodic: bool,
}

impl StatsRecord {
    #[must_use]
    pub fn new(time: u64, packets: u64, bytes: u64, duration: Duration) -> Self {
        Self {
            time,
            packets,
            bytes,
            duration,
            periodic: false,
        }
    }
}

/// Constants governing how records are merged into a history.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MergePolicy {
    /// Records older than this, relative to the latest periodic sample, are dropped.
    pub lifetime_ms: u64,
    /// Non-periodic records closer than this to the latest record are coalesced.
    pub min_interval_ms: u64,
}

impl MergePolicy {
    pub const LIFETIME_MS: u64 = 60_000;
    pub const MIN_INTERVAL_MS: u64 = 1_000;
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            lifetime_ms: Self::LIFETIME_MS,
            min_interval_ms: Self::MIN_INTERVAL_MS,
        }
    }
}

/// How [`StatsHistory::add_periodic`] merged a live sample.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PeriodicMerge {
    /// The sample was added as the latest record.
    Inserted,
    /// The latest record was an earlier exact reading; it was re-tagged as periodic and the
    /// sample dropped.
    Promoted,
}

/// How [`StatsHistory::add_non_periodic`] merged a record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Merged {
    /// Nothing changed; the history need not be written back.
    Unchanged,
    /// The record replaced the latest non-periodic record.
    Replaced,
    /// The record was added as the latest record.
    Inserted,
}

impl Merged {
    #[must_use]
    pub fn is_changed(self) -> bool {
        self != Merged::Unchanged
    }
}

/// Average traffic rates over a window of the history.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StatsAverage {
    pub packets_per_sec: f64,
    pub bytes_per_sec: f64,
    /// Time covered by the average, in milliseconds.
    pub interval_ms: u64,
}

/// Statistics records of one data flow, keyed by sample time.
///
/// A history has a single writer at a time; see [`crate::FlowStatsStore`] for the way merges are
/// serialized per flow.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsHistory {
    records: BTreeMap<u64, StatsRecord>,
    policy: MergePolicy,
}

impl StatsHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_policy(policy: MergePolicy) -> Self {
        Self {
            records: BTreeMap::new(),
            policy,
        }
    }

    #[must_use]
    pub fn latest(&self) -> Option<&StatsRecord> {
        self.records.last_key_value().map(|(_, record)| record)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in time order.
    pub fn iter(&self) -> impl Iterator<Item = &StatsRecord> {
        self.records.values()
    }

    /// Merge a sample read by the periodic poll at `now`.
    pub fn add_periodic(&mut self, now: u64, sample: StatsRecord) -> PeriodicMerge {
        let horizon = now.saturating_sub(self.policy.lifetime_ms);
        let before = self.records.len();
        self.records = self.records.split_off(&horizon);
        if before != self.records.len() {
            trace!("purged {} records older than {horizon}", before - self.records.len());
        }

        if let Some(mut latest) = self.records.last_entry() {
            let latest = latest.get_mut();
            if !latest.periodic && latest.duration < sample.duration {
                latest.periodic = true;
                return PeriodicMerge::Promoted;
            }
        }
        self.records.insert(
            now,
            StatsRecord {
                time: now,
                periodic: true,
                ..sample
            },
        );
        PeriodicMerge::Inserted
    }

    /// Merge a record obtained outside the periodic poll, such as the final counters of a
    /// removed flow.
    pub fn add_non_periodic(&mut self, record: StatsRecord) -> Result<Merged, StatsError> {
        if record.periodic {
            return Err(StatsError::PeriodicRecord(record.time));
        }
        let Some(&latest) = self.latest() else {
            self.records.insert(record.time, record);
            return Ok(Merged::Inserted);
        };
        if latest.time >= record.time {
            trace!("stale record at {} dropped", record.time);
            return Ok(Merged::Unchanged);
        }
        if record.time - latest.time < self.policy.min_interval_ms {
            if latest.periodic {
                return Ok(Merged::Unchanged);
            }
            self.records.remove(&latest.time);
            self.records.insert(record.time, record);
            return Ok(Merged::Replaced);
        }
        self.records.insert(record.time, record);
        Ok(Merged::Inserted)
    }

    /// Average rates between the latest record and the oldest record within `window_ms` of it.
    ///
    /// Returns `None` if there are not two such records, if they were taken at the same time or
    /// if the counters went backwards.
    #[must_use]
    pub fn average(&self, window_ms: u64) -> Option<StatsAverage> {
        let (&last_time, last) = self.records.last_key_value()?;
        let (&first_time, first) = self
            .records
            .range(last_time.saturating_sub(window_ms)..)
            .next()?;
        let interval_ms = last_time - first_time;
        if interval_ms == 0 {
            return None;
        }
        let packets = last.packets.checked_sub(first.packets)?;
        let bytes = last.bytes.checked_sub(first.bytes)?;
        #[allow(clippy::cast_precision_loss)]
        let (packets, bytes, secs) = (packets as f64, bytes as f64, interval_ms as f64 / 1000.0);
        Some(StatsAverage {
            packets_per_sec: packets / secs,
            bytes_per_sec: bytes / secs,
            interval_ms,
        })
    }
}
