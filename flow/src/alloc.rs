// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow id allocation.

use crate::cookie::FlowId;

/// Hands out [`FlowId`]s for one tenant.
///
/// Ids increase monotonically and wrap back to [`FlowId::MIN`] once [`FlowId::MAX`] was handed
/// out.  Ids still in use are skipped.
#[derive(Debug)]
pub struct FlowIdAllocator {
    next: u64,
}

impl Default for FlowIdAllocator {
    fn default() -> Self {
        Self {
            next: FlowId::MIN.get(),
        }
    }
}

impl FlowIdAllocator {
    /// Start allocating at `first`.
    #[cfg(test)]
    #[must_use]
    pub fn starting_at(first: FlowId) -> Self {
        Self { next: first.get() }
    }

    /// Allocate the next id for which `in_use` returns false.
    ///
    /// Returns `None` if every id is in use.
    pub fn allocate(&mut self, mut in_use: impl FnMut(FlowId) -> bool) -> Option<FlowId> {
        let span = FlowId::MAX.get() - FlowId::MIN.get() + 1;
        let mut tried = 0u64;
        while tried < span {
            let candidate = FlowId::new(self.next).ok()?;
            self.next = if candidate == FlowId::MAX {
                FlowId::MIN.get()
            } else {
                self.next + 1
            };
            if !in_use(candidate) {
                return Some(candidate);
            }
            tried += 1;
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn allocation_skips_ids_in_use() {
        let mut alloc = FlowIdAllocator::default();
        let used: HashSet<u64> = [2, 3].into_iter().collect();
        let ids: Vec<u64> = (0..3)
            .filter_map(|_| alloc.allocate(|id| used.contains(&id.get())))
            .map(FlowId::get)
            .collect();
        assert_eq!(ids, vec![1, 4, 5]);
    }

    #[test]
    fn allocation_wraps() {
        let mut alloc = FlowIdAllocator::starting_at(FlowId::MAX);
        assert_eq!(alloc.allocate(|_| false), Some(FlowId::MAX));
        assert_eq!(alloc.allocate(|_| false), Some(FlowId::MIN));
    }
}
