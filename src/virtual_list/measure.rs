//! Post-layout measurement: mount registry, measurement pass, compensation.
//!
//! One render cycle is a transaction: `VirtualList::mount` resolves a range
//! and returns a [`MountPass`]; the caller mounts nodes for exactly that range
//! into a [`MountRegistry`]; `VirtualList::reconcile` then measures the nodes
//! of *that* pass. A scroll request arriving in between only takes effect at
//! the next `mount`, so a measurement never reads a newer range than the one
//! it reconciles.

use std::collections::BTreeMap;

use log::trace;

use super::height_cache::HeightCache;
use super::range::VisibleRange;

/// A rendered node whose height can be read after layout.
pub trait Measured {
    fn height(&self) -> u32;
}

/// Index-keyed registry of mounted nodes.
///
/// Populated on mount and emptied of indices outside the window on unmount.
/// It is not part of any tree structure; it only exists so the measurement
/// step can find the live node for an index.
#[derive(Debug)]
pub struct MountRegistry<N> {
    nodes: BTreeMap<usize, N>,
}

impl<N> Default for MountRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> MountRegistry<N> {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }

    pub fn mount(&mut self, idx: usize, node: N) {
        self.nodes.insert(idx, node);
    }

    pub fn unmount(&mut self, idx: usize) -> Option<N> {
        self.nodes.remove(&idx)
    }

    /// Unmount every node whose index falls outside `range`.
    pub fn retain_range(&mut self, range: VisibleRange) {
        self.nodes.retain(|idx, _| range.contains(*idx));
    }

    pub fn get(&self, idx: usize) -> Option<&N> {
        self.nodes.get(&idx)
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.nodes.contains_key(&idx)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &N)> {
        self.nodes.iter().map(|(idx, node)| (*idx, node))
    }
}

/// Engine phase between `mount` and `reconcile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No measurement pending.
    Idle,
    /// A range was mounted and awaits measurement.
    Measuring,
}

/// The range mounted by one render cycle and the anchor offset it was
/// mounted with (`offset_top(range.start)` at mount time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountPass {
    pub range: VisibleRange,
    pub anchor_top: u32,
}

/// Outcome of reconciling one mount pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// No measured height differed from the cache.
    Settled,
    /// Heights changed; `scroll_top` was moved by `delta` rows.
    Corrected { delta: i64 },
}

/// Measure every mounted node of `pass` and write differences into `cache`.
///
/// Indices without a mounted node are skipped; they will be measured by a
/// later pass once mounted. Returns the number of cache writes.
pub(crate) fn measure_pass<N: Measured>(
    pass: &MountPass,
    registry: &MountRegistry<N>,
    cache: &mut HeightCache,
) -> usize {
    let mut writes = 0;
    for idx in pass.range.indices() {
        let Some(node) = registry.get(idx) else {
            trace!("measure: [{idx}] not mounted, skipping");
            continue;
        };
        if cache.set(idx, node.height()) {
            writes += 1;
        }
    }
    writes
}

/// Apply a signed row delta to a scroll offset, saturating at both ends.
pub(crate) fn compensate(scroll_top: u32, delta: i64) -> u32 {
    (i64::from(scroll_top) + delta).clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rows(u32);

    impl Measured for Rows {
        fn height(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn retain_range_unmounts_outside_nodes() {
        let mut reg = MountRegistry::new();
        for i in 0..6 {
            reg.mount(i, Rows(1));
        }
        reg.retain_range(VisibleRange { start: 2, end: 4 });
        let kept: Vec<usize> = reg.iter().map(|(i, _)| i).collect();
        assert_eq!(kept, vec![2, 3]);
        assert!(reg.unmount(2).is_some());
        assert!(!reg.contains(2));
    }

    #[test]
    fn measure_pass_skips_missing_nodes() {
        let mut reg = MountRegistry::new();
        reg.mount(0, Rows(3));
        reg.mount(2, Rows(5));
        let pass = MountPass {
            range: VisibleRange { start: 0, end: 3 },
            anchor_top: 0,
        };
        let mut cache = HeightCache::new();
        assert_eq!(measure_pass(&pass, &reg, &mut cache), 2);
        assert_eq!(cache.get(0), Some(3));
        assert_eq!(cache.get(1), None);
        assert_eq!(cache.get(2), Some(5));
        assert_eq!(measure_pass(&pass, &reg, &mut cache), 0);
    }

    #[test]
    fn measure_pass_ignores_nodes_outside_its_range() {
        let mut reg = MountRegistry::new();
        reg.mount(7, Rows(9));
        let pass = MountPass {
            range: VisibleRange { start: 0, end: 5 },
            anchor_top: 0,
        };
        let mut cache = HeightCache::new();
        assert_eq!(measure_pass(&pass, &reg, &mut cache), 0);
        assert_eq!(cache.get(7), None);
    }

    #[test]
    fn compensate_saturates() {
        assert_eq!(compensate(10, -3), 7);
        assert_eq!(compensate(2, -5), 0);
        assert_eq!(compensate(u32::MAX - 1, 5), u32::MAX);
        assert_eq!(compensate(4, 0), 4);
    }
}
