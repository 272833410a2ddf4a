//! Per-item measured heights, keyed by item index.

use log::trace;

/// Last-measured height (in rows) of each item.
///
/// Absent entries are expected: callers fall back to the estimated height.
/// `revision` increases on every mutation that changes a stored value, so the
/// offset index can be memoized on it instead of comparing the whole cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeightCache {
    heights: Vec<Option<u32>>,
    revision: u64,
}

impl HeightCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, idx: usize) -> Option<u32> {
        self.heights.get(idx).copied().flatten()
    }

    /// Store a measurement. Returns true if the cached value changed
    /// (a previously absent entry counts as a change).
    pub fn set(&mut self, idx: usize, height: u32) -> bool {
        let old = self.get(idx);
        if old == Some(height) {
            return false;
        }
        if idx >= self.heights.len() {
            self.heights.resize(idx + 1, None);
        }
        self.heights[idx] = Some(height);
        self.revision += 1;
        trace!("height_cache: [{idx}] {old:?} -> {height} (rev {})", self.revision);
        true
    }

    /// Forget the measurement for one item (its content changed in place).
    pub fn invalidate(&mut self, idx: usize) -> bool {
        if let Some(slot) = self.heights.get_mut(idx)
            && slot.is_some()
        {
            *slot = None;
            self.revision += 1;
            trace!("height_cache: [{idx}] invalidated (rev {})", self.revision);
            return true;
        }
        false
    }

    /// Drop entries whose index is no longer part of a sequence of `len` items.
    pub fn prune(&mut self, len: usize) -> bool {
        if self.heights.len() <= len {
            return false;
        }
        let removed = self.heights[len..].iter().filter(|h| h.is_some()).count();
        self.heights.truncate(len);
        if removed > 0 {
            self.revision += 1;
            trace!("height_cache: pruned {removed} entries beyond {len}");
        }
        removed > 0
    }

    /// Forget every measurement (e.g. the viewport width changed).
    pub fn clear(&mut self) {
        if self.heights.iter().any(Option::is_some) {
            self.revision += 1;
        }
        self.heights.clear();
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of items with a stored measurement.
    pub fn measured_count(&self) -> usize {
        self.heights.iter().filter(|h| h.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_by_default() {
        let cache = HeightCache::new();
        assert_eq!(cache.get(0), None);
        assert_eq!(cache.get(1000), None);
        assert_eq!(cache.revision(), 0);
    }

    #[test]
    fn set_reports_change_and_bumps_revision() {
        let mut cache = HeightCache::new();
        assert!(cache.set(3, 7));
        assert_eq!(cache.get(3), Some(7));
        assert_eq!(cache.get(2), None);
        assert_eq!(cache.revision(), 1);

        assert!(!cache.set(3, 7), "same value is not a change");
        assert_eq!(cache.revision(), 1);

        assert!(cache.set(3, 9));
        assert_eq!(cache.revision(), 2);
    }

    #[test]
    fn invalidate_only_counts_existing_entries() {
        let mut cache = HeightCache::new();
        cache.set(0, 4);
        assert!(!cache.invalidate(1));
        assert!(!cache.invalidate(50));
        assert!(cache.invalidate(0));
        assert_eq!(cache.get(0), None);
        assert!(!cache.invalidate(0));
    }

    #[test]
    fn prune_drops_entries_past_len() {
        let mut cache = HeightCache::new();
        for i in 0..10 {
            cache.set(i, 2);
        }
        let rev = cache.revision();
        assert!(cache.prune(4));
        assert_eq!(cache.measured_count(), 4);
        assert_eq!(cache.get(4), None);
        assert!(cache.revision() > rev);
        assert!(!cache.prune(4));
        assert!(!cache.prune(100));
    }

    #[test]
    fn clear_on_empty_cache_keeps_revision() {
        let mut cache = HeightCache::new();
        cache.clear();
        assert_eq!(cache.revision(), 0);
        cache.set(1, 1);
        cache.clear();
        assert_eq!(cache.revision(), 2);
        assert_eq!(cache.measured_count(), 0);
    }
}
