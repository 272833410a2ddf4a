//! Offset index: prefix sums over item heights.

use super::height_cache::HeightCache;

/// Top offset of every item plus the total content height.
///
/// `offsets[i]` is the top edge of item `i` and `offsets[n]` the total
/// height, so `offsets.len() == n + 1` always holds and
/// `offsets[i + 1] == offsets[i] + height(i)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetIndex {
    offsets: Vec<u32>,
}

impl Default for OffsetIndex {
    fn default() -> Self {
        Self { offsets: vec![0] }
    }
}

impl OffsetIndex {
    /// Linear prefix sum over `0..len`, using the cached height when present
    /// and `estimated_height` otherwise.
    pub fn build(len: usize, cache: &HeightCache, estimated_height: u32) -> Self {
        let mut offsets = Vec::with_capacity(len + 1);
        let mut acc = 0u32;
        offsets.push(acc);
        for idx in 0..len {
            acc = acc.saturating_add(cache.get(idx).unwrap_or(estimated_height));
            offsets.push(acc);
        }
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Top edge of item `idx`. Indices past the end clamp to the total height.
    pub fn offset_top(&self, idx: usize) -> u32 {
        self.offsets[idx.min(self.len())]
    }

    pub fn height(&self, idx: usize) -> Option<u32> {
        (idx < self.len()).then(|| self.offsets[idx + 1] - self.offsets[idx])
    }

    pub fn total_height(&self) -> u32 {
        self.offsets[self.len()]
    }

    /// Smallest index whose bottom edge lies below `y`, or `len()` if none.
    pub fn first_ending_after(&self, y: u32) -> usize {
        self.offsets[1..].partition_point(|&bottom| bottom <= y)
    }

    /// Smallest index whose top edge is at or below `y`, or `len()` if none.
    pub fn first_starting_at(&self, y: u32) -> usize {
        self.offsets[..self.len()].partition_point(|&top| top < y)
    }
}
