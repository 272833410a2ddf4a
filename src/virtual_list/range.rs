//! Visible-range resolution.

use std::ops::Range;

use super::offsets::OffsetIndex;

/// Half-open interval `[start, end)` of item indices to mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, idx: usize) -> bool {
        (self.start..self.end).contains(&idx)
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Resolve the mount window for `scroll_top`.
///
/// `start` is the first item whose bottom edge is below `scroll_top`, so an
/// item partially visible at the top edge stays mounted. The window then
/// extends `overscan + window_size` items forward, clamped to the sequence.
/// The bottom cutoff is deliberately generous: heights are estimates until
/// measured, and the surface masks the edges.
pub fn resolve(
    offsets: &OffsetIndex,
    scroll_top: u32,
    overscan: usize,
    window_size: usize,
) -> VisibleRange {
    let n = offsets.len();
    let start = offsets.first_ending_after(scroll_top);
    let end = start
        .saturating_add(overscan)
        .saturating_add(window_size)
        .min(n);
    VisibleRange { start, end }
}
