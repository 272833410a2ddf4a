//! Dynamic-height virtualized list engine.
//!
//! Renders only the window of a variable-height item sequence that can be
//! seen through a fixed-height viewport:
//!
//!   item heights ──► HeightCache ──► OffsetIndex ──► VisibleRange
//!        ▲                                               │
//!        └──── measure (MountRegistry) ◄──── mount ◄─────┘
//!
//! Heights are unknown until an item is rendered, so every render cycle
//! mounts a window using cached (or estimated) heights, measures what was
//! actually rendered, and if anything changed rebuilds the offsets and moves
//! `scroll_top` by the offset delta of the first mounted item. Content on
//! screen therefore keeps its position while off-screen estimates converge.
//!
//! The engine owns the cache, the offsets and the scroll position. It never
//! sees item data: the caller supplies the sequence length, a revision that
//! changes whenever the sequence changes, and a render callback.

mod height_cache;
mod measure;
mod offsets;
mod range;
pub mod surface;

pub use height_cache::HeightCache;
pub use measure::{MountPass, MountRegistry, Measured, Phase, Reconciliation};
pub use offsets::OffsetIndex;
pub use range::{VisibleRange, resolve};

use std::collections::BTreeSet;

use anyhow::bail;
use log::{debug, trace};

use measure::{compensate, measure_pass};

/// Upper bound on mount/measure cycles per `layout` call. Deterministic
/// renderers settle on the second pass; the bound only guards against a
/// node whose height changes every time it is rendered.
pub const MAX_SETTLE_PASSES: usize = 4;

/// Validated engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListConfig {
    estimated_height: u32,
    overscan: usize,
    window_size: usize,
    follow: bool,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            estimated_height: 6,
            overscan: 3,
            window_size: 20,
            follow: false,
        }
    }
}

impl ListConfig {
    /// Fails on a zero `estimated_height` or `window_size`; both would make
    /// unmeasured items invisible to range resolution.
    pub fn new(estimated_height: u32, overscan: usize, window_size: usize) -> anyhow::Result<Self> {
        if estimated_height == 0 {
            bail!("estimated_height must be positive");
        }
        if window_size == 0 {
            bail!("window_size must be positive");
        }
        Ok(Self {
            estimated_height,
            overscan,
            window_size,
            follow: false,
        })
    }

    /// Keep the viewport pinned to the bottom while it is scrolled there.
    pub fn with_follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn estimated_height(&self) -> u32 {
        self.estimated_height
    }

    pub fn overscan(&self) -> usize {
        self.overscan
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn follow(&self) -> bool {
        self.follow
    }
}

/// Inputs the offset index was last built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemoKey {
    sequence_revision: u64,
    len: usize,
    estimated_height: u32,
    cache_revision: u64,
}

/// Geometry of one settled render cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub range: VisibleRange,
    pub scroll_top: u32,
    pub container_height: u32,
    pub total_height: u32,
    /// Space above the first mounted item (`offset_top(start)`).
    pub top_padding: u32,
    /// Space below the last mounted item (`total - offset_top(end)`).
    pub bottom_padding: u32,
}

#[derive(Debug)]
pub struct VirtualList {
    config: ListConfig,
    container_height: u32,
    cache: HeightCache,
    offsets: OffsetIndex,
    memo: Option<MemoKey>,
    len: usize,
    sequence_revision: u64,
    scroll_top: u32,
    pending_scroll: Option<u32>,
    pinned: bool,
    phase: Phase,
}

impl VirtualList {
    pub fn new(config: ListConfig, container_height: u32) -> Self {
        Self {
            config,
            container_height,
            cache: HeightCache::new(),
            offsets: OffsetIndex::default(),
            memo: None,
            len: 0,
            sequence_revision: 0,
            scroll_top: 0,
            pending_scroll: None,
            pinned: config.follow,
            phase: Phase::Idle,
        }
    }

    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn scroll_top(&self) -> u32 {
        self.scroll_top
    }

    pub fn container_height(&self) -> u32 {
        self.container_height
    }

    pub fn total_height(&self) -> u32 {
        self.offsets.total_height()
    }

    pub fn max_scroll(&self) -> u32 {
        self.total_height().saturating_sub(self.container_height)
    }

    pub fn is_at_bottom(&self) -> bool {
        self.scroll_top >= self.max_scroll()
    }

    /// Whether follow mode currently keeps the viewport on the last row.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn offsets(&self) -> &OffsetIndex {
        &self.offsets
    }

    pub fn height_cache(&self) -> &HeightCache {
        &self.cache
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Point the engine at a sequence of `len` items.
    ///
    /// `revision` must change whenever the caller's sequence changes (append,
    /// removal, in-place update); it is part of the offset memo key.
    pub fn set_items(&mut self, len: usize, revision: u64) {
        if len < self.len {
            self.cache.prune(len);
        }
        if len != self.len || revision != self.sequence_revision {
            debug!(
                "virtual_list: items {} -> {len} (rev {} -> {revision})",
                self.len, self.sequence_revision
            );
        }
        self.len = len;
        self.sequence_revision = revision;
        self.refresh();
    }

    pub fn set_container_height(&mut self, rows: u32) {
        if rows != self.container_height {
            debug!("virtual_list: container height {} -> {rows}", self.container_height);
            self.container_height = rows;
        }
    }

    pub fn set_estimated_height(&mut self, rows: u32) -> anyhow::Result<()> {
        if rows == 0 {
            bail!("estimated_height must be positive");
        }
        self.config.estimated_height = rows;
        self.refresh();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scrolling (coalesced: only the latest request is applied at `mount`)
    // -----------------------------------------------------------------------

    pub fn scroll_to(&mut self, top: u32) {
        trace!("virtual_list: scroll request {top}");
        self.pending_scroll = Some(top);
    }

    pub fn scroll_by(&mut self, delta: i64) {
        let base = self.pending_scroll.unwrap_or(self.scroll_top);
        self.scroll_to(compensate(base, delta));
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_to(u32::MAX);
    }

    /// Scroll so that the top edge of item `idx` is at the viewport top.
    pub fn scroll_to_index(&mut self, idx: usize) {
        self.scroll_to(self.offsets.offset_top(idx));
    }

    // -----------------------------------------------------------------------
    // Measurements outside a mount pass
    // -----------------------------------------------------------------------

    /// Record a height measured outside a mount pass, compensating the scroll
    /// position so the first visible item stays put. Returns the applied delta.
    pub fn record_height(&mut self, idx: usize, height: u32) -> i64 {
        if idx >= self.len {
            return 0;
        }
        self.reanchor(|cache| cache.set(idx, height))
    }

    /// Forget the measurement of one item whose content changed in place.
    pub fn invalidate(&mut self, idx: usize) -> i64 {
        self.reanchor(|cache| cache.invalidate(idx))
    }

    /// Forget every measurement (the layout width changed).
    pub fn invalidate_all(&mut self) -> i64 {
        self.reanchor(|cache| {
            let had = cache.measured_count() > 0;
            cache.clear();
            had
        })
    }

    // -----------------------------------------------------------------------
    // Render cycle
    // -----------------------------------------------------------------------

    /// Apply the latest scroll request, resolve the window and start a
    /// measurement transaction for it.
    pub fn mount(&mut self) -> MountPass {
        self.refresh();
        let max = self.max_scroll();
        if let Some(target) = self.pending_scroll.take() {
            self.scroll_top = target.min(max);
            self.pinned = self.config.follow && self.scroll_top >= max;
        } else if self.pinned {
            self.scroll_top = max;
        } else {
            self.scroll_top = self.scroll_top.min(max);
        }

        let range = resolve(
            &self.offsets,
            self.scroll_top,
            self.config.overscan,
            self.config.window_size,
        );
        let anchor_top = self.offsets.offset_top(range.start);
        self.phase = Phase::Measuring;
        trace!(
            "virtual_list: mount {}..{} at scroll_top={} (anchor={anchor_top}, total={})",
            range.start,
            range.end,
            self.scroll_top,
            self.total_height()
        );
        MountPass { range, anchor_top }
    }

    /// Measure the nodes mounted for `pass` and reconcile the cache.
    ///
    /// When a height changed, the offsets are rebuilt and `scroll_top` moves
    /// by the change in `offset_top(pass.range.start)`, which keeps the first
    /// mounted item at the same screen row. Reconciling an unchanged layout
    /// is a no-op.
    pub fn reconcile<N: Measured>(
        &mut self,
        pass: &MountPass,
        registry: &MountRegistry<N>,
    ) -> Reconciliation {
        let writes = measure_pass(pass, registry, &mut self.cache);
        self.phase = Phase::Idle;
        if writes == 0 {
            trace!("virtual_list: settled ({}..{})", pass.range.start, pass.range.end);
            return Reconciliation::Settled;
        }

        let old_total = self.total_height();
        self.refresh();
        let old_scroll = self.scroll_top;
        if self.pinned {
            self.scroll_top = self.max_scroll();
        } else {
            let delta =
                i64::from(self.offsets.offset_top(pass.range.start)) - i64::from(pass.anchor_top);
            self.scroll_top = compensate(self.scroll_top, delta);
        }
        let delta = i64::from(self.scroll_top) - i64::from(old_scroll);
        debug!(
            "virtual_list: corrected {writes} height(s) in {}..{}: total {old_total} -> {}, scroll_top {old_scroll} -> {}",
            pass.range.start,
            pass.range.end,
            self.total_height(),
            self.scroll_top
        );
        Reconciliation::Corrected { delta }
    }

    /// Run mount → render → measure → reconcile until the layout settles.
    ///
    /// `render_item` is called for every index of the mounted window that is
    /// not already mounted in this call; nodes left over from the previous
    /// call are replaced because the item may have changed since.
    pub fn layout<N, F>(&mut self, registry: &mut MountRegistry<N>, mut render_item: F) -> Window
    where
        N: Measured,
        F: FnMut(usize) -> N,
    {
        let mut rendered: BTreeSet<usize> = BTreeSet::new();
        let mut passes = 0;
        loop {
            let pass = self.mount();
            registry.retain_range(pass.range);
            for idx in pass.range.indices() {
                if rendered.insert(idx) {
                    registry.mount(idx, render_item(idx));
                }
            }
            passes += 1;
            let outcome = self.reconcile(&pass, registry);
            if outcome == Reconciliation::Settled || passes >= MAX_SETTLE_PASSES {
                if outcome != Reconciliation::Settled {
                    debug!("virtual_list: not settled after {passes} passes");
                }
                return self.window(pass.range);
            }
        }
    }

    /// [`layout`](Self::layout) over a caller-owned slice.
    pub fn layout_items<T, N, F>(
        &mut self,
        items: &[T],
        revision: u64,
        registry: &mut MountRegistry<N>,
        mut render_item: F,
    ) -> Window
    where
        N: Measured,
        F: FnMut(&T, usize) -> N,
    {
        self.set_items(items.len(), revision);
        self.layout(registry, |idx| render_item(&items[idx], idx))
    }

    /// Geometry for a mounted `range` under the current offsets.
    pub fn window(&self, range: VisibleRange) -> Window {
        let total = self.total_height();
        Window {
            range,
            scroll_top: self.scroll_top,
            container_height: self.container_height,
            total_height: total,
            top_padding: self.offsets.offset_top(range.start),
            bottom_padding: total - self.offsets.offset_top(range.end),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Rebuild the offset index if any of its inputs changed.
    fn refresh(&mut self) {
        let key = MemoKey {
            sequence_revision: self.sequence_revision,
            len: self.len,
            estimated_height: self.config.estimated_height,
            cache_revision: self.cache.revision(),
        };
        if self.memo == Some(key) {
            return;
        }
        self.offsets = OffsetIndex::build(self.len, &self.cache, self.config.estimated_height);
        self.memo = Some(key);
    }

    /// Mutate the cache, then move `scroll_top` by the offset change of the
    /// first visible item.
    fn reanchor(&mut self, mutate: impl FnOnce(&mut HeightCache) -> bool) -> i64 {
        let anchor = self.offsets.first_ending_after(self.scroll_top);
        let old_top = self.offsets.offset_top(anchor);
        if !mutate(&mut self.cache) {
            return 0;
        }
        self.refresh();
        let old_scroll = self.scroll_top;
        if self.pinned {
            self.scroll_top = self.max_scroll();
        } else {
            let delta = i64::from(self.offsets.offset_top(anchor)) - i64::from(old_top);
            self.scroll_top = compensate(self.scroll_top, delta);
        }
        let applied = i64::from(self.scroll_top) - i64::from(old_scroll);
        debug!("virtual_list: reanchored on item {anchor}, scroll_top moved {applied}");
        applied
    }
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

    fn list(n: usize, estimate: u32, container: u32) -> VirtualList {
        let mut list = VirtualList::new(ListConfig::new(estimate, 3, 20).unwrap(), container);
        list.set_items(n, 1);
        list
    }

    #[test]
    fn config_rejects_zero_sizes() {
        assert!(ListConfig::new(0, 3, 20).is_err());
        assert!(ListConfig::new(4, 3, 0).is_err());
        assert!(ListConfig::new(4, 0, 1).is_ok());
        let mut l = list(3, 4, 10);
        assert!(l.set_estimated_height(0).is_err());
        assert_eq!(l.config().estimated_height(), 4);
    }

    #[test]
    fn offsets_rebuilt_only_when_inputs_change() {
        let mut l = list(10, 4, 10);
        assert_eq!(l.total_height(), 40);
        let memo = l.memo;
        l.set_items(10, 1);
        assert_eq!(l.memo, memo);
        l.set_estimated_height(5).unwrap();
        assert_eq!(l.total_height(), 50);
        l.set_items(11, 2);
        assert_eq!(l.total_height(), 55);
    }

    #[test]
    fn mount_and_reconcile_cycle_phases() {
        let mut l = list(5, 4, 10);
        assert_eq!(l.phase(), Phase::Idle);
        let pass = l.mount();
        assert_eq!(l.phase(), Phase::Measuring);
        let reg: MountRegistry<Rows> = MountRegistry::new();
        assert_eq!(l.reconcile(&pass, &reg), Reconciliation::Settled);
        assert_eq!(l.phase(), Phase::Idle);
    }

    #[test]
    fn scroll_requests_are_coalesced() {
        let mut l = list(100, 4, 10);
        l.scroll_to(40);
        l.scroll_to(12);
        l.scroll_by(8);
        assert_eq!(l.scroll_top(), 0, "not applied before mount");
        l.mount();
        assert_eq!(l.scroll_top(), 20);
    }

    #[test]
    fn scroll_is_clamped_to_max() {
        let mut l = list(10, 4, 10);
        l.scroll_to(1000);
        l.mount();
        assert_eq!(l.scroll_top(), 30);
        l.scroll_by(-1000);
        l.mount();
        assert_eq!(l.scroll_top(), 0);
    }

    #[test]
    fn measurement_in_window_keeps_anchor() {
        let mut l = list(100, 4, 10);
        l.scroll_to(40);
        let pass = l.mount();
        assert_eq!(pass.range.start, 10);
        let mut reg = MountRegistry::new();
        for idx in pass.range.indices() {
            reg.mount(idx, Rows(2));
        }
        let outcome = l.reconcile(&pass, &reg);
        // Only items at or below the anchor changed; its top is unchanged.
        assert_eq!(outcome, Reconciliation::Corrected { delta: 0 });
        assert_eq!(l.scroll_top(), 40);
        assert_eq!(l.total_height(), 400 - 23 * 2);
    }

    #[test]
    fn record_height_above_viewport_compensates() {
        let mut l = list(100, 4, 10);
        l.scroll_to(40);
        l.mount();
        assert_eq!(l.record_height(3, 10), 6);
        assert_eq!(l.scroll_top(), 46);
        assert_eq!(l.record_height(3, 10), 0);
        assert_eq!(l.invalidate(3), -6);
        assert_eq!(l.scroll_top(), 40);
        assert_eq!(l.record_height(500, 1), 0);
    }

    #[test]
    fn shrinking_sequence_prunes_cache() {
        let mut l = list(10, 4, 10);
        l.record_height(8, 1);
        l.set_items(5, 2);
        assert_eq!(l.height_cache().get(8), None);
        assert_eq!(l.total_height(), 20);
    }

    #[test]
    fn follow_mode_pins_to_bottom() {
        let config = ListConfig::new(4, 3, 20).unwrap().with_follow(true);
        let mut l = VirtualList::new(config, 10);
        let mut reg = MountRegistry::new();
        l.set_items(10, 1);
        l.layout(&mut reg, |_| Rows(4));
        assert_eq!(l.scroll_top(), 30);

        l.set_items(11, 2);
        l.layout(&mut reg, |i| Rows(if i == 10 { 7 } else { 4 }));
        assert_eq!(l.scroll_top(), 47 - 10);
        assert!(l.is_pinned());

        l.scroll_by(-5);
        l.layout(&mut reg, |i| Rows(if i == 10 { 7 } else { 4 }));
        assert!(!l.is_pinned());
        l.set_items(12, 3);
        l.layout(&mut reg, |_| Rows(4));
        assert_eq!(l.scroll_top(), 32, "unpinned view does not follow");

        l.scroll_to_bottom();
        l.layout(&mut reg, |_| Rows(4));
        assert!(l.is_pinned());
    }

    #[test]
    fn layout_settles_and_reports_padding() {
        let mut l = list(50, 4, 10);
        let mut reg = MountRegistry::new();
        let w = l.layout(&mut reg, |_| Rows(2));
        assert_eq!(w.range, VisibleRange { start: 0, end: 23 });
        assert_eq!(w.top_padding, 0);
        assert_eq!(w.total_height, 23 * 2 + 27 * 4);
        assert_eq!(w.bottom_padding, 27 * 4);
        assert_eq!(reg.len(), 23);
    }

    #[test]
    fn invalidate_all_keeps_intra_item_offset() {
        let mut l = list(20, 4, 10);
        let mut reg = MountRegistry::new();
        l.layout(&mut reg, |_| Rows(3));
        l.scroll_to(10); // item 3, one row in
        l.layout(&mut reg, |_| Rows(3));
        assert_eq!(l.scroll_top(), 10);
        l.invalidate_all();
        assert_eq!(l.scroll_top(), 13, "item 3 top moved from 9 to 12");
    }
}
