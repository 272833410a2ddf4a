//! Screen layout and focus.

use crate::virtual_list::VirtualList;

/// Columns left of the message text (focus marker + space).
pub(super) const GUTTER_COLS: u16 = 2;
const SCROLLBAR_COLS: u16 = 1;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Layout {
    pub term_cols: u16,
    pub list_rows: u16,     // transcript viewport height (= term_rows - 2)
    pub content_cols: u16,  // message text width
    pub scrollbar_col: u16, // last column
    pub input_row: u16,     // prompt / search bar (= term_rows - 2)
    pub status_row: u16,    // status bar (= term_rows - 1)
}

pub(super) fn compute_layout(term_cols: u16, term_rows: u16) -> Layout {
    let content_cols = term_cols
        .saturating_sub(GUTTER_COLS + SCROLLBAR_COLS)
        .max(1);
    Layout {
        term_cols,
        list_rows: term_rows.saturating_sub(2),
        content_cols,
        scrollbar_col: term_cols.saturating_sub(1),
        input_row: term_rows.saturating_sub(2),
        status_row: term_rows.saturating_sub(1),
    }
}

// ---------------------------------------------------------------------------
// Focus
// ---------------------------------------------------------------------------

/// The message commands act on: the one covering the viewport top, unless
/// less than half of it is still visible and the next one starts on screen.
pub(super) fn focused_index(list: &VirtualList) -> Option<usize> {
    let len = list.len();
    if len == 0 {
        return None;
    }
    let offsets = list.offsets();
    let top = list.scroll_top();
    let covering = offsets.first_ending_after(top).min(len - 1);
    let height = offsets.height(covering).unwrap_or(0);
    let visible = offsets.offset_top(covering + 1).saturating_sub(top);
    let next = covering + 1;
    if visible * 2 < height
        && next < len
        && offsets.offset_top(next) < top.saturating_add(list.container_height())
    {
        return Some(next);
    }
    Some(covering)
}

/// Percentage through the scrollable range.
pub(super) fn scroll_percent(scroll_top: u32, max_scroll: u32) -> u32 {
    if max_scroll == 0 {
        100
    } else {
        ((u64::from(scroll_top.min(max_scroll)) * 100) / u64::from(max_scroll)) as u32
    }
}
