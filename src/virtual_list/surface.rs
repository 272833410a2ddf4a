//! Render surface composition: viewport rows, scrollbar, edge fade.
//!
//! Pure geometry, no terminal I/O. The painter in `viewer::terminal` walks
//! the rows produced here.

use super::Window;
use super::measure::{Measured, MountRegistry};

/// What a single viewport row shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRow {
    /// Row `line` of the mounted node for item `index`.
    Line { index: usize, line: u32 },
    /// Placeholder space standing in for unmounted items.
    Padding,
    /// Past the end of the content.
    Blank,
}

/// Map each of the `window.container_height` viewport rows to content.
///
/// Mounted nodes are stacked from `window.top_padding` downwards using their
/// own measured heights; everything between the content edges that no node
/// covers is padding.
pub fn compose<N: Measured>(window: &Window, registry: &MountRegistry<N>) -> Vec<SurfaceRow> {
    let mut spans: Vec<(u32, u32, usize)> = Vec::with_capacity(window.range.len());
    let mut cursor = window.top_padding;
    for idx in window.range.indices() {
        let h = registry.get(idx).map_or(0, Measured::height);
        spans.push((cursor, h, idx));
        cursor = cursor.saturating_add(h);
    }

    (0..window.container_height)
        .map(|row| {
            let y = window.scroll_top.saturating_add(row);
            if y >= window.total_height {
                return SurfaceRow::Blank;
            }
            spans
                .iter()
                .find(|&&(top, h, _)| y >= top && y < top + h)
                .map_or(SurfaceRow::Padding, |&(top, _, index)| SurfaceRow::Line {
                    index,
                    line: y - top,
                })
        })
        .collect()
}

/// Scrollbar thumb as `(first_row, rows)` over a track of `viewport` rows.
///
/// Sized from the full logical height, not from what is mounted. `None` when
/// everything fits.
pub fn scrollbar_thumb(total: u32, viewport: u32, scroll_top: u32) -> Option<(u32, u32)> {
    if viewport == 0 || total <= viewport {
        return None;
    }
    let (total, viewport64) = (u64::from(total), u64::from(viewport));
    let len = (viewport64 * viewport64 / total).max(1);
    let max_scroll = total - viewport64;
    let travel = viewport64 - len;
    let pos = (u64::from(scroll_top).min(max_scroll) * travel + max_scroll / 2) / max_scroll;
    Some((pos as u32, len as u32))
}

/// Whether `row` lies in the faded band at the top or bottom edge.
///
/// The band is skipped when the viewport is too short to keep any row at
/// full intensity.
pub fn is_faded(row: u32, viewport: u32, fade_rows: u32) -> bool {
    if fade_rows == 0 || viewport <= fade_rows * 2 {
        return false;
    }
    row < fade_rows || row >= viewport - fade_rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_list::{ListConfig, VirtualList};

    struct Rows(u32);

    impl Measured for Rows {
        fn height(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn compose_empty_list_is_blank() {
        let mut list = VirtualList::new(ListConfig::default(), 3);
        let mut reg: MountRegistry<Rows> = MountRegistry::new();
        let w = list.layout(&mut reg, |_| Rows(1));
        assert_eq!(compose(&w, &reg), vec![SurfaceRow::Blank; 3]);
        assert!(reg.is_empty());
    }

    #[test]
    fn compose_maps_rows_to_item_lines() {
        let mut list = VirtualList::new(ListConfig::new(4, 0, 2).unwrap(), 5);
        list.set_items(10, 1);
        list.scroll_to(6);
        let mut reg = MountRegistry::new();
        let w = list.layout(&mut reg, |_| Rows(3));
        // item 1 spans 4..7, item 2 spans 7..10, item 3 is unmounted
        assert_eq!(w.range.start, 1);
        let rows = compose(&w, &reg);
        assert_eq!(
            rows,
            vec![
                SurfaceRow::Line { index: 1, line: 2 },
                SurfaceRow::Line { index: 2, line: 0 },
                SurfaceRow::Line { index: 2, line: 1 },
                SurfaceRow::Line { index: 2, line: 2 },
                SurfaceRow::Padding,
            ]
        );
    }

    #[test]
    fn thumb_tracks_full_height() {
        assert_eq!(scrollbar_thumb(10, 20, 0), None);
        assert_eq!(scrollbar_thumb(100, 10, 0), Some((0, 1)));
        assert_eq!(scrollbar_thumb(100, 10, 90), Some((9, 1)));
        assert_eq!(scrollbar_thumb(20, 10, 0), Some((0, 5)));
        assert_eq!(scrollbar_thumb(20, 10, 10), Some((5, 5)));
        assert_eq!(scrollbar_thumb(20, 10, 500), Some((5, 5)));
    }

    #[test]
    fn fade_band_at_both_edges() {
        let faded: Vec<u32> = (0..8).filter(|&r| is_faded(r, 8, 2)).collect();
        assert_eq!(faded, vec![0, 1, 6, 7]);
        assert!(!is_faded(0, 4, 2));
        assert!(!is_faded(0, 8, 0));
    }
}
