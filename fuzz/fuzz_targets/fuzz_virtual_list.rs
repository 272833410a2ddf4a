#![no_main]

use chatview::virtual_list::surface::{SurfaceRow, compose};
use chatview::virtual_list::{ListConfig, Measured, MountRegistry, VirtualList};
use libfuzzer_sys::fuzz_target;

struct Rows(u32);

impl Measured for Rows {
    fn height(&self) -> u32 {
        self.0
    }
}

// Each op is two bytes: opcode, argument.
fuzz_target!(|data: &[u8]| {
    let Some((&head, ops)) = data.split_first() else {
        return;
    };
    let estimated = u32::from(head % 16) + 1;
    let Ok(config) = ListConfig::new(estimated, usize::from(head >> 6), 8) else {
        return;
    };
    let mut list = VirtualList::new(config.with_follow(head & 0x20 != 0), 24);
    let mut registry: MountRegistry<Rows> = MountRegistry::new();
    let mut heights: Vec<u32> = Vec::new();
    let mut revision = 0u64;

    for op in ops.chunks_exact(2) {
        let arg = op[1];
        match op[0] % 8 {
            0 => {
                heights.push(u32::from(arg % 40));
                revision += 1;
            }
            1 => {
                heights.pop();
                revision += 1;
            }
            2 => list.scroll_by(i64::from(arg as i8) * 3),
            3 => list.scroll_to(u32::from(arg) * 7),
            4 => {
                if let Some(h) = heights.get_mut(usize::from(arg)) {
                    *h = u32::from(arg % 13);
                    list.invalidate(usize::from(arg));
                }
            }
            5 => list.set_container_height(u32::from(arg % 64)),
            6 => list.scroll_to_index(usize::from(arg)),
            _ => {
                list.invalidate_all();
            }
        }

        list.set_items(heights.len(), revision);
        let window = list.layout(&mut registry, |i| Rows(heights[i]));

        assert!(window.range.end <= heights.len());
        assert!(window.range.start <= window.range.end);
        assert!(list.scroll_top() <= list.max_scroll());
        let offsets = list.offsets();
        assert_eq!(offsets.offset_top(0), 0);
        assert_eq!(offsets.offset_top(heights.len()), offsets.total_height());
        for idx in window.range.indices() {
            assert!(registry.contains(idx));
        }

        let rows = compose(&window, &registry);
        assert_eq!(rows.len(), window.container_height as usize);
        for row in rows {
            if let SurfaceRow::Line { index, line } = row {
                assert!(line < heights[index]);
            }
        }
    }
});
