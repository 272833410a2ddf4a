#![no_main]

use chatview::markdown::{SpanStyle, render_markdown, wrap_plain};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&w, rest)) = data.split_first() else {
        return;
    };
    let Ok(markdown) = std::str::from_utf8(rest) else {
        return;
    };
    let width = usize::from(w % 120) + 1;

    // Must not panic at any width.
    let lines = render_markdown(markdown, width, SpanStyle::default());
    for line in &lines {
        assert!(
            line.spans.iter().all(|s| !s.text.is_empty()),
            "empty span in {:?}",
            line
        );
    }

    // Every source line yields at least one wrapped line.
    let plain = wrap_plain(markdown, width, SpanStyle::default());
    assert!(plain.len() >= markdown.lines().count());
});
