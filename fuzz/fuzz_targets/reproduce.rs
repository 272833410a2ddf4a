use std::time::Instant;

use chatview::markdown::{SpanStyle, render_markdown};
use log::info;

fn main() {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: reproduce <artifact-file-or-markdown>");
        std::process::exit(1);
    });

    let data = std::fs::read(&path).unwrap_or_else(|e| {
        eprintln!("Failed to read {path}: {e}");
        std::process::exit(1);
    });

    let markdown = match std::str::from_utf8(&data) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Input is not valid UTF-8: {e}");
            std::process::exit(1);
        }
    };

    let iterations = std::env::var("ITERATIONS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1);

    eprintln!("=== Input: {} ({} bytes), {} iteration(s) ===", path, markdown.len(), iterations);

    for i in 0..iterations {
        let iter_start = Instant::now();
        for width in [1, 20, 80] {
            let lines = render_markdown(markdown, width, SpanStyle::default());
            info!("iteration {i}: width {width} -> {} line(s)", lines.len());
        }
        eprintln!(
            "iteration {i}: {:.1}ms",
            iter_start.elapsed().as_secs_f64() * 1000.0
        );
    }
}
