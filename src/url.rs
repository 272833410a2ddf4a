//! Bare URL detection for message text.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// `http://` or `https://` followed by non-space, non-bracket characters,
/// minus trailing prose punctuation (`. , ; : ! ? - ' "`).
static BARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>\)\]\}]+[^\s<>\)\]\}.,:;!?\-'"]"#)
        .unwrap_or_else(|e| unreachable!("bare URL pattern: {e}"))
});

/// Byte ranges of bare URLs in `text`, in order.
pub fn bare_url_ranges(text: &str) -> Vec<Range<usize>> {
    BARE_URL_RE.find_iter(text).map(|m| m.range()).collect()
}

/// Split `text` into alternating (fragment, is_url) pieces, dropping empty
/// fragments.
pub fn split_urls(text: &str) -> Vec<(&str, bool)> {
    let mut pieces = Vec::new();
    let mut pos = 0;
    for range in bare_url_ranges(text) {
        if range.start > pos {
            pieces.push((&text[pos..range.start], false));
        }
        pieces.push((&text[range.clone()], true));
        pos = range.end;
    }
    if pos < text.len() {
        pieces.push((&text[pos..], false));
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(text: &str) -> Vec<&str> {
        bare_url_ranges(text).into_iter().map(|r| &text[r]).collect()
    }

    #[test]
    fn trailing_punctuation_excluded() {
        assert_eq!(urls("See https://example.invalid/page."), vec!["https://example.invalid/page"]);
        assert_eq!(urls("https://example.invalid/page, more"), vec!["https://example.invalid/page"]);
        assert_eq!(urls("URL: https://example.invalid:"), vec!["https://example.invalid"]);
        assert_eq!(urls("https://example.invalid?"), vec!["https://example.invalid"]);
    }

    #[test]
    fn query_and_fragment_kept() {
        assert_eq!(
            urls("https://example.invalid/path?q=1&r=2#frag"),
            vec!["https://example.invalid/path?q=1&r=2#frag"]
        );
    }

    #[test]
    fn closing_paren_excluded() {
        assert_eq!(
            urls("(https://example.invalid/wiki/Rust_(lang))"),
            vec!["https://example.invalid/wiki/Rust_(lang"]
        );
    }

    #[test]
    fn wide_text_around_url() {
        assert_eq!(urls("参考: https://example.invalid を見て"), vec!["https://example.invalid"]);
    }

    #[test]
    fn split_alternates_text_and_urls() {
        let pieces = split_urls("a https://x.invalid b http://y.invalid");
        assert_eq!(
            pieces,
            vec![
                ("a ", false),
                ("https://x.invalid", true),
                (" b ", false),
                ("http://y.invalid", true),
            ]
        );
        assert_eq!(split_urls("plain"), vec![("plain", false)]);
        assert!(split_urls("").is_empty());
    }
}
