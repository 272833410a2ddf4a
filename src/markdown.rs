//! Markdown to wrapped, styled terminal lines.
//!
//! The output is a flat list of `StyledLine`s already wrapped to the
//! requested column width, so the number of lines is the rendered height
//! of the text. Styling is abstract (`Tone` plus attribute flags); the
//! terminal painter maps it to colors.

use std::time::Instant;

use log::trace;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::url::split_urls;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    #[default]
    Plain,
    Heading,
    Code,
    Link,
    Quote,
    Muted,
    User,
    Assistant,
    Thought,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpanStyle {
    pub tone: Tone,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub dim: bool,
}

impl SpanStyle {
    pub fn tone(tone: Tone) -> Self {
        Self {
            tone,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StyledLine {
    pub spans: Vec<Span>,
}

impl StyledLine {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn styled(text: impl Into<String>, style: SpanStyle) -> Self {
        let mut line = Self::default();
        line.push(&text.into(), style);
        line
    }

    /// Append text, merging into the last span when the style matches.
    pub fn push(&mut self, text: &str, style: SpanStyle) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => self.spans.push(Span {
                text: text.to_string(),
                style,
            }),
        }
    }

    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn width(&self) -> usize {
        self.spans.iter().map(|s| s.text.width()).sum()
    }

    pub fn is_blank(&self) -> bool {
        self.spans.iter().all(|s| s.text.trim().is_empty())
    }

    fn trim_end(&mut self) {
        while let Some(last) = self.spans.last_mut() {
            let trimmed = last.text.trim_end().len();
            if trimmed == 0 {
                self.spans.pop();
            } else {
                last.text.truncate(trimmed);
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wrapping
// ---------------------------------------------------------------------------

/// Break opportunities. NBSP and other Unicode spaces are not included.
fn is_break(c: char) -> bool {
    c.is_ascii_whitespace()
}

/// Split into maximal runs of breaking / non-breaking characters.
fn tokens(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let space = is_break(first);
        let end = rest
            .char_indices()
            .find(|&(_, c)| is_break(c) != space)
            .map_or(rest.len(), |(i, _)| i);
        let (token, tail) = rest.split_at(end);
        rest = tail;
        Some(token)
    })
}

/// Greedy word wrap. Words wider than `width` are split at character
/// boundaries; whitespace at a wrap point is dropped. Always returns at
/// least one line.
pub fn wrap_spans(spans: &[Span], width: usize) -> Vec<StyledLine> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line = StyledLine::default();
    let mut used = 0;

    for span in spans {
        for token in tokens(&span.text) {
            let token_width = token.width();
            if token.starts_with(is_break) {
                if used == 0 {
                    continue;
                }
                if used + token_width > width {
                    lines.push(std::mem::take(&mut line));
                    used = 0;
                    continue;
                }
                line.push(token, span.style);
                used += token_width;
            } else if used + token_width <= width {
                line.push(token, span.style);
                used += token_width;
            } else if token_width <= width {
                line.trim_end();
                lines.push(std::mem::take(&mut line));
                line.push(token, span.style);
                used = token_width;
            } else {
                for ch in token.chars() {
                    let cw = ch.width().unwrap_or(0);
                    if used + cw > width && used > 0 {
                        lines.push(std::mem::take(&mut line));
                        used = 0;
                    }
                    line.push(ch.encode_utf8(&mut [0; 4]), span.style);
                    used += cw;
                }
            }
        }
    }
    line.trim_end();
    if !line.spans.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

/// Character wrap that keeps whitespace (code blocks).
fn hard_wrap(text: &str, style: SpanStyle, width: usize) -> Vec<StyledLine> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line = StyledLine::default();
    let mut used = 0;
    for ch in text.chars() {
        let cw = if ch == '\t' { 4 } else { ch.width().unwrap_or(0) };
        if used + cw > width && used > 0 {
            lines.push(std::mem::take(&mut line));
            used = 0;
        }
        if ch == '\t' {
            line.push("    ", style);
        } else {
            line.push(ch.encode_utf8(&mut [0; 4]), style);
        }
        used += cw;
    }
    lines.push(line);
    lines
}

/// Wrap plain text, keeping explicit line breaks.
pub fn wrap_plain(text: &str, width: usize, style: SpanStyle) -> Vec<StyledLine> {
    text.lines()
        .flat_map(|l| {
            wrap_spans(
                &[Span {
                    text: l.to_string(),
                    style,
                }],
                width,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

/// Nesting state while walking parser events.
#[derive(Debug)]
enum Container {
    Heading(usize),
    Strong,
    Emphasis,
    Strikethrough,
    Link { url: String, first_span: usize },
    BlockQuote,
    BlockQuoteCapped,
    List { next: Option<u64> },
    Item { indent: usize },
    CodeBlock,
    Table,
    TableHead,
    TableRow,
    TableCell,
}

const MAX_BLOCKQUOTE_DEPTH: usize = 10;
const QUOTE_BAR: &str = "│ ";
const CODE_INDENT: &str = "  ";

struct LineBuilder {
    width: usize,
    base: SpanStyle,
    lines: Vec<StyledLine>,
    current: StyledLine,
    stack: Vec<Container>,
    marker: Option<String>,
    code_buf: Option<String>,
    cell_buf: Option<String>,
    table_rows: Vec<(Vec<String>, bool)>,
}

impl LineBuilder {
    fn new(width: usize, base: SpanStyle) -> Self {
        Self {
            width: width.max(1),
            base,
            lines: Vec::new(),
            current: StyledLine::default(),
            stack: Vec::new(),
            marker: None,
            code_buf: None,
            cell_buf: None,
            table_rows: Vec::new(),
        }
    }

    /// Inline style implied by the open containers.
    fn style(&self) -> SpanStyle {
        let mut style = self.base;
        for c in &self.stack {
            match c {
                Container::Heading(level) => {
                    style.tone = Tone::Heading;
                    style.bold = true;
                    style.underline |= *level == 1;
                }
                Container::Strong => style.bold = true,
                Container::Emphasis => style.italic = true,
                Container::Strikethrough => style.strike = true,
                Container::Link { .. } => {
                    style.tone = Tone::Link;
                    style.underline = true;
                }
                Container::BlockQuote | Container::BlockQuoteCapped => {
                    if style.tone == Tone::Plain {
                        style.tone = Tone::Quote;
                    }
                    style.italic = true;
                }
                _ => {}
            }
        }
        style
    }

    /// Left margin for the next physical line. `first` selects the list
    /// marker (if pending) over its blank continuation indent.
    fn prefix(&self, first: bool) -> StyledLine {
        let mut prefix = StyledLine::default();
        let bar = SpanStyle {
            dim: self.base.dim,
            ..SpanStyle::tone(Tone::Quote)
        };
        let last_item = self
            .stack
            .iter()
            .rposition(|c| matches!(c, Container::Item { .. }));
        for (i, c) in self.stack.iter().enumerate() {
            match c {
                Container::BlockQuote => prefix.push(QUOTE_BAR, bar),
                Container::Item { indent } => match (&self.marker, Some(i) == last_item, first) {
                    (Some(marker), true, true) => prefix.push(marker, self.base),
                    _ => prefix.push(&" ".repeat(*indent), self.base),
                },
                Container::CodeBlock => prefix.push(CODE_INDENT, self.base),
                _ => {}
            }
        }
        prefix
    }

    fn push_text(&mut self, text: &str, style: SpanStyle) {
        if let Some(cell) = self.cell_buf.as_mut() {
            cell.push_str(text);
        } else {
            self.current.push(text, style);
        }
    }

    /// Wrap the pending logical line under the current margin.
    fn flush(&mut self) {
        if self.current.spans.is_empty() {
            return;
        }
        let first = self.prefix(true);
        let rest = self.prefix(false);
        let avail = self.width.saturating_sub(first.width().max(rest.width()));
        let wrapped = wrap_spans(&std::mem::take(&mut self.current).spans, avail);
        for (i, body) in wrapped.into_iter().enumerate() {
            let mut line = if i == 0 { first.clone() } else { rest.clone() };
            line.spans.extend(body.spans);
            self.lines.push(line);
        }
        self.marker = None;
    }

    /// Separate blocks by one blank line (carrying quote bars).
    fn gap(&mut self) {
        self.flush();
        if self.lines.last().is_some_and(|l| !l.is_blank()) {
            let mut line = self.prefix(false);
            line.trim_end();
            self.lines.push(line);
        }
    }

    fn emit_code(&mut self, code: &str) {
        let style = SpanStyle {
            dim: self.base.dim,
            ..SpanStyle::tone(Tone::Code)
        };
        let prefix = self.prefix(false);
        let avail = self.width.saturating_sub(prefix.width());
        let code = code.strip_suffix('\n').unwrap_or(code);
        for src in code.split('\n') {
            for body in hard_wrap(src, style, avail) {
                let mut line = prefix.clone();
                line.spans.extend(body.spans);
                self.lines.push(line);
            }
        }
    }

    fn emit_table(&mut self) {
        let rows = std::mem::take(&mut self.table_rows);
        let cols = rows.iter().map(|(r, _)| r.len()).max().unwrap_or(0);
        let mut widths = vec![0usize; cols];
        for (row, _) in &rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.width());
            }
        }
        let sep = SpanStyle::tone(Tone::Muted);
        for (row, header) in &rows {
            let cell_style = SpanStyle {
                bold: *header,
                ..self.base
            };
            for (i, w) in widths.iter().enumerate() {
                if i > 0 {
                    self.current.push(" │ ", sep);
                }
                let cell = row.get(i).map_or("", String::as_str);
                self.current.push(cell, cell_style);
                // NBSP padding is never dropped at a wrap point.
                let pad = w - cell.width();
                if pad > 0 && i + 1 < cols {
                    self.current.push(&"\u{a0}".repeat(pad), cell_style);
                }
            }
            self.flush();
            if *header {
                let rule = widths
                    .iter()
                    .map(|w| "─".repeat(*w))
                    .collect::<Vec<_>>()
                    .join("─┼─");
                self.current.push(&rule, sep);
                self.flush();
            }
        }
    }

    fn pop_expect(&mut self, expected: &str) {
        if let Some(container) = self.stack.pop() {
            debug_assert!(
                matches!(
                    (&container, expected),
                    (Container::Heading(_), "Heading")
                        | (Container::Strong, "Strong")
                        | (Container::Emphasis, "Emphasis")
                        | (Container::Strikethrough, "Strikethrough")
                        | (Container::List { .. }, "List")
                        | (Container::Item { .. }, "Item")
                        | (Container::CodeBlock, "CodeBlock")
                        | (Container::Table, "Table")
                        | (Container::TableHead, "TableHead")
                        | (Container::TableRow, "TableRow")
                        | (Container::TableCell, "TableCell")
                ),
                "Expected {expected}, got {container:?}"
            );
        }
    }

    fn in_link(&self) -> bool {
        self.stack
            .iter()
            .any(|c| matches!(c, Container::Link { .. }))
    }

    fn finish(mut self) -> Vec<StyledLine> {
        self.flush();
        while self.lines.last().is_some_and(StyledLine::is_blank) {
            self.lines.pop();
        }
        if self.lines.is_empty() {
            self.lines.push(StyledLine::blank());
        }
        self.lines
    }
}

/// Render Markdown into lines no wider than `width` columns.
///
/// `base` is applied under every span (e.g. dimmed thought text). Empty
/// input yields a single blank line.
pub fn render_markdown(markdown: &str, width: usize, base: SpanStyle) -> Vec<StyledLine> {
    let start = Instant::now();
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(markdown, options);
    let mut b = LineBuilder::new(width, base);

    for event in parser {
        match event {
            // === Block-level Start tags ===
            Event::Start(Tag::Paragraph) => b.gap(),
            Event::Start(Tag::Heading { level, .. }) => {
                b.gap();
                b.stack.push(Container::Heading(level as usize));
            }
            Event::Start(Tag::BlockQuote(_)) => {
                b.gap();
                let depth = b
                    .stack
                    .iter()
                    .filter(|c| matches!(c, Container::BlockQuote | Container::BlockQuoteCapped))
                    .count();
                if depth < MAX_BLOCKQUOTE_DEPTH {
                    b.stack.push(Container::BlockQuote);
                } else {
                    b.stack.push(Container::BlockQuoteCapped);
                }
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                b.gap();
                if let CodeBlockKind::Fenced(lang) = &kind
                    && !lang.is_empty()
                {
                    b.current.push(lang, SpanStyle::tone(Tone::Muted));
                    b.flush();
                }
                b.code_buf = Some(String::new());
                b.stack.push(Container::CodeBlock);
            }
            Event::Start(Tag::List(start)) => {
                let nested = b.stack.iter().any(|c| matches!(c, Container::Item { .. }));
                if nested {
                    b.flush();
                } else {
                    b.gap();
                }
                b.stack.push(Container::List { next: start });
            }
            Event::Start(Tag::Item) => {
                b.flush();
                let marker = match b.stack.iter_mut().rev().find_map(|c| match c {
                    Container::List { next } => Some(next),
                    _ => None,
                }) {
                    Some(Some(n)) => {
                        let m = format!("{n}. ");
                        *n += 1;
                        m
                    }
                    _ => "• ".to_string(),
                };
                b.stack.push(Container::Item {
                    indent: marker.width(),
                });
                b.marker = Some(marker);
            }
            Event::Start(Tag::Table(_)) => {
                b.gap();
                b.table_rows.clear();
                b.stack.push(Container::Table);
            }
            Event::Start(Tag::TableHead) => {
                b.table_rows.push((Vec::new(), true));
                b.stack.push(Container::TableHead);
            }
            Event::Start(Tag::TableRow) => {
                b.table_rows.push((Vec::new(), false));
                b.stack.push(Container::TableRow);
            }
            Event::Start(Tag::TableCell) => {
                b.cell_buf = Some(String::new());
                b.stack.push(Container::TableCell);
            }

            // === Inline Start tags ===
            Event::Start(Tag::Strong) => b.stack.push(Container::Strong),
            Event::Start(Tag::Emphasis) => b.stack.push(Container::Emphasis),
            Event::Start(Tag::Strikethrough) => b.stack.push(Container::Strikethrough),
            Event::Start(Tag::Link { dest_url, .. }) => {
                let first_span = b.current.spans.len();
                b.stack.push(Container::Link {
                    url: dest_url.to_string(),
                    first_span,
                });
            }

            // === End tags ===
            Event::End(TagEnd::Paragraph) => b.flush(),
            Event::End(TagEnd::Heading(_)) => {
                b.flush();
                b.pop_expect("Heading");
            }
            Event::End(TagEnd::BlockQuote(_)) => {
                b.flush();
                match b.stack.pop() {
                    Some(Container::BlockQuote | Container::BlockQuoteCapped) => {}
                    other => {
                        debug_assert!(false, "expected BlockQuote/BlockQuoteCapped, got {other:?}");
                    }
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                let code = b.code_buf.take().unwrap_or_default();
                b.emit_code(&code);
                b.pop_expect("CodeBlock");
            }
            Event::End(TagEnd::List(_)) => {
                b.flush();
                b.pop_expect("List");
            }
            Event::End(TagEnd::Item) => {
                b.flush();
                if b.marker.is_some() {
                    // Empty item: still show its marker.
                    let mut line = b.prefix(true);
                    line.trim_end();
                    b.lines.push(line);
                    b.marker = None;
                }
                b.pop_expect("Item");
            }
            Event::End(TagEnd::Table) => {
                b.pop_expect("Table");
                b.emit_table();
            }
            Event::End(TagEnd::TableHead) => b.pop_expect("TableHead"),
            Event::End(TagEnd::TableRow) => b.pop_expect("TableRow"),
            Event::End(TagEnd::TableCell) => {
                if let Some(cell) = b.cell_buf.take()
                    && let Some((row, _)) = b.table_rows.last_mut()
                {
                    row.push(cell.trim().to_string());
                }
                b.pop_expect("TableCell");
            }
            Event::End(TagEnd::Strong) => b.pop_expect("Strong"),
            Event::End(TagEnd::Emphasis) => b.pop_expect("Emphasis"),
            Event::End(TagEnd::Strikethrough) => b.pop_expect("Strikethrough"),
            Event::End(TagEnd::Link) => match b.stack.pop() {
                Some(Container::Link { url, first_span }) => {
                    let text: String = b.current.spans[first_span.min(b.current.spans.len())..]
                        .iter()
                        .map(|s| s.text.as_str())
                        .collect();
                    if !url.is_empty() && text != url && !url.starts_with('#') {
                        b.push_text(&format!(" <{url}>"), SpanStyle::tone(Tone::Muted));
                    }
                }
                other => {
                    debug_assert!(false, "Expected Link, got {other:?}");
                }
            },

            // === Leaf events ===
            Event::Text(text) => {
                if let Some(code) = b.code_buf.as_mut() {
                    code.push_str(&text);
                } else if b.cell_buf.is_some() || b.in_link() {
                    let style = b.style();
                    b.push_text(&text, style);
                } else {
                    let style = b.style();
                    for (piece, is_url) in split_urls(&text) {
                        if is_url {
                            let url_style = SpanStyle {
                                tone: Tone::Link,
                                underline: true,
                                ..style
                            };
                            b.push_text(piece, url_style);
                        } else {
                            b.push_text(piece, style);
                        }
                    }
                }
            }
            Event::Code(code) => {
                let style = SpanStyle {
                    tone: Tone::Code,
                    ..b.style()
                };
                b.push_text(&code, style);
            }
            Event::SoftBreak => {
                let style = b.style();
                b.push_text(" ", style);
            }
            Event::HardBreak => b.flush(),
            Event::Rule => {
                b.gap();
                let prefix = b.prefix(false);
                let len = b.width.saturating_sub(prefix.width()).max(1);
                let mut line = prefix;
                line.push(&"─".repeat(len), SpanStyle::tone(Tone::Muted));
                b.lines.push(line);
            }
            Event::TaskListMarker(checked) => {
                let mark = if checked { "[x] " } else { "[ ] " };
                b.push_text(mark, SpanStyle::tone(Tone::Muted));
            }
            Event::Html(html) => {
                for src in html.lines().filter(|l| !l.trim().is_empty()) {
                    b.push_text(src, SpanStyle::tone(Tone::Muted));
                    b.flush();
                }
            }
            Event::InlineHtml(html) => b.push_text(&html, SpanStyle::tone(Tone::Muted)),
            _ => {}
        }
    }

    let lines = b.finish();
    trace!(
        "markdown: {} bytes -> {} line(s) at width {width} in {:.2}ms",
        markdown.len(),
        lines.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    lines
}
