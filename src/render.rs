//! Message rendering: one transcript entry to a measured block of lines.
//!
//! A rendered message is the "mounted node" of the virtual list. Its height
//! is its line count, which depends on the terminal width, so every width
//! change invalidates all measured heights.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use log::trace;
use unicode_width::UnicodeWidthStr;

use crate::markdown::{Span, SpanStyle, StyledLine, Tone, render_markdown, wrap_plain};
use crate::transcript::{ChatMessage, Sender};
use crate::virtual_list::Measured;

pub const THINKING_LABEL: &str = "Gemini Thinking";
pub const PANEL_LABEL: &str = "Explain the logic";
const ASSISTANT_LABEL: &str = "✦ Gemini";
const USER_LABEL: &str = "You";
const THOUGHT_BAR: &str = "┊ ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageNode {
    pub lines: Vec<StyledLine>,
}

impl Measured for MessageNode {
    fn height(&self) -> u32 {
        u32::try_from(self.lines.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderOptions {
    pub width: usize,
    /// A request is in flight (animates the placeholder).
    pub loading: bool,
    pub spinner_frame: usize,
    /// Thought panel expanded.
    pub expanded: bool,
}

pub fn render_message(msg: &ChatMessage, opts: &RenderOptions) -> MessageNode {
    let width = opts.width.max(1);
    let mut lines = match msg.sender {
        Sender::User => render_user(&msg.content, width),
        Sender::Ai => render_assistant(msg, width, opts),
    };
    lines.push(StyledLine::blank());
    MessageNode { lines }
}

fn right_align(mut line: StyledLine, width: usize) -> StyledLine {
    let pad = width.saturating_sub(line.width());
    if pad > 0 {
        line.spans.insert(
            0,
            Span {
                text: " ".repeat(pad),
                style: SpanStyle::default(),
            },
        );
    }
    line
}

fn render_user(content: &str, width: usize) -> Vec<StyledLine> {
    let header = SpanStyle {
        bold: true,
        ..SpanStyle::tone(Tone::User)
    };
    let body_width = (width * 3 / 4).max(width.min(20));
    let mut lines = vec![right_align(StyledLine::styled(USER_LABEL, header), width)];
    lines.extend(
        wrap_plain(content, body_width, SpanStyle::default())
            .into_iter()
            .map(|l| right_align(l, width)),
    );
    lines
}

fn render_assistant(msg: &ChatMessage, width: usize, opts: &RenderOptions) -> Vec<StyledLine> {
    let header = SpanStyle {
        bold: true,
        ..SpanStyle::tone(Tone::Assistant)
    };
    let muted = SpanStyle::tone(Tone::Muted);
    let mut lines = vec![StyledLine::styled(ASSISTANT_LABEL, header)];

    if msg.is_placeholder() {
        if opts.loading {
            let label = SpanStyle {
                italic: true,
                ..muted
            };
            let mut wrapped = wrap_plain(THINKING_LABEL, width, label);
            // Room for all three dots is checked so the frame never
            // changes the height.
            let dots = ".".repeat(opts.spinner_frame % 4);
            match wrapped.last_mut() {
                Some(last) if last.width() + 3 <= width => last.push(&dots, muted),
                _ => wrapped.push(StyledLine::styled(dots, muted)),
            }
            lines.extend(wrapped);
        } else {
            lines.push(StyledLine::styled("(no reply)", muted));
        }
        return lines;
    }

    if let Some(thought) = msg.thought.as_deref() {
        let arrow = if opts.expanded { "▾ " } else { "▸ " };
        lines.push(StyledLine::styled(format!("{arrow}{PANEL_LABEL}"), muted));
        if opts.expanded {
            let base = SpanStyle {
                dim: true,
                ..SpanStyle::tone(Tone::Thought)
            };
            let inner = width.saturating_sub(THOUGHT_BAR.width());
            for body in render_markdown(thought, inner, base) {
                let mut line = StyledLine::styled(THOUGHT_BAR, base);
                line.spans.extend(body.spans);
                lines.push(line);
            }
        }
    }
    lines.extend(render_markdown(&msg.content, width, SpanStyle::default()));
    lines
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeKey {
    content: u64,
    opts: RenderOptions,
}

fn content_hash(msg: &ChatMessage) -> u64 {
    let mut h = DefaultHasher::new();
    msg.content.hash(&mut h);
    msg.thought.hash(&mut h);
    h.finish()
}

/// Rendered lines per message id, reused while content and options are
/// unchanged.
#[derive(Default)]
pub struct RenderCache {
    entries: HashMap<String, (NodeKey, MessageNode)>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, msg: &ChatMessage, opts: &RenderOptions) -> MessageNode {
        let opts = RenderOptions {
            // Only a loading placeholder animates.
            spinner_frame: if msg.is_placeholder() && opts.loading {
                opts.spinner_frame % 4
            } else {
                0
            },
            ..*opts
        };
        let key = NodeKey {
            content: content_hash(msg),
            opts,
        };
        if let Some((cached, node)) = self.entries.get(&msg.id)
            && *cached == key
        {
            return node.clone();
        }
        trace!("render: message {} at width {}", msg.id, opts.width);
        let node = render_message(msg, &opts);
        self.entries.insert(msg.id.clone(), (key, node.clone()));
        node
    }

    /// Drop entries for messages no longer in the transcript.
    pub fn retain(&mut self, messages: &[ChatMessage]) {
        if self.entries.len() <= messages.len() {
            return;
        }
        let live: std::collections::HashSet<&str> =
            messages.iter().map(|m| m.id.as_str()).collect();
        self.entries.retain(|id, _| live.contains(id.as_str()));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(width: usize) -> RenderOptions {
        RenderOptions {
            width,
            loading: false,
            spinner_frame: 0,
            expanded: false,
        }
    }

    fn texts(node: &MessageNode) -> Vec<String> {
        node.lines.iter().map(StyledLine::text).collect()
    }

    #[test]
    fn user_message_is_right_aligned() {
        let node = render_message(&ChatMessage::user("hello"), &opts(20));
        let lines = texts(&node);
        assert_eq!(lines[0], format!("{}You", " ".repeat(17)));
        assert_eq!(lines[1], format!("{}hello", " ".repeat(15)));
        assert_eq!(lines[2], "");
        assert_eq!(node.height(), 3);
    }

    #[test]
    fn placeholder_height_is_stable_across_frames() {
        let msg = ChatMessage::placeholder();
        let heights: Vec<u32> = (0..8)
            .map(|frame| {
                let o = RenderOptions {
                    loading: true,
                    spinner_frame: frame,
                    ..opts(30)
                };
                let node = render_message(&msg, &o);
                assert!(texts(&node)[1].starts_with(THINKING_LABEL));
                node.height()
            })
            .collect();
        assert!(heights.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn idle_placeholder_has_no_spinner() {
        let node = render_message(&ChatMessage::placeholder(), &opts(30));
        assert_eq!(texts(&node)[1], "(no reply)");
    }

    #[test]
    fn thought_panel_toggles_height() {
        let msg = ChatMessage::ai("answer", Some("line one\n\nline two".into()));
        let collapsed = render_message(&msg, &opts(40));
        assert_eq!(
            texts(&collapsed),
            vec!["✦ Gemini", "▸ Explain the logic", "answer", ""]
        );
        let expanded = render_message(
            &msg,
            &RenderOptions {
                expanded: true,
                ..opts(40)
            },
        );
        let lines = texts(&expanded);
        assert_eq!(lines[1], "▾ Explain the logic");
        assert_eq!(lines[2], "┊ line one");
        assert!(expanded.height() > collapsed.height());
    }

    #[test]
    fn no_panel_without_thought() {
        let node = render_message(&ChatMessage::ai("hi", None), &opts(40));
        assert!(!texts(&node).iter().any(|l| l.contains(PANEL_LABEL)));
    }

    #[test]
    fn narrower_width_is_taller() {
        let msg = ChatMessage::ai("word ".repeat(40), None);
        let wide = render_message(&msg, &opts(80)).height();
        let narrow = render_message(&msg, &opts(20)).height();
        assert!(narrow > wide);
    }

    #[test]
    fn cache_reuses_and_invalidates() {
        let mut cache = RenderCache::new();
        let mut msg = ChatMessage::placeholder();
        let o = RenderOptions {
            loading: true,
            ..opts(30)
        };
        let first = cache.render(&msg, &o);
        assert_eq!(cache.render(&msg, &o), first);

        msg.content = "done".into();
        let resolved = cache.render(&msg, &o);
        assert_ne!(resolved, first);
        assert_eq!(cache.len(), 1);

        cache.retain(&[]);
        assert!(cache.is_empty());
    }
}
