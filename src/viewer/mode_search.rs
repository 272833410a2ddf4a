//! Search mode: incremental regex search over message text.

use std::io;

use regex::RegexBuilder;

use super::input::LineAction;
use super::state::Layout;
use super::terminal;
use super::{Effect, ViewerMode};
use crate::transcript::ChatMessage;

/// First match within one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SearchMatch {
    /// Message index.
    pub index: usize,
    /// 1-based line within the message source.
    pub line: usize,
}

/// Mutable search state while in search mode.
pub(super) struct SearchState {
    pub query: String,
    pub matches: Vec<SearchMatch>,
    pub pattern_valid: bool,
}

impl SearchState {
    pub(super) fn new() -> Self {
        Self {
            query: String::new(),
            matches: Vec::new(),
            pattern_valid: true,
        }
    }

    fn note(&self) -> String {
        if !self.pattern_valid {
            "invalid pattern".into()
        } else if self.query.is_empty() {
            String::new()
        } else {
            format!("{} match(es)", self.matches.len())
        }
    }
}

/// Persisted search results for n/N navigation in normal mode.
pub(super) struct LastSearch {
    pub matches: Vec<SearchMatch>,
    pub current_idx: usize,
}

impl LastSearch {
    /// Start at the first match at or after `from`, wrapping to the top.
    pub(super) fn new(matches: Vec<SearchMatch>, from: usize) -> Self {
        let current_idx = matches.iter().position(|m| m.index >= from).unwrap_or(0);
        Self {
            matches,
            current_idx,
        }
    }

    /// Advance to the next match. Wraps around.
    pub(super) fn advance_next(&mut self) {
        if !self.matches.is_empty() {
            self.current_idx = (self.current_idx + 1) % self.matches.len();
        }
    }

    /// Advance to the previous match. Wraps around.
    pub(super) fn advance_prev(&mut self) {
        if !self.matches.is_empty() {
            self.current_idx = self
                .current_idx
                .checked_sub(1)
                .unwrap_or(self.matches.len() - 1);
        }
    }

    pub(super) fn current_message(&self) -> Option<usize> {
        self.matches.get(self.current_idx).map(|m| m.index)
    }

    /// Status text for the current match.
    pub(super) fn describe(&self) -> String {
        match self.matches.get(self.current_idx) {
            Some(m) => format!(
                "match {}/{} (message {}, line {})",
                self.current_idx + 1,
                self.matches.len(),
                m.index + 1,
                m.line
            ),
            None => "no match".into(),
        }
    }
}

/// Search message text for `query` as a regular expression.
///
/// Uses smartcase: if `query` is all lowercase, search is case-insensitive;
/// otherwise it's case-sensitive. Thought summaries are not searched.
///
/// Returns `(matches, pattern_valid)`.
pub(super) fn grep_messages(query: &str, messages: &[ChatMessage]) -> (Vec<SearchMatch>, bool) {
    if query.is_empty() {
        return (Vec::new(), true);
    }
    let smartcase = query.chars().all(|c| !c.is_uppercase());
    let re = match RegexBuilder::new(query).case_insensitive(smartcase).build() {
        Ok(re) => re,
        Err(_) => return (Vec::new(), false),
    };

    let matches = messages
        .iter()
        .enumerate()
        .filter_map(|(index, msg)| {
            msg.content
                .lines()
                .position(|text| re.is_match(text))
                .map(|i| SearchMatch { index, line: i + 1 })
        })
        .collect();
    (matches, true)
}

pub(super) struct SearchCtx<'a> {
    pub messages: &'a [ChatMessage],
    pub focused: Option<usize>,
    pub layout: &'a Layout,
}

pub(super) fn handle(
    action: LineAction,
    ss: &mut SearchState,
    ctx: &SearchCtx,
) -> io::Result<Vec<Effect>> {
    match action {
        LineAction::Type(c) => {
            ss.query.push(c);
            regrep_and_redraw(ss, ctx)
        }
        LineAction::Backspace => {
            if ss.query.pop().is_none() {
                // Empty input + Backspace → cancel (vim behavior)
                return Ok(vec![Effect::SetMode(ViewerMode::Normal)]);
            }
            regrep_and_redraw(ss, ctx)
        }
        LineAction::Clear => {
            ss.query.clear();
            regrep_and_redraw(ss, ctx)
        }
        LineAction::Execute => {
            if ss.matches.is_empty() {
                let mut effects = vec![Effect::SetMode(ViewerMode::Normal)];
                if !ss.query.is_empty() {
                    effects.push(Effect::Flash(format!("Pattern not found: {}", ss.query)));
                }
                return Ok(effects);
            }
            let last = LastSearch::new(std::mem::take(&mut ss.matches), ctx.focused.unwrap_or(0));
            let mut effects = vec![Effect::SetMode(ViewerMode::Normal)];
            if let Some(idx) = last.current_message() {
                effects.push(Effect::ScrollToMessage(idx));
                effects.push(Effect::Flash(last.describe()));
            }
            effects.push(Effect::SetLastSearch(last));
            Ok(effects)
        }
        LineAction::Cancel => Ok(vec![Effect::SetMode(ViewerMode::Normal)]),
    }
}

fn regrep_and_redraw(ss: &mut SearchState, ctx: &SearchCtx) -> io::Result<Vec<Effect>> {
    let (matches, valid) = grep_messages(&ss.query, ctx.messages);
    ss.matches = matches;
    ss.pattern_valid = valid;
    terminal::draw_input_bar(ctx.layout, "/", &ss.query, Some(&ss.note()))?;
    Ok(vec![])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(texts: &[&str]) -> Vec<ChatMessage> {
        texts.iter().map(|t| ChatMessage::ai(*t, None)).collect()
    }

    #[test]
    fn regex_heading_pattern() {
        let msgs = messages(&["# Title\nsome text", "no heading", "intro\n## Subtitle"]);
        let (matches, valid) = grep_messages("^#", &msgs);
        assert!(valid);
        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].index, matches[0].line), (0, 1));
        assert_eq!((matches[1].index, matches[1].line), (2, 2));
    }

    #[test]
    fn smartcase_all_lower_is_insensitive() {
        let msgs = messages(&["Hello World", "hello world", "HELLO"]);
        let (matches, _) = grep_messages("hello", &msgs);
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn smartcase_upper_is_sensitive() {
        let msgs = messages(&["Hello World", "hello world", "HELLO"]);
        let (matches, _) = grep_messages("Hello", &msgs);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index, 0);
    }

    #[test]
    fn one_match_per_message() {
        let msgs = messages(&["bar\nqux foo\nfoo"]);
        let (matches, _) = grep_messages("foo", &msgs);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line, 2);
    }

    #[test]
    fn invalid_pattern_returns_empty() {
        let msgs = messages(&["some [text] here"]);
        let (matches, valid) = grep_messages("[", &msgs);
        assert!(!valid);
        assert!(matches.is_empty());
    }

    #[test]
    fn empty_query_returns_empty() {
        let (matches, valid) = grep_messages("", &messages(&["anything"]));
        assert!(valid);
        assert!(matches.is_empty());
    }

    #[test]
    fn last_search_starts_at_focus_and_wraps() {
        let msgs = messages(&["x", "y", "x", "y", "x"]);
        let (matches, _) = grep_messages("x", &msgs);
        let mut ls = LastSearch::new(matches, 1);
        assert_eq!(ls.current_message(), Some(2));
        ls.advance_next();
        assert_eq!(ls.current_message(), Some(4));
        ls.advance_next();
        assert_eq!(ls.current_message(), Some(0));
        ls.advance_prev();
        assert_eq!(ls.current_message(), Some(4));
    }

    #[test]
    fn last_search_past_end_wraps_to_first() {
        let msgs = messages(&["x", "y"]);
        let (matches, _) = grep_messages("x", &msgs);
        let ls = LastSearch::new(matches, 1);
        assert_eq!(ls.current_message(), Some(0));
        assert_eq!(ls.describe(), "match 1/1 (message 1, line 1)");
    }
}
