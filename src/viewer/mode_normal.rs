//! Normal mode handler: scrolling, jumping, yanking, mode transitions.

use log::debug;

use super::input::Action;
use super::mode_prompt::PromptState;
use super::mode_search::{LastSearch, SearchState};
use super::{Effect, ViewerMode};
use crate::transcript::ChatMessage;

pub(super) struct NormalCtx<'a> {
    pub messages: &'a [ChatMessage],
    pub focused: Option<usize>,
    pub scroll_step: u32,
    pub list_rows: u32,
    pub loading: bool,
    pub last_search: &'a mut Option<LastSearch>,
}

fn rows(count: u32, step: u32) -> i64 {
    i64::from(count) * i64::from(step)
}

pub(super) fn handle(action: Action, ctx: &mut NormalCtx) -> Vec<Effect> {
    let half_page = (ctx.list_rows / 2).max(1);
    let page = ctx.list_rows.saturating_sub(1).max(1);

    match action {
        Action::Quit => vec![Effect::Quit],

        Action::Escape if ctx.loading => vec![Effect::Stop],
        Action::Escape | Action::Digit => vec![],

        Action::ScrollDown(n) => vec![Effect::ScrollBy(rows(n, ctx.scroll_step))],
        Action::ScrollUp(n) => vec![Effect::ScrollBy(-rows(n, ctx.scroll_step))],
        Action::HalfPageDown(n) => vec![Effect::ScrollBy(rows(n, half_page))],
        Action::HalfPageUp(n) => vec![Effect::ScrollBy(-rows(n, half_page))],
        Action::PageDown(n) => vec![Effect::ScrollBy(rows(n, page))],
        Action::PageUp(n) => vec![Effect::ScrollBy(-rows(n, page))],

        Action::JumpToTop => vec![Effect::ScrollTo(0)],
        Action::JumpToBottom => vec![Effect::ScrollToBottom],
        Action::JumpToMessage(n) => {
            let len = ctx.messages.len();
            if n == 0 || n as usize > len {
                vec![Effect::Flash(format!("Message {n} out of range (max {len})"))]
            } else {
                debug!("jump to message {n}");
                vec![Effect::ScrollToMessage(n as usize - 1)]
            }
        }
        Action::NextMessage(n) => match ctx.focused {
            Some(f) if !ctx.messages.is_empty() => {
                let target = (f + n as usize).min(ctx.messages.len() - 1);
                vec![Effect::ScrollToMessage(target)]
            }
            _ => vec![],
        },
        Action::PrevMessage(n) => match ctx.focused {
            Some(f) => vec![Effect::ScrollToMessage(f.saturating_sub(n as usize))],
            None => vec![],
        },

        Action::EnterPrompt => {
            if ctx.loading {
                vec![Effect::Flash("Waiting for a reply (Esc to stop)".into())]
            } else {
                vec![Effect::SetMode(ViewerMode::Prompt(PromptState::new()))]
            }
        }
        Action::EnterSearch => vec![Effect::SetMode(ViewerMode::Search(SearchState::new()))],

        Action::SearchNextMatch | Action::SearchPrevMatch => {
            let Some(ls) = ctx.last_search.as_mut() else {
                return vec![Effect::Flash("No search results".into())];
            };
            if action == Action::SearchNextMatch {
                ls.advance_next();
            } else {
                ls.advance_prev();
            }
            match ls.current_message() {
                Some(idx) => vec![Effect::ScrollToMessage(idx), Effect::Flash(ls.describe())],
                None => vec![],
            }
        }

        Action::TogglePanel => match ctx.focused.and_then(|i| ctx.messages.get(i).map(|m| (i, m))) {
            Some((i, msg)) if msg.thought.is_some() => vec![Effect::TogglePanel(i)],
            Some(_) => vec![Effect::Flash("No reasoning for this message".into())],
            None => vec![],
        },

        Action::Yank => match ctx.focused.and_then(|i| ctx.messages.get(i).map(|m| (i, m))) {
            Some((_, msg)) if msg.is_placeholder() => {
                vec![Effect::Flash("Nothing to yank yet".into())]
            }
            Some((i, msg)) => {
                let lines = msg.content.lines().count();
                debug!("yank message {}: {} bytes", i + 1, msg.content.len());
                vec![
                    Effect::Yank(msg.content.clone()),
                    Effect::Flash(format!(
                        "Yanked message {} ({lines} line{})",
                        i + 1,
                        if lines == 1 { "" } else { "s" }
                    )),
                ]
            }
            None => vec![],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("first"),
            ChatMessage::ai("one\ntwo", Some("why".into())),
            ChatMessage::user("second"),
            ChatMessage::ai("plain", None),
        ]
    }

    fn run(action: Action, focused: Option<usize>, loading: bool) -> Vec<Effect> {
        let msgs = messages();
        let mut last = None;
        let mut ctx = NormalCtx {
            messages: &msgs,
            focused,
            scroll_step: 3,
            list_rows: 20,
            loading,
            last_search: &mut last,
        };
        handle(action, &mut ctx)
    }

    #[test]
    fn scroll_steps_scale_with_count() {
        assert!(matches!(run(Action::ScrollDown(2), None, false)[..], [Effect::ScrollBy(6)]));
        assert!(matches!(run(Action::HalfPageUp(1), None, false)[..], [Effect::ScrollBy(-10)]));
        assert!(matches!(run(Action::PageDown(1), None, false)[..], [Effect::ScrollBy(19)]));
    }

    #[test]
    fn escape_stops_only_while_loading() {
        assert!(matches!(run(Action::Escape, None, true)[..], [Effect::Stop]));
        assert!(run(Action::Escape, None, false).is_empty());
    }

    #[test]
    fn jump_to_message_is_one_based() {
        assert!(matches!(
            run(Action::JumpToMessage(2), None, false)[..],
            [Effect::ScrollToMessage(1)]
        ));
        assert!(matches!(
            run(Action::JumpToMessage(9), None, false)[..],
            [Effect::Flash(_)]
        ));
    }

    #[test]
    fn next_message_clamps() {
        assert!(matches!(
            run(Action::NextMessage(10), Some(1), false)[..],
            [Effect::ScrollToMessage(3)]
        ));
        assert!(matches!(
            run(Action::PrevMessage(10), Some(1), false)[..],
            [Effect::ScrollToMessage(0)]
        ));
    }

    #[test]
    fn toggle_requires_thought() {
        assert!(matches!(
            run(Action::TogglePanel, Some(1), false)[..],
            [Effect::TogglePanel(1)]
        ));
        assert!(matches!(run(Action::TogglePanel, Some(3), false)[..], [Effect::Flash(_)]));
    }

    #[test]
    fn yank_copies_focused_content() {
        let effects = run(Action::Yank, Some(1), false);
        match &effects[..] {
            [Effect::Yank(text), Effect::Flash(msg)] => {
                assert_eq!(text, "one\ntwo");
                assert_eq!(msg, "Yanked message 2 (2 lines)");
            }
            _ => panic!("unexpected effects"),
        }
    }

    #[test]
    fn prompt_blocked_while_loading() {
        assert!(matches!(
            run(Action::EnterPrompt, None, false)[..],
            [Effect::SetMode(ViewerMode::Prompt(_))]
        ));
        assert!(matches!(run(Action::EnterPrompt, None, true)[..], [Effect::Flash(_)]));
    }

    #[test]
    fn search_next_without_results() {
        assert!(matches!(
            run(Action::SearchNextMatch, None, false)[..],
            [Effect::Flash(_)]
        ));
    }
}
