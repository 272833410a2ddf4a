//! Input processing layer: key mapping and numeric prefix accumulator.
//!
//! Pure logic, no I/O. All functions are deterministic and testable.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

const MAX_COUNT: u32 = 999_999;

/// Accumulated numeric prefix for vim/less-style commands.
///
/// Users type digits then a command character: `12g` jumps to message 12,
/// `10j` scrolls 10 steps down.
pub(super) struct InputAccumulator {
    count: Option<u32>,
}

impl InputAccumulator {
    pub(super) fn new() -> Self {
        Self { count: None }
    }

    /// Feed a digit. Digits that would overflow are ignored.
    fn push_digit(&mut self, d: u32) -> bool {
        let new = self.count.unwrap_or(0).saturating_mul(10).saturating_add(d);
        if new > MAX_COUNT {
            return false;
        }
        self.count = Some(new);
        true
    }

    fn take(&mut self) -> Option<u32> {
        self.count.take()
    }

    pub(super) fn peek(&self) -> Option<u32> {
        self.count
    }

    pub(super) fn reset(&mut self) {
        self.count = None;
    }

    pub(super) fn is_active(&self) -> bool {
        self.count.is_some()
    }
}

/// Normal-mode actions.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Action {
    Quit,
    /// Esc: drop a pending count, or stop an in-flight request.
    Escape,
    /// A digit was accumulated; caller should redraw status bar.
    Digit,
    ScrollDown(u32),
    ScrollUp(u32),
    HalfPageDown(u32),
    HalfPageUp(u32),
    PageDown(u32),
    PageUp(u32),
    JumpToTop,
    JumpToBottom,
    JumpToMessage(u32),
    NextMessage(u32),
    PrevMessage(u32),
    EnterPrompt,
    EnterSearch,
    SearchNextMatch,
    SearchPrevMatch,
    TogglePanel,
    Yank,
}

/// Line-editor actions shared by the prompt and search bars.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum LineAction {
    Type(char),
    Backspace,
    Clear,
    Execute,
    Cancel,
}

fn count(acc: &mut InputAccumulator) -> u32 {
    acc.take().unwrap_or(1)
}

/// Map a key event to an `Action`, consuming/updating the accumulator as needed.
///
/// Returns `None` for unknown keys (caller should reset accumulator).
pub(super) fn map_key_event(key: KeyEvent, acc: &mut InputAccumulator) -> Option<Action> {
    let KeyEvent {
        code, modifiers, ..
    } = key;
    let ctrl = modifiers.contains(KeyModifiers::CONTROL);

    match code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('c') if ctrl => Some(Action::Quit),

        KeyCode::Esc => {
            acc.reset();
            Some(Action::Escape)
        }

        KeyCode::Char(c @ '0'..='9') if modifiers == KeyModifiers::NONE => {
            acc.push_digit(c as u32 - '0' as u32);
            Some(Action::Digit)
        }

        KeyCode::Char('f') if ctrl => Some(Action::PageDown(count(acc))),
        KeyCode::Char('b') if ctrl => Some(Action::PageUp(count(acc))),
        KeyCode::PageDown | KeyCode::Char(' ') => Some(Action::PageDown(count(acc))),
        KeyCode::PageUp => Some(Action::PageUp(count(acc))),

        KeyCode::Char('j') | KeyCode::Down => Some(Action::ScrollDown(count(acc))),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::ScrollUp(count(acc))),
        KeyCode::Char('d') => Some(Action::HalfPageDown(count(acc))),
        KeyCode::Char('u') => Some(Action::HalfPageUp(count(acc))),

        KeyCode::Char('g') | KeyCode::Home => match acc.take() {
            None => Some(Action::JumpToTop),
            Some(n) => Some(Action::JumpToMessage(n)),
        },
        KeyCode::Char('G') | KeyCode::End => match acc.take() {
            None => Some(Action::JumpToBottom),
            Some(n) => Some(Action::JumpToMessage(n)),
        },

        KeyCode::Char(']') => Some(Action::NextMessage(count(acc))),
        KeyCode::Char('[') => Some(Action::PrevMessage(count(acc))),

        KeyCode::Char('i') | KeyCode::Enter => {
            acc.reset();
            Some(Action::EnterPrompt)
        }
        KeyCode::Char('/') => {
            acc.reset();
            Some(Action::EnterSearch)
        }
        KeyCode::Char('n') => Some(Action::SearchNextMatch),
        KeyCode::Char('N') => Some(Action::SearchPrevMatch),

        KeyCode::Tab | KeyCode::Char('o') => Some(Action::TogglePanel),
        KeyCode::Char('y') => Some(Action::Yank),

        _ => None,
    }
}

/// Wheel scrolling maps onto single-step scrolls.
pub(super) fn map_mouse_event(event: MouseEvent) -> Option<Action> {
    match event.kind {
        MouseEventKind::ScrollDown => Some(Action::ScrollDown(1)),
        MouseEventKind::ScrollUp => Some(Action::ScrollUp(1)),
        _ => None,
    }
}

pub(super) fn map_line_key(key: KeyEvent) -> Option<LineAction> {
    let KeyEvent {
        code, modifiers, ..
    } = key;
    let ctrl = modifiers.contains(KeyModifiers::CONTROL);
    match code {
        KeyCode::Esc => Some(LineAction::Cancel),
        KeyCode::Char('c') if ctrl => Some(LineAction::Cancel),
        KeyCode::Char('u') if ctrl => Some(LineAction::Clear),
        KeyCode::Enter => Some(LineAction::Execute),
        KeyCode::Backspace => Some(LineAction::Backspace),
        KeyCode::Char(c) if !ctrl => Some(LineAction::Type(c)),
        _ => None,
    }
}
