//! Prompt mode handler (`>` input bar).

use std::io;

use super::input::LineAction;
use super::state::Layout;
use super::terminal;
use super::{Effect, ViewerMode};

/// Mutable state for prompt mode.
pub(super) struct PromptState {
    pub input: String,
}

impl PromptState {
    pub(super) fn new() -> Self {
        Self {
            input: String::new(),
        }
    }
}

pub(super) fn handle(
    action: LineAction,
    ps: &mut PromptState,
    layout: &Layout,
) -> io::Result<Vec<Effect>> {
    match action {
        LineAction::Type(c) => {
            ps.input.push(c);
            terminal::draw_input_bar(layout, "> ", &ps.input, None)?;
            Ok(vec![])
        }
        LineAction::Backspace => {
            ps.input.pop();
            terminal::draw_input_bar(layout, "> ", &ps.input, None)?;
            Ok(vec![])
        }
        LineAction::Clear => {
            ps.input.clear();
            terminal::draw_input_bar(layout, "> ", &ps.input, None)?;
            Ok(vec![])
        }
        LineAction::Execute => {
            let prompt = ps.input.trim().to_string();
            if prompt.is_empty() {
                return Ok(vec![Effect::SetMode(ViewerMode::Normal)]);
            }
            Ok(vec![
                Effect::SetMode(ViewerMode::Normal),
                Effect::Submit(prompt),
            ])
        }
        LineAction::Cancel => Ok(vec![Effect::SetMode(ViewerMode::Normal)]),
    }
}
