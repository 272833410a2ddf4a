//! Terminal I/O layer: raw mode, transcript painting, bars, OSC 52.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use crossterm::{
    ExecutableCommand, QueueableCommand, cursor, event,
    style::{self, Attribute, Color, ContentStyle, Stylize},
    terminal,
};
use std::io::{self, Write, stdout};
use unicode_width::UnicodeWidthChar;

use super::state::{GUTTER_COLS, Layout};
use crate::markdown::{SpanStyle, Tone};
use crate::render::MessageNode;
use crate::virtual_list::surface::{SurfaceRow, is_faded, scrollbar_thumb};
use crate::virtual_list::{MountRegistry, Window};

// ---------------------------------------------------------------------------
// RawGuard: restores raw mode / alternate screen / mouse capture on drop
// ---------------------------------------------------------------------------

pub(super) struct RawGuard {
    cleaned: bool,
}

impl RawGuard {
    pub(super) fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        stdout().execute(terminal::EnterAlternateScreen)?;
        stdout().execute(cursor::Hide)?;
        stdout().execute(event::EnableMouseCapture)?;
        Ok(Self { cleaned: false })
    }

    pub(super) fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        let mut out = stdout();
        let _ = out.execute(event::DisableMouseCapture);
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

pub(super) fn check_tty() -> anyhow::Result<()> {
    use std::io::IsTerminal;
    if !io::stdout().is_terminal() {
        anyhow::bail!(
            "chatview requires an interactive terminal.\n\
             \n\
             To print the transcript instead, use: chatview history\n\
             To ask a one-off question, use: chatview ask <PROMPT>"
        );
    }
    Ok(())
}

pub(super) fn clear_screen() -> io::Result<()> {
    let mut out = stdout();
    out.queue(terminal::Clear(terminal::ClearType::All))?;
    out.flush()
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

fn tone_color(tone: Tone) -> Option<Color> {
    match tone {
        Tone::Plain => None,
        Tone::Heading => Some(Color::Cyan),
        Tone::Code => Some(Color::Yellow),
        Tone::Link => Some(Color::Blue),
        Tone::Quote => Some(Color::Green),
        Tone::Muted => Some(Color::DarkGrey),
        Tone::User => Some(Color::Magenta),
        Tone::Assistant => Some(Color::Cyan),
        Tone::Thought => Some(Color::Grey),
    }
}

fn content_style(span: SpanStyle, faded: bool) -> ContentStyle {
    let mut cs = ContentStyle::new();
    cs.foreground_color = if faded {
        Some(Color::DarkGrey)
    } else {
        tone_color(span.tone)
    };
    for (on, attr) in [
        (span.bold, Attribute::Bold),
        (span.italic, Attribute::Italic),
        (span.underline, Attribute::Underlined),
        (span.strike, Attribute::CrossedOut),
        (span.dim || faded, Attribute::Dim),
    ] {
        if on {
            cs.attributes.set(attr);
        }
    }
    cs
}

/// Longest prefix of `text` that fits in `cols` display columns.
fn clip(text: &str, cols: usize) -> (&str, usize) {
    let mut used = 0;
    for (i, c) in text.char_indices() {
        let w = c.width().unwrap_or(0);
        if used + w > cols {
            return (&text[..i], used);
        }
        used += w;
    }
    (text, used)
}

/// Paint the transcript viewport plus its scrollbar.
///
/// `rows` comes from `surface::compose` and has one entry per viewport row;
/// padding and blank rows are cleared.
pub(super) fn draw_transcript(
    layout: &Layout,
    rows: &[SurfaceRow],
    registry: &MountRegistry<MessageNode>,
    window: &Window,
    focused: Option<usize>,
    fade_rows: u32,
) -> io::Result<()> {
    let mut out = stdout();
    let viewport = u32::from(layout.list_rows);
    let thumb = scrollbar_thumb(window.total_height, viewport, window.scroll_top);

    for (row, surface) in rows.iter().take(layout.list_rows as usize).enumerate() {
        let y = row as u16;
        out.queue(cursor::MoveTo(0, y))?;
        out.queue(terminal::Clear(terminal::ClearType::UntilNewLine))?;

        if let SurfaceRow::Line { index, line } = *surface {
            let gutter = if focused == Some(index) { "▌ " } else { "  " };
            out.queue(style::PrintStyledContent(gutter.dark_grey()))?;

            let faded = is_faded(row as u32, viewport, fade_rows);
            let styled = registry
                .get(index)
                .and_then(|node| node.lines.get(line as usize));
            if let Some(styled) = styled {
                out.queue(cursor::MoveTo(GUTTER_COLS, y))?;
                let mut room = layout.content_cols as usize;
                for span in &styled.spans {
                    if room == 0 {
                        break;
                    }
                    let (text, used) = clip(&span.text, room);
                    room -= used;
                    let cs = content_style(span.style, faded);
                    out.queue(style::PrintStyledContent(cs.apply(text)))?;
                }
            }
        }

        out.queue(cursor::MoveTo(layout.scrollbar_col, y))?;
        let in_thumb = thumb.is_some_and(|(start, len)| {
            let r = row as u32;
            r >= start && r < start + len
        });
        match (thumb, in_thumb) {
            (None, _) => write!(out, " ")?,
            (Some(_), true) => write!(out, "{}", "█".grey())?,
            (Some(_), false) => write!(out, "{}", "│".dark_grey())?,
        }
    }
    out.flush()
}

// ---------------------------------------------------------------------------
// Bars
// ---------------------------------------------------------------------------

fn pad_to(text: &str, cols: usize) -> String {
    let (clipped, used) = clip(text, cols);
    format!("{clipped}{}", " ".repeat(cols - used))
}

/// Draw the line editor (`> ` prompt or `/` search) on the input row.
pub(super) fn draw_input_bar(
    layout: &Layout,
    prefix: &str,
    input: &str,
    note: Option<&str>,
) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.input_row))?;
    let cols = layout.term_cols as usize;
    let mut text = format!("{prefix}{input}_");
    if let Some(note) = note.filter(|n| !n.is_empty()) {
        text.push_str(&format!("  [{note}]"));
    }
    write!(out, "{}", pad_to(&text, cols).on_dark_grey().white())?;
    out.queue(style::ResetColor)?;
    out.flush()
}

/// Idle input row in normal mode.
pub(super) fn draw_hint_bar(layout: &Layout, hint: &str) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.input_row))?;
    write!(out, "{}", pad_to(hint, layout.term_cols as usize).dark_grey())?;
    out.queue(style::ResetColor)?;
    out.flush()
}

/// Everything the status bar shows.
pub(super) struct StatusLine<'a> {
    pub label: &'a str,
    pub model: &'a str,
    pub focused: Option<usize>,
    pub total: usize,
    pub percent: u32,
    pub loading: bool,
    pub error: Option<&'a str>,
    pub acc_peek: Option<u32>,
    /// One-shot message (cleared on next key press).
    pub flash: Option<&'a str>,
}

pub(super) fn draw_status_bar(layout: &Layout, status: &StatusLine) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.status_row))?;

    let position = match status.focused {
        Some(i) => format!("{}/{}", i + 1, status.total),
        None => format!("-/{}", status.total),
    };
    let middle = if let Some(msg) = status.flash {
        msg.to_string()
    } else if let Some(n) = status.acc_peek {
        format!(":{n}_")
    } else if status.loading {
        format!("{} is thinking... (Esc to stop)", status.model)
    } else if let Some(err) = status.error {
        format!("error: {err}")
    } else {
        "[i:ask /:search n/N:match Tab:reasoning y:yank j/k d/u q:quit]".to_string()
    };
    let text = format!(
        " {} | {} | {}  {}%",
        status.label, middle, position, status.percent
    );

    let padded = pad_to(&text, layout.term_cols as usize);
    if status.error.is_some() && status.flash.is_none() && !status.loading {
        write!(out, "{}", padded.on_dark_red().white())?;
    } else {
        write!(out, "{}", padded.on_dark_grey().white())?;
    }
    out.queue(style::ResetColor)?;
    out.flush()
}

/// Send text to the system clipboard via OSC 52.
pub(super) fn send_osc52(text: &str) -> io::Result<()> {
    let encoded = BASE64.encode(text.as_bytes());
    let mut out = stdout();
    write!(out, "\x1b]52;c;{encoded}\x1b\\")?;
    out.flush()
}
