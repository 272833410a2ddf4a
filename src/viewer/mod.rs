//! Terminal chat viewer.
//!
//! Layout:
//!   col 0..2            : focus gutter
//!   col 2..cols-1       : transcript viewport (virtualized, wrapped text)
//!   col cols-1          : scrollbar
//!   row term_rows-2     : prompt / search input bar
//!   row term_rows-1     : status bar
//!
//! Only the messages in the virtual list's window are rendered. Every frame
//! runs one `layout` cycle: mount the window, render the mounted messages,
//! measure their line counts and let the list correct its scroll position
//! before anything is painted.
//!
//! Requests run on a worker thread. The worker writes its result into the
//! shared `ChatState`; the event loop is woken by the store notification (or
//! the next spinner tick) and folds the reply into the transcript.

mod input;
mod mode_normal;
mod mode_prompt;
mod mode_search;
mod state;
mod terminal;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::terminal as crossterm_terminal;
use log::{debug, info, warn};

use crate::config::{Config, ViewerConfig};
use crate::llm::{self, CancelToken, LlmClient};
use crate::render::{MessageNode, RenderCache, RenderOptions};
use crate::store::{ChatState, Shared};
use crate::transcript::{self, Transcript};
use crate::virtual_list::surface::compose;
use crate::virtual_list::{ListConfig, MountRegistry, VirtualList, Window};
use crate::watch::TranscriptWatcher;

use input::{InputAccumulator, map_key_event, map_line_key, map_mouse_event};
use mode_normal::NormalCtx;
use mode_prompt::PromptState;
use mode_search::{LastSearch, SearchCtx, SearchState};
use state::{Layout, compute_layout, focused_index, scroll_percent};

const IDLE_POLL: Duration = Duration::from_secs(86400);

/// Side effects requested by the mode handlers, applied by the event loop.
pub(super) enum Effect {
    ScrollBy(i64),
    ScrollTo(u32),
    ScrollToBottom,
    ScrollToMessage(usize),
    SetMode(ViewerMode),
    SetLastSearch(LastSearch),
    Flash(String),
    Submit(String),
    Stop,
    TogglePanel(usize),
    Yank(String),
    Quit,
}

pub(super) enum ViewerMode {
    Normal,
    Prompt(PromptState),
    Search(SearchState),
}

/// Everything the viewer needs from the command line.
pub struct Session {
    pub transcript_path: PathBuf,
    pub config: Config,
    pub client: Arc<dyn LlmClient>,
    pub watch: bool,
}

/// Run the terminal viewer until the user quits.
pub fn run(session: Session) -> anyhow::Result<()> {
    terminal::check_tty()?;

    let transcript = transcript::load(&session.transcript_path)?;
    info!(
        "viewer: {} message(s) from {}",
        transcript.len(),
        session.transcript_path.display()
    );

    let (cols, rows) = crossterm_terminal::size().context("failed to get terminal size")?;
    let mut viewer = Viewer::new(session, transcript, cols, rows)?;

    let mut guard = terminal::RawGuard::enter()?;
    let result = viewer.event_loop();
    viewer.shutdown();
    guard.cleanup();
    result
}

struct Viewer {
    path: PathBuf,
    label: String,
    model: String,
    settings: ViewerConfig,
    fade_rows: u32,
    client: Arc<dyn LlmClient>,

    transcript: Transcript,
    list: VirtualList,
    registry: MountRegistry<MessageNode>,
    cache: RenderCache,
    layout: Layout,
    /// Ids of messages whose reasoning panel is open.
    expanded: HashSet<String>,
    /// Message to settle at the viewport top on the next frame.
    jump_target: Option<usize>,

    mode: ViewerMode,
    acc: InputAccumulator,
    flash: Option<String>,
    last_search: Option<LastSearch>,
    error: Option<String>,

    store: Shared<ChatState>,
    notify_rx: mpsc::Receiver<()>,
    cancel: Option<CancelToken>,
    spinner_frame: usize,
    last_spinner: Instant,

    watch: bool,
    watcher: Option<TranscriptWatcher>,

    dirty: bool,
    last_render: Instant,
}

impl Viewer {
    fn new(session: Session, transcript: Transcript, cols: u16, rows: u16) -> anyhow::Result<Self> {
        let Session {
            transcript_path,
            config,
            client,
            watch,
        } = session;
        let layout = compute_layout(cols, rows);
        let list_config = ListConfig::new(
            config.list.estimated_height,
            config.list.overscan,
            config.list.window_size,
        )?
        .with_follow(true);
        let mut list = VirtualList::new(list_config, u32::from(layout.list_rows));
        list.scroll_to_bottom();

        let store = Shared::new(ChatState::default());
        let notify_rx = store.subscribe();
        let label = transcript_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("transcript")
            .to_string();

        let mut viewer = Self {
            path: transcript_path,
            label,
            model: config.llm.model,
            settings: config.viewer,
            fade_rows: config.list.fade_rows,
            client,
            transcript,
            list,
            registry: MountRegistry::new(),
            cache: RenderCache::new(),
            layout,
            expanded: HashSet::new(),
            jump_target: None,
            mode: ViewerMode::Normal,
            acc: InputAccumulator::new(),
            flash: None,
            last_search: None,
            error: None,
            store,
            notify_rx,
            cancel: None,
            spinner_frame: 0,
            last_spinner: Instant::now(),
            watch,
            watcher: None,
            dirty: true,
            last_render: Instant::now(),
        };
        viewer.ensure_watcher();
        Ok(viewer)
    }

    fn loading(&self) -> bool {
        self.store.read(|s| s.loading)
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    fn event_loop(&mut self) -> anyhow::Result<()> {
        terminal::clear_screen()?;
        self.draw()?;

        loop {
            if self.notify_rx.try_iter().count() > 0 {
                self.collect_reply();
            }
            if self.watcher.as_ref().is_some_and(TranscriptWatcher::has_changed) {
                self.reload();
            }
            self.tick_spinner();

            if event::poll(self.poll_timeout())? {
                let ev = event::read()?;
                debug!("event: {:?}", ev);
                if self.handle_event(ev)? {
                    return Ok(());
                }
                // Keep painting under a continuous key-repeat stream.
                if !self.dirty || self.last_render.elapsed() < self.settings.frame_budget {
                    continue;
                }
            }

            if self.dirty {
                self.draw()?;
            }
        }
    }

    fn poll_timeout(&self) -> Duration {
        let mut timeout = IDLE_POLL;
        if self.dirty {
            timeout = self
                .settings
                .frame_budget
                .saturating_sub(self.last_render.elapsed());
        }
        if self.loading() {
            let spin = self
                .settings
                .spinner_interval
                .saturating_sub(self.last_spinner.elapsed());
            timeout = timeout.min(spin);
        }
        if self.watcher.is_some() {
            timeout = timeout.min(self.settings.watch_interval);
        }
        timeout
    }

    fn tick_spinner(&mut self) {
        if self.loading() && self.last_spinner.elapsed() >= self.settings.spinner_interval {
            self.spinner_frame = self.spinner_frame.wrapping_add(1);
            self.last_spinner = Instant::now();
            self.dirty = true;
        }
    }

    /// Returns true when the viewer should exit.
    fn handle_event(&mut self, ev: Event) -> anyhow::Result<bool> {
        match ev {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Mouse(mouse) if matches!(self.mode, ViewerMode::Normal) => {
                match map_mouse_event(mouse) {
                    Some(action) => {
                        let effects = self.normal_action(action);
                        self.apply(effects)
                    }
                    None => Ok(false),
                }
            }
            Event::Resize(cols, rows) => {
                self.resize(cols, rows)?;
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    fn normal_action(&mut self, action: input::Action) -> Vec<Effect> {
        let loading = self.loading();
        let mut ctx = NormalCtx {
            messages: self.transcript.messages(),
            focused: focused_index(&self.list),
            scroll_step: self.settings.scroll_step,
            list_rows: u32::from(self.layout.list_rows),
            loading,
            last_search: &mut self.last_search,
        };
        mode_normal::handle(action, &mut ctx)
    }

    fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
        // Flash messages last until the next key press.
        self.flash = None;

        let effects = if let ViewerMode::Normal = self.mode {
            match map_key_event(key, &mut self.acc) {
                Some(action) => self.normal_action(action),
                None => {
                    // Unknown key drops a pending count.
                    if self.acc.is_active() {
                        self.acc.reset();
                    }
                    vec![]
                }
            }
        } else {
            self.line_key(key)?
        };

        if self.apply(effects)? {
            return Ok(true);
        }
        self.draw_status()?;
        Ok(false)
    }

    /// Keys typed into the prompt or search bar.
    fn line_key(&mut self, key: KeyEvent) -> std::io::Result<Vec<Effect>> {
        let Some(action) = map_line_key(key) else {
            return Ok(vec![]);
        };
        let focused = focused_index(&self.list);
        match &mut self.mode {
            ViewerMode::Normal => Ok(vec![]),
            ViewerMode::Prompt(ps) => mode_prompt::handle(action, ps, &self.layout),
            ViewerMode::Search(ss) => {
                let ctx = SearchCtx {
                    messages: self.transcript.messages(),
                    focused,
                    layout: &self.layout,
                };
                mode_search::handle(action, ss, &ctx)
            }
        }
    }

    /// Returns true when an effect asked to quit.
    fn apply(&mut self, effects: Vec<Effect>) -> anyhow::Result<bool> {
        for effect in effects {
            match effect {
                Effect::ScrollBy(delta) => {
                    self.list.scroll_by(delta);
                    self.dirty = true;
                }
                Effect::ScrollTo(top) => {
                    self.list.scroll_to(top);
                    self.dirty = true;
                }
                Effect::ScrollToBottom => {
                    self.list.scroll_to_bottom();
                    self.dirty = true;
                }
                Effect::ScrollToMessage(idx) => {
                    self.list.scroll_to_index(idx);
                    self.jump_target = Some(idx);
                    self.dirty = true;
                }
                Effect::SetMode(mode) => {
                    self.mode = mode;
                    self.draw_input_row()?;
                }
                Effect::SetLastSearch(ls) => self.last_search = Some(ls),
                Effect::Flash(msg) => self.flash = Some(msg),
                Effect::Submit(prompt) => self.submit(&prompt),
                Effect::Stop => self.stop(),
                Effect::TogglePanel(idx) => self.toggle_panel(idx),
                Effect::Yank(text) => {
                    if let Err(e) = terminal::send_osc52(&text) {
                        debug!("OSC 52 failed: {e}");
                    }
                }
                Effect::Quit => return Ok(true),
            }
        }
        Ok(false)
    }

    fn resize(&mut self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let old = self.layout;
        self.layout = compute_layout(cols, rows);
        self.list
            .set_container_height(u32::from(self.layout.list_rows));
        if old.content_cols != self.layout.content_cols {
            // Wrapped heights depend on the width.
            debug!(
                "resize: width {} -> {}, dropping measurements",
                old.content_cols, self.layout.content_cols
            );
            self.list.invalidate_all();
            self.cache.clear();
            self.registry.clear();
        }
        terminal::clear_screen()?;
        self.dirty = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transcript mutations
    // -----------------------------------------------------------------------

    fn submit(&mut self, prompt: &str) {
        if self.loading() {
            self.flash = Some("Waiting for a reply (Esc to stop)".into());
            return;
        }
        if !self.transcript.push_prompt(prompt) {
            self.flash = Some("Same prompt as last time; not sent".into());
            return;
        }
        self.error = None;
        self.list.scroll_to_bottom();
        self.persist();
        self.dirty = true;

        let request = self.store.update(|s| s.begin(prompt));
        let cancel = CancelToken::new();
        self.cancel = Some(cancel.clone());
        let history = self.transcript.messages().to_vec();
        let client = Arc::clone(&self.client);
        let store = self.store.clone();
        info!("submit: request {request} ({} message(s) of history)", history.len());

        thread::spawn(move || {
            let started = Instant::now();
            match client.send(&history, &cancel) {
                Ok(reply) => {
                    info!(
                        "worker: request {request} answered in {:.1}s",
                        started.elapsed().as_secs_f64()
                    );
                    store.update(|s| s.complete(request, reply.answer, reply.thought));
                }
                Err(e) if llm::is_cancelled(&e) => {
                    debug!("worker: request {request} cancelled");
                }
                Err(e) => {
                    warn!("worker: request {request} failed: {e:#}");
                    store.update(|s| s.fail(request, format!("{e:#}")));
                }
            }
        });
    }

    /// Fold a finished request into the transcript.
    fn collect_reply(&mut self) {
        let state = self.store.snapshot();
        if !state.loading {
            return;
        }
        if let Some(err) = state.error {
            self.transcript.drop_placeholder();
            self.error = Some(err);
        } else if !state.answer.is_empty() {
            let thought = Some(state.thought).filter(|t| !t.is_empty());
            if let Some(idx) = self.transcript.resolve_placeholder(&state.answer, thought) {
                self.list.invalidate(idx);
            }
        } else {
            return;
        }
        self.store.update(ChatState::finish);
        self.cancel = None;
        self.persist();
        self.dirty = true;
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.store.update(ChatState::finish);
        if self.transcript.drop_placeholder().is_some() {
            self.persist();
        }
        info!("stop: request aborted");
        self.flash = Some(llm::Cancelled.to_string());
        self.dirty = true;
    }

    fn toggle_panel(&mut self, idx: usize) {
        let Some(msg) = self.transcript.get(idx) else {
            return;
        };
        if !self.expanded.remove(&msg.id) {
            self.expanded.insert(msg.id.clone());
        }
        // Re-measured on the next frame; the list keeps the top item anchored.
        self.list.invalidate(idx);
        self.dirty = true;
    }

    fn persist(&mut self) {
        match transcript::save(&self.path, &self.transcript) {
            Ok(()) => self.ensure_watcher(),
            Err(e) => {
                warn!("persist: {e:#}");
                self.flash = Some(format!("Save failed: {e:#}"));
            }
        }
    }

    /// Start watching once the transcript file exists.
    fn ensure_watcher(&mut self) {
        if !self.watch || self.watcher.is_some() || !self.path.exists() {
            return;
        }
        match TranscriptWatcher::new(&self.path) {
            Ok(w) => {
                info!("watch: enabled for {}", w.path().display());
                self.watcher = Some(w);
            }
            Err(e) => {
                warn!("watch: {e:#}");
                self.watch = false;
            }
        }
    }

    /// Pick up changes written by another process.
    fn reload(&mut self) {
        if self.loading() {
            debug!("reload: skipped while a request is in flight");
            return;
        }
        let fresh = match transcript::reload(&self.path) {
            Ok(t) => t,
            Err(e) => {
                warn!("reload: {e:#}");
                return;
            }
        };
        let first_diff = self
            .transcript
            .messages()
            .iter()
            .zip(fresh.messages())
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| self.transcript.len().min(fresh.len()));
        if !self.transcript.replace(fresh) {
            return;
        }
        info!(
            "reload: {} message(s), first change at {first_diff}",
            self.transcript.len()
        );
        for idx in first_diff..self.transcript.len() {
            self.list.invalidate(idx);
        }
        self.last_search = None;
        self.dirty = true;
    }

    fn shutdown(&mut self) {
        if self.loading() {
            self.stop();
        }
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    fn layout_window(&mut self) -> Window {
        let opts = RenderOptions {
            width: self.layout.content_cols as usize,
            loading: self.loading(),
            spinner_frame: self.spinner_frame,
            expanded: false,
        };
        let cache = &mut self.cache;
        let expanded = &self.expanded;
        self.list.layout_items(
            self.transcript.messages(),
            self.transcript.revision(),
            &mut self.registry,
            |msg, _| {
                let opts = RenderOptions {
                    expanded: expanded.contains(&msg.id),
                    ..opts
                };
                cache.render(msg, &opts)
            },
        )
    }

    fn draw(&mut self) -> anyhow::Result<()> {
        let mut window = self.layout_window();
        if let Some(target) = self.jump_target.take() {
            // The first pass measured the target; place it with real offsets.
            self.list.scroll_to_index(target);
            window = self.layout_window();
        }
        self.cache.retain(self.transcript.messages());

        let rows = compose(&window, &self.registry);
        terminal::draw_transcript(
            &self.layout,
            &rows,
            &self.registry,
            &window,
            focused_index(&self.list),
            self.fade_rows,
        )?;
        self.draw_input_row()?;
        self.draw_status()?;
        self.dirty = false;
        self.last_render = Instant::now();
        Ok(())
    }

    fn draw_input_row(&self) -> anyhow::Result<()> {
        match &self.mode {
            ViewerMode::Normal => {
                let hint = if self.transcript.is_empty() {
                    " Press i to start a conversation"
                } else {
                    " i:ask"
                };
                terminal::draw_hint_bar(&self.layout, hint)?;
            }
            ViewerMode::Prompt(ps) => {
                terminal::draw_input_bar(&self.layout, "> ", &ps.input, None)?;
            }
            ViewerMode::Search(ss) => {
                terminal::draw_input_bar(&self.layout, "/", &ss.query, None)?;
            }
        }
        Ok(())
    }

    fn draw_status(&self) -> anyhow::Result<()> {
        let status = terminal::StatusLine {
            label: &self.label,
            model: &self.model,
            focused: focused_index(&self.list),
            total: self.transcript.len(),
            percent: scroll_percent(self.list.scroll_top(), self.list.max_scroll()),
            loading: self.loading(),
            error: self.error.as_deref(),
            acc_peek: self.acc.peek(),
            flash: self.flash.as_deref(),
        };
        terminal::draw_status_bar(&self.layout, &status)?;
        Ok(())
    }
}
