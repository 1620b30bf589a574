//! Suggestion session: the bridge between the input state machine and
//! whatever renders the candidate list.
//!
//! The core talks to a renderer only through [`UiCommand`]s posted on a
//! channel, and hears back only through [`RendererEvent`]s. The renderer's
//! visibility is the ground truth: a `Closed` event always wins over what
//! the core believed, but only for the session it names: each `Show`
//! opens a new [`SessionId`] and the renderer echoes it back, so a late
//! notification about an earlier list cannot close a newer one.

use crate::engine::EngineEvent;
use crate::expansion::MacroSource;
use crate::models::{ExpansionEntry, PREVIEW_CHARS};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, info};

/// Identifies one opening of the suggestion list.
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn step(self) -> isize {
        match self {
            Direction::Up => -1,
            Direction::Down => 1,
        }
    }
}

/// Commands the core sends to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    Show {
        session: SessionId,
        candidates: Vec<String>,
        filter: String,
    },
    Update {
        candidates: Vec<String>,
        filter: String,
    },
    Hide,
    Navigate(Direction),
    /// Commit the highlighted candidate, or close when there is none.
    SelectOrClose {
        buffer: String,
    },
}

/// Notifications the renderer sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    Selected { session: SessionId, trigger: String },
    Closed { session: SessionId },
}

/// The core's view of the candidate list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SuggestionSession {
    active: bool,
    filter: String,
    id: SessionId,
}

impl SuggestionSession {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The most recently opened session, whether or not it is still open.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Whether a renderer notification about `session` concerns the list
    /// that is open now.
    pub fn is_current(&self, session: SessionId) -> bool {
        self.active && session == self.id
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Open a new session and return its id.
    pub fn open(&mut self, filter: &str) -> SessionId {
        self.id = self.id.wrapping_add(1);
        self.active = true;
        self.filter = filter.to_string();
        self.id
    }

    pub fn refresh(&mut self, filter: &str) {
        if self.active {
            self.filter = filter.to_string();
        }
    }

    /// Mark the session closed. Returns whether it was open.
    pub fn close(&mut self) -> bool {
        let was_active = self.active;
        self.active = false;
        self.filter.clear();
        was_active
    }
}

/// Fire-and-forget sender of [`UiCommand`]s to the UI thread.
#[derive(Debug, Clone, Default)]
pub struct UiChannel {
    tx: Option<Sender<UiCommand>>,
}

impl UiChannel {
    pub fn new(tx: Sender<UiCommand>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A channel with no renderer behind it; every post fails.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    /// Post without waiting. Returns false when no renderer is listening.
    pub fn post(&self, command: UiCommand) -> bool {
        match &self.tx {
            Some(tx) => tx.send(command).is_ok(),
            None => false,
        }
    }
}

/// Renderer-side candidate list with a highlighted row.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SuggestionList {
    candidates: Vec<String>,
    filter: String,
    highlighted: Option<usize>,
}

impl SuggestionList {
    /// Replace the candidates. The first row is highlighted when there is one.
    pub fn set(&mut self, candidates: Vec<String>, filter: String) {
        self.highlighted = if candidates.is_empty() { None } else { Some(0) };
        self.candidates = candidates;
        self.filter = filter;
    }

    pub fn clear(&mut self) {
        self.set(Vec::new(), String::new());
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn highlighted_index(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.highlighted
            .and_then(|index| self.candidates.get(index))
            .map(String::as_str)
    }

    /// Move the highlight, wrapping around both ends.
    pub fn navigate(&mut self, direction: Direction) {
        let len = self.candidates.len() as isize;
        if len == 0 {
            self.highlighted = None;
            return;
        }
        let next = match self.highlighted {
            Some(current) => (current as isize + direction.step()).rem_euclid(len),
            None if direction == Direction::Up => len - 1,
            None => 0,
        };
        self.highlighted = Some(next as usize);
    }

    /// Highlight `index` and return its trigger.
    pub fn select(&mut self, index: usize) -> Option<String> {
        let trigger = self.candidates.get(index)?.clone();
        self.highlighted = Some(index);
        Some(trigger)
    }
}

/// A renderer without a window: keeps the list state, writes it to the log,
/// and reports selections and closures back to the engine.
pub struct HeadlessRenderer {
    list: SuggestionList,
    open: bool,
    session: SessionId,
    events: Sender<EngineEvent>,
    source: Option<Arc<dyn MacroSource + Send + Sync>>,
}

impl HeadlessRenderer {
    pub fn new(events: Sender<EngineEvent>) -> Self {
        Self {
            list: SuggestionList::default(),
            open: false,
            session: 0,
            events,
            source: None,
        }
    }

    /// Include body previews when logging the list.
    pub fn with_previews(mut self, source: Arc<dyn MacroSource + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    /// Visible means open with at least one row to show.
    pub fn is_visible(&self) -> bool {
        self.open && !self.list.is_empty()
    }

    pub fn list(&self) -> &SuggestionList {
        &self.list
    }

    /// Process commands until the engine drops its sender.
    pub fn run(mut self, commands: Receiver<UiCommand>) {
        for command in commands {
            self.handle(command);
        }
        debug!("renderer command channel closed");
    }

    pub fn handle(&mut self, command: UiCommand) {
        debug!(?command, visible = self.is_visible(), "renderer command");
        match command {
            UiCommand::Show {
                session,
                candidates,
                filter,
            } => {
                self.session = session;
                self.open = true;
                self.list.set(candidates, filter);
                self.render();
            }
            UiCommand::Update { candidates, filter } => {
                if self.open {
                    self.list.set(candidates, filter);
                    self.render();
                } else {
                    // Core thinks the list is open but it is not.
                    self.close();
                }
            }
            UiCommand::Hide => self.close(),
            UiCommand::Navigate(direction) => {
                if self.is_visible() {
                    self.list.navigate(direction);
                    self.render();
                }
            }
            UiCommand::SelectOrClose { buffer } => {
                if self.is_visible() {
                    if let Some(trigger) = self.list.highlighted() {
                        debug!(trigger, buffer = %buffer, "committing highlighted candidate");
                        self.send(RendererEvent::Selected {
                            session: self.session,
                            trigger: trigger.to_string(),
                        });
                    }
                }
                self.close();
            }
        }
    }

    /// Click on row `index`.
    pub fn click(&mut self, index: usize) {
        if !self.is_visible() {
            return;
        }
        if let Some(trigger) = self.list.select(index) {
            self.send(RendererEvent::Selected {
                session: self.session,
                trigger,
            });
            self.close();
        }
    }

    fn close(&mut self) {
        self.open = false;
        self.list.clear();
        self.send(RendererEvent::Closed {
            session: self.session,
        });
    }

    fn send(&self, event: RendererEvent) {
        if self.events.send(EngineEvent::Renderer(event)).is_err() {
            debug!("engine is gone, dropping renderer event");
        }
    }

    fn render(&self) {
        if !self.is_visible() {
            return;
        }
        let rows: Vec<String> = self
            .list
            .candidates()
            .iter()
            .enumerate()
            .map(|(index, trigger)| {
                let marker = if Some(index) == self.list.highlighted_index() { '>' } else { ' ' };
                let preview = self
                    .source
                    .as_ref()
                    .and_then(|source| source.expansion(trigger))
                    .map(|body| ExpansionEntry::new(trigger.as_str(), body).preview(PREVIEW_CHARS))
                    .unwrap_or_default();
                format!("{} {}  \u{2192}  {}", marker, trigger, preview)
            })
            .collect();
        info!(filter = self.list.filter(), "suggestions:\n{}", rows.join("\n"));
    }
}
