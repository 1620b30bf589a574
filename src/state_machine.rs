use crate::applier::ApplyingFlag;
use crate::expansion::{resolve_candidates, FilterOutcome, MacroSource};
use crate::keyboard::{Chord, Key};
use crate::session::{Direction, SessionId, SuggestionSession, UiCommand};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    /// Buffer empty.
    Idle,
    /// Buffer holds a partial trigger, no list open.
    Composing,
    /// Candidate list open.
    Suggesting,
}

/// What the caller has to do after feeding an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Ui(UiCommand),
    Apply { trigger: String, delete_count: usize },
}

/// Per-keystroke trigger detection.
///
/// One instance per process, owned and mutated by the engine thread only.
#[derive(Debug)]
pub struct InputStateMachine {
    prefix: char,
    buffer: String,
    session: SuggestionSession,
    applying: ApplyingFlag,
    hotkey: Chord,
    hotkey_ignore_window: Duration,
    last_hotkey: Option<Instant>,
}

impl InputStateMachine {
    pub fn new(prefix: char, hotkey: Chord, hotkey_ignore_window: Duration) -> Self {
        Self {
            prefix,
            buffer: String::new(),
            session: SuggestionSession::default(),
            applying: ApplyingFlag::default(),
            hotkey,
            hotkey_ignore_window,
            last_hotkey: None,
        }
    }

    pub fn state(&self) -> InputState {
        if self.session.is_active() {
            InputState::Suggesting
        } else if self.buffer.is_empty() {
            InputState::Idle
        } else {
            InputState::Composing
        }
    }

    pub fn prefix(&self) -> char {
        self.prefix
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn session(&self) -> &SuggestionSession {
        &self.session
    }

    pub fn applying_flag(&self) -> ApplyingFlag {
        self.applying.clone()
    }

    pub fn is_applying(&self) -> bool {
        self.applying.is_set()
    }

    /// Feed one key press.
    pub fn handle_key(&mut self, key: &Key, at: Instant, source: &dyn MacroSource) -> Vec<Action> {
        if self.applying.is_set() {
            debug!(%key, "ignored while applying");
            return Vec::new();
        }
        if self.in_hotkey_window(at) && self.hotkey.involves(key) {
            debug!(%key, "ignored as part of the hotkey chord");
            return Vec::new();
        }

        debug!(%key, buffer = %self.buffer, state = ?self.state(), "key");
        if self.session.is_active() {
            self.handle_suggesting(key, source)
        } else {
            self.handle_direct(key, source)
        }
    }

    /// The activation hotkey fired: open the list, or close it when open.
    pub fn activate(&mut self, at: Instant, source: &dyn MacroSource) -> Vec<Action> {
        self.last_hotkey = Some(at);

        if self.applying.is_set() {
            debug!("hotkey ignored while applying");
            return Vec::new();
        }

        if self.session.is_active() {
            debug!("hotkey pressed with list open, closing it");
            self.close_session();
            return vec![Action::Ui(UiCommand::Hide)];
        }

        self.buffer.clear();
        self.buffer.push(self.prefix);
        let session = self.session.open(&self.buffer);
        debug!(buffer = %self.buffer, session, "suggestion mode activated");
        vec![Action::Ui(UiCommand::Show {
            session,
            candidates: source.prefix_match(&self.buffer),
            filter: self.buffer.clone(),
        })]
    }

    /// The renderer reported the list of `session` closed. Notifications
    /// about an earlier list are ignored while a newer one is open.
    pub fn on_popup_closed(&mut self, session: SessionId) {
        if self.session.is_active() && !self.session.is_current(session) {
            debug!(session, current = self.session.id(), "stale close notification ignored");
            return;
        }
        self.renderer_closed();
    }

    /// The renderer can no longer be reached; the list counts as closed.
    pub fn renderer_closed(&mut self) {
        if self.session.is_active() && !self.applying.is_set() {
            self.buffer.clear();
        }
        self.session.close();
        debug!(buffer = %self.buffer, "suggestion list closed");
    }

    /// Reset after an apply. Returns a `Hide` when the list is still marked
    /// open.
    pub fn finish_apply(&mut self) -> Option<UiCommand> {
        self.buffer.clear();
        if self.session.close() {
            Some(UiCommand::Hide)
        } else {
            None
        }
    }

    /// Drop a half-typed trigger when nothing ended up being applied.
    pub fn abandon_composition(&mut self) {
        if !self.session.is_active() {
            self.buffer.clear();
        }
    }

    /// Back to idle, no matter what.
    pub fn reset(&mut self) -> Option<UiCommand> {
        self.finish_apply()
    }

    fn handle_direct(&mut self, key: &Key, source: &dyn MacroSource) -> Vec<Action> {
        if self.buffer.is_empty() {
            if *key == Key::Char(self.prefix) {
                self.buffer.push(self.prefix);
                debug!("prefix typed, composing");
            }
            return Vec::new();
        }

        match key {
            k if k.is_commit() => {
                if source.contains(&self.buffer) {
                    debug!(trigger = %self.buffer, %key, "direct expansion");
                    // The commit key itself was typed too.
                    let delete_count = self.buffer.chars().count() + 1;
                    return vec![Action::Apply {
                        trigger: self.buffer.clone(),
                        delete_count,
                    }];
                }
                debug!(buffer = %self.buffer, "not a macro, clearing");
                self.buffer.clear();
            }
            Key::Backspace => {
                self.buffer.pop();
            }
            Key::Char(c) if !c.is_control() => self.buffer.push(*c),
            Key::Modifier(_) => {}
            _ => {
                debug!(%key, buffer = %self.buffer, "trigger broken, clearing");
                self.buffer.clear();
            }
        }
        Vec::new()
    }

    fn handle_suggesting(&mut self, key: &Key, source: &dyn MacroSource) -> Vec<Action> {
        match key {
            Key::Modifier(_) => Vec::new(),
            Key::Escape => vec![Action::Ui(UiCommand::Hide)],
            Key::Up => vec![Action::Ui(UiCommand::Navigate(Direction::Up))],
            Key::Down => vec![Action::Ui(UiCommand::Navigate(Direction::Down))],
            k if k.is_commit() => vec![Action::Ui(UiCommand::SelectOrClose {
                buffer: self.buffer.clone(),
            })],
            Key::Backspace => {
                self.buffer.pop();
                if !self.buffer.starts_with(self.prefix) {
                    debug!("prefix erased, closing list");
                    self.close_session();
                    return vec![Action::Ui(UiCommand::Hide)];
                }
                self.refilter(source)
            }
            Key::Char(c) if !c.is_control() => {
                self.buffer.push(*c);
                self.refilter(source)
            }
            _ => {
                debug!(%key, "ignored while list open");
                Vec::new()
            }
        }
    }

    fn refilter(&mut self, source: &dyn MacroSource) -> Vec<Action> {
        let candidates = source.prefix_match(&self.buffer);
        match resolve_candidates(candidates, &self.buffer, self.prefix) {
            FilterOutcome::Update(candidates) => {
                self.session.refresh(&self.buffer);
                vec![Action::Ui(UiCommand::Update {
                    candidates,
                    filter: self.buffer.clone(),
                })]
            }
            FilterOutcome::Hide => {
                debug!(buffer = %self.buffer, "no macros match, closing list");
                self.close_session();
                vec![Action::Ui(UiCommand::Hide)]
            }
        }
    }

    fn close_session(&mut self) {
        self.session.close();
        self.buffer.clear();
    }

    fn in_hotkey_window(&self, at: Instant) -> bool {
        self.last_hotkey
            .map(|fired| at.saturating_duration_since(fired) < self.hotkey_ignore_window)
            .unwrap_or(false)
    }
}
