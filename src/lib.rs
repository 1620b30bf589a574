//! expando - prefix-triggered text macros.
//!
//! Typing a trigger such as `/sig` followed by space, enter or tab replaces
//! it with the stored text. A global hotkey opens a filterable list of
//! triggers instead. Replacement is done with synthetic backspaces and a
//! clipboard paste, and the user's clipboard is restored afterwards.

pub mod applier;
pub mod cli;
pub mod clipboard;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod expansion;
pub mod keyboard;
pub mod listener;
pub mod logging;
pub mod models;
pub mod session;
pub mod state_machine;
pub mod storage;

// Re-export
pub use applier::{
    ApplyTiming, ApplyingFlag, DesktopNotifier, LogNotifier, MacroApplier, Notifier,
};
pub use cli::{Commands, Expando};
pub use clipboard::{Clipboard, SystemClipboard};
pub use commands::handle_command;
pub use config::{get_config_dir, is_daemon_running, Settings};
pub use daemon::{daemon_status, run_daemon_worker, start_daemon, stop_daemon};
pub use engine::{Engine, EngineEvent};
pub use error::{ExpandoError, Result};
pub use expansion::{prefix_match, MacroSource};
pub use keyboard::{Chord, EnigoInput, Key, SyntheticInput};
pub use logging::init_logging;
pub use models::ExpansionEntry;
pub use session::{
    HeadlessRenderer, RendererEvent, SessionId, SuggestionSession, UiChannel, UiCommand,
};
pub use state_machine::{Action, InputState, InputStateMachine};
pub use storage::ExpansionStore;
