use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ExpandoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Keyboard controller error: {0}")]
    Enigo(String),
    #[error("Clipboard error: {0}")]
    Clipboard(String),
    #[error("Invalid trigger '{trigger}': {reason}")]
    InvalidTrigger { trigger: String, reason: String },
    #[error("Trigger '{0}' already exists")]
    DuplicateTrigger(String),
    #[error("Trigger '{0}' not found")]
    TriggerNotFound(String),
    #[error("Expansion text cannot be empty")]
    EmptyBody,
    #[error("Invalid hotkey '{0}'")]
    InvalidHotkey(String),
    #[error("Daemon already running with PID {0}")]
    DaemonAlreadyRunning(u32),
    #[error("Daemon is not running")]
    DaemonNotRunning,
    #[error("Invalid PID in daemon file")]
    InvalidPid,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Error: {0}")]
    Other(String),
}

impl ExpandoError {
    pub(crate) fn invalid_trigger(trigger: &str, reason: impl Into<String>) -> Self {
        ExpandoError::InvalidTrigger {
            trigger: trigger.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExpandoError>;
