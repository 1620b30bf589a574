use crate::applier::ApplyTiming;
use crate::error::{ExpandoError, Result};
use crate::keyboard::Chord;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_PREFIX: char = '/';
pub const DEFAULT_HOTKEY: &str = "ctrl+space";
pub const PID_FILENAME: &str = "expando-daemon.pid";
pub const DB_FILENAME: &str = "expansions.json";
pub const SETTINGS_FILENAME: &str = "settings.json";
pub const LOG_FILENAME: &str = "daemon_log.txt";

/// Get the expando configuration directory.
///
/// `EXPANDO_HOME` wins over `$HOME/.expando`.
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = env::var("EXPANDO_HOME") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".expando"))
        .unwrap_or_else(|_| PathBuf::from(".expando"))
}

/// Ensure the configuration directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir = get_config_dir();
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
        info!(path = %config_dir.display(), "created config directory");
    }
    Ok(config_dir)
}

/// Get the path to the PID file
pub fn get_pid_file_path() -> PathBuf {
    get_config_dir().join(PID_FILENAME)
}

/// Get the path to the expansions file
pub fn get_db_file_path() -> PathBuf {
    get_config_dir().join(DB_FILENAME)
}

pub fn get_settings_file_path() -> PathBuf {
    get_config_dir().join(SETTINGS_FILENAME)
}

pub fn get_log_file_path() -> PathBuf {
    get_config_dir().join(LOG_FILENAME)
}

/// Check if daemon is running
pub fn is_daemon_running() -> Result<Option<u32>> {
    let pid_file = get_pid_file_path();

    if !pid_file.exists() {
        return Ok(None);
    }

    let pid = match fs::read_to_string(&pid_file) {
        Ok(contents) => match contents.trim().parse::<u32>() {
            Ok(pid) => pid,
            Err(_) => {
                // Invalid PID, treat as not running and clean up
                let _ = fs::remove_file(&pid_file);
                return Ok(None);
            }
        },
        Err(_) => {
            let _ = fs::remove_file(&pid_file);
            return Ok(None);
        }
    };

    if process_alive(pid) {
        Ok(Some(pid))
    } else {
        Ok(None)
    }
}

/// Whether a process with `pid` exists.
pub fn process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    // No cheap liveness check here, trust the PID file
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

/// Runtime settings, persisted as `settings.json` in the config directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Character that starts every trigger.
    pub prefix: char,
    /// Chord that opens the suggestion list, e.g. `ctrl+space`.
    pub hotkey: String,
    /// Wait after hiding the popup so focus returns to the target window.
    pub settle_delay_ms: u64,
    /// Wait before a direct expansion when no popup was open.
    pub pre_apply_delay_ms: u64,
    /// Pause between the backspace, clipboard and paste steps.
    pub step_delay_ms: u64,
    pub backspace_delay_ms: u64,
    /// How long chord keys are ignored after the hotkey fires.
    pub hotkey_ignore_window_ms: u64,
    pub notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX,
            hotkey: DEFAULT_HOTKEY.to_string(),
            settle_delay_ms: 700,
            pre_apply_delay_ms: 50,
            step_delay_ms: 50,
            backspace_delay_ms: 2,
            hotkey_ignore_window_ms: 250,
            notifications: true,
        }
    }
}

impl Settings {
    /// Load settings from the default location, falling back to defaults.
    pub fn load() -> Self {
        let path = get_settings_file_path();
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unusable settings file, using defaults");
                Self::default()
            }
        }
    }

    /// Load and validate settings from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_whitespace() || self.prefix.is_control() {
            return Err(ExpandoError::InvalidConfig(format!(
                "prefix {:?} must be a visible character",
                self.prefix
            )));
        }
        self.hotkey_chord()?;
        Ok(())
    }

    pub fn hotkey_chord(&self) -> Result<Chord> {
        self.hotkey.parse()
    }

    pub fn hotkey_ignore_window(&self) -> Duration {
        Duration::from_millis(self.hotkey_ignore_window_ms)
    }

    pub fn timing(&self) -> ApplyTiming {
        ApplyTiming {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            pre_apply_delay: Duration::from_millis(self.pre_apply_delay_ms),
            step_delay: Duration::from_millis(self.step_delay_ms),
        }
    }

    pub fn backspace_delay(&self) -> Duration {
        Duration::from_millis(self.backspace_delay_ms)
    }
}
