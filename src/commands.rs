use crate::cli::Commands;
use crate::config::{
    get_config_dir, get_db_file_path, get_log_file_path, get_pid_file_path,
    get_settings_file_path, Settings,
};
use crate::daemon::{daemon_status, daemon_worker_entry, start_daemon, stop_daemon};
use crate::error::{ExpandoError, Result};
use crate::expansion::MacroSource;
use crate::models::PREVIEW_CHARS;
use crate::storage::ExpansionStore;
use std::fs;
use std::path::{Path, PathBuf};

pub fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Add {
            trigger,
            body,
            file,
        } => {
            let body = read_body(body, file)?
                .ok_or_else(|| ExpandoError::Other("either --body or --file is required".into()))?;
            open_store().add(&trigger, &body)?;
            println!("Added {}", trigger);
            Ok(())
        }
        Commands::Remove { trigger } => {
            open_store().remove(&trigger)?;
            println!("Removed {}", trigger);
            Ok(())
        }
        Commands::Edit {
            trigger,
            new_trigger,
            body,
            file,
        } => edit(&open_store(), &trigger, new_trigger, read_body(body, file)?),
        Commands::List => {
            list(&open_store());
            Ok(())
        }
        Commands::Match { filter } => {
            for trigger in open_store().prefix_match(&filter) {
                println!("{}", trigger);
            }
            Ok(())
        }
        Commands::Start { foreground } => start_daemon(foreground),
        Commands::Stop => stop_daemon(),
        Commands::Status => daemon_status(),
        Commands::Config => show_config(),
        Commands::DaemonWorker => daemon_worker_entry(),
    }
}

fn open_store() -> ExpansionStore {
    ExpansionStore::open(get_db_file_path(), Settings::load().prefix)
}

/// Resolve `--body`/`--file` into the expansion text.
pub fn read_body(body: Option<String>, file: Option<PathBuf>) -> Result<Option<String>> {
    match (body, file) {
        (Some(body), _) => Ok(Some(body)),
        (None, Some(path)) => Ok(Some(fs::read_to_string(path)?)),
        (None, None) => Ok(None),
    }
}

/// Rename and/or change the body of `trigger`. Missing parts keep their
/// current value.
pub fn edit(
    store: &ExpansionStore,
    trigger: &str,
    new_trigger: Option<String>,
    body: Option<String>,
) -> Result<()> {
    let current = store
        .lookup(trigger)
        .ok_or_else(|| ExpandoError::TriggerNotFound(trigger.to_string()))?;
    let new_trigger = new_trigger.unwrap_or_else(|| trigger.to_string());
    let body = body.unwrap_or(current);

    store.edit(trigger, &new_trigger, &body)?;
    if new_trigger == trigger {
        println!("Updated {}", trigger);
    } else {
        println!("Renamed {} to {}", trigger, new_trigger);
    }
    Ok(())
}

fn list(store: &ExpansionStore) {
    let entries = store.entries();
    if entries.is_empty() {
        println!("No expansions yet. Add one with: expando add --trigger /sig --body \"...\"");
        return;
    }
    let width = entries
        .iter()
        .map(|entry| entry.trigger.chars().count())
        .max()
        .unwrap_or(0);
    for entry in &entries {
        println!(
            "{:width$}  {}",
            entry.trigger,
            entry.preview(PREVIEW_CHARS),
            width = width
        );
    }
}

fn show_config() -> Result<()> {
    let settings = Settings::load();
    println!("config dir:  {}", get_config_dir().display());
    print_path("expansions:", &get_db_file_path());
    print_path("settings:  ", &get_settings_file_path());
    print_path("pid file:  ", &get_pid_file_path());
    print_path("daemon log:", &get_log_file_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn print_path(label: &str, path: &Path) {
    let marker = if path.exists() { "" } else { " (missing)" };
    println!("{} {}{}", label, path.display(), marker);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn body_comes_from_flag_or_file() {
        assert_eq!(read_body(Some("hi".into()), None).unwrap(), Some("hi".into()));
        assert_eq!(read_body(None, None).unwrap(), None);

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "line one\nline two").unwrap();
        assert_eq!(
            read_body(None, Some(file.path().to_path_buf())).unwrap(),
            Some("line one\nline two".into())
        );
    }

    #[test]
    fn edit_keeps_missing_parts() {
        let dir = TempDir::new().unwrap();
        let store = ExpansionStore::open(dir.path().join("expansions.json"), '/');
        store.add("/sig", "Best regards").unwrap();

        edit(&store, "/sig", Some("/sign".into()), None).unwrap();
        assert_eq!(store.lookup("/sig"), None);
        assert_eq!(store.lookup("/sign").as_deref(), Some("Best regards"));

        edit(&store, "/sign", None, Some("Cheers".into())).unwrap();
        assert_eq!(store.lookup("/sign").as_deref(), Some("Cheers"));

        assert!(matches!(
            edit(&store, "/missing", None, None),
            Err(ExpandoError::TriggerNotFound(_))
        ));
    }
}
