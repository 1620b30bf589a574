use crate::error::{ExpandoError, Result};
use crate::expansion::MacroSource;
use crate::models::{validate_body, validate_trigger, ExpansionEntry};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

type Mapping = BTreeMap<String, String>;

/// Trigger→body mapping backed by a pretty-printed JSON object on disk.
///
/// Every mutation validates, persists the new mapping, and only then swaps
/// it in. Lookups never observe a mapping that failed to reach the file.
#[derive(Debug)]
pub struct ExpansionStore {
    path: PathBuf,
    prefix: char,
    entries: Mutex<Mapping>,
    last_modified: Mutex<Option<SystemTime>>,
}

impl ExpansionStore {
    /// Open the store at `path`, creating the file (and its parent
    /// directories) when missing. Never fails: unusable files load as empty.
    pub fn open(path: impl Into<PathBuf>, prefix: char) -> Self {
        let store = Self {
            path: path.into(),
            prefix,
            entries: Mutex::new(Mapping::new()),
            last_modified: Mutex::new(None),
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn prefix(&self) -> char {
        self.prefix
    }

    /// Re-read the file into memory. Returns the number of entries loaded.
    pub fn load(&self) -> usize {
        let mut entries = self.lock_entries();
        *entries = self.read_mapping();
        *self.lock_modified() = modified_time(&self.path);
        info!(path = %self.path.display(), count = entries.len(), "loaded expansions");
        entries.len()
    }

    /// Reload when the file changed on disk since the last load or save.
    pub fn reload_if_modified(&self) -> bool {
        let Some(current) = modified_time(&self.path) else {
            return false;
        };
        let changed = {
            let last = self.lock_modified();
            match *last {
                Some(seen) => current > seen,
                None => true,
            }
        };
        if changed {
            debug!(path = %self.path.display(), "expansions file changed, reloading");
            self.load();
        }
        changed
    }

    /// Persist the current in-memory mapping.
    pub fn save(&self) -> Result<()> {
        let entries = self.lock_entries();
        self.persist(&entries)
    }

    pub fn add(&self, trigger: &str, body: &str) -> Result<()> {
        validate_trigger(trigger, self.prefix)?;
        validate_body(body)?;

        self.mutate(|mapping| {
            if mapping.contains_key(trigger) {
                return Err(ExpandoError::DuplicateTrigger(trigger.to_string()));
            }
            mapping.insert(trigger.to_string(), body.to_string());
            Ok(())
        })?;
        info!(trigger, "added expansion");
        Ok(())
    }

    /// Remove `trigger`, returning its body.
    pub fn remove(&self, trigger: &str) -> Result<String> {
        let mut removed = None;
        self.mutate(|mapping| match mapping.remove(trigger) {
            Some(body) => {
                removed = Some(body);
                Ok(())
            }
            None => Err(ExpandoError::TriggerNotFound(trigger.to_string())),
        })?;
        info!(trigger, "removed expansion");
        removed.ok_or_else(|| ExpandoError::TriggerNotFound(trigger.to_string()))
    }

    /// Replace the entry for `old_trigger` with `(new_trigger, body)`.
    /// Renaming onto another existing trigger is rejected.
    pub fn edit(&self, old_trigger: &str, new_trigger: &str, body: &str) -> Result<()> {
        validate_trigger(new_trigger, self.prefix)?;
        validate_body(body)?;

        self.mutate(|mapping| {
            if !mapping.contains_key(old_trigger) {
                return Err(ExpandoError::TriggerNotFound(old_trigger.to_string()));
            }
            if old_trigger != new_trigger && mapping.contains_key(new_trigger) {
                return Err(ExpandoError::DuplicateTrigger(new_trigger.to_string()));
            }
            mapping.remove(old_trigger);
            mapping.insert(new_trigger.to_string(), body.to_string());
            Ok(())
        })?;
        info!(old_trigger, new_trigger, "edited expansion");
        Ok(())
    }

    pub fn lookup(&self, trigger: &str) -> Option<String> {
        self.lock_entries().get(trigger).cloned()
    }

    pub fn entries(&self) -> Vec<ExpansionEntry> {
        self.lock_entries()
            .iter()
            .map(|(trigger, body)| ExpansionEntry::new(trigger.as_str(), body.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Mapping) -> Result<()>,
    {
        let mut entries = self.lock_entries();
        let mut updated = entries.clone();
        change(&mut updated)?;
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn persist(&self, mapping: &Mapping) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let serialized = serde_json::to_string_pretty(mapping)?;
        let mut file = NamedTempFile::new_in(&dir)?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        file.persist(&self.path).map_err(|e| ExpandoError::Io(e.error))?;

        *self.lock_modified() = modified_time(&self.path);
        debug!(path = %self.path.display(), count = mapping.len(), "saved expansions");
        Ok(())
    }

    fn read_mapping(&self) -> Mapping {
        if !self.path.exists() {
            info!(path = %self.path.display(), "expansions file missing, creating an empty one");
            if let Err(e) = self.persist(&Mapping::new()) {
                error!(path = %self.path.display(), error = %e, "could not create expansions file");
            }
            return Mapping::new();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "could not read expansions file");
                return Mapping::new();
            }
        };

        // Handle empty database file
        if content.trim().is_empty() {
            return Mapping::new();
        }

        match serde_json::from_str::<Mapping>(&content) {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "invalid JSON in expansions file, resetting it");
                if let Err(e) = self.persist(&Mapping::new()) {
                    error!(path = %self.path.display(), error = %e, "could not reset expansions file");
                }
                Mapping::new()
            }
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, Mapping> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_modified(&self) -> MutexGuard<'_, Option<SystemTime>> {
        self.last_modified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MacroSource for ExpansionStore {
    fn expansion(&self, trigger: &str) -> Option<String> {
        self.lookup(trigger)
    }

    fn triggers(&self) -> Vec<String> {
        self.lock_entries().keys().cloned().collect()
    }

    fn contains(&self, trigger: &str) -> bool {
        self.lock_entries().contains_key(trigger)
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (ExpansionStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = ExpansionStore::open(temp_dir.path().join("expansions.json"), '/');
        (store, temp_dir)
    }

    #[test]
    fn missing_file_and_parent_are_created() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("expansions.json");

        let store = ExpansionStore::open(&path, '/');

        assert!(store.is_empty());
        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(serde_json::from_str::<Mapping>(&content).unwrap(), Mapping::new());
    }

    #[test]
    fn open_reads_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("expansions.json");
        fs::write(&path, r#"{"/hi": "Hello there"}"#).unwrap();

        let store = ExpansionStore::open(&path, '/');

        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("/hi").as_deref(), Some("Hello there"));
        // Already up to date with the file it just read.
        assert!(!store.reload_if_modified());
    }

    #[test]
    fn corrupt_file_resets_to_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("expansions.json");
        fs::write(&path, "{ not json").unwrap();

        let store = ExpansionStore::open(&path, '/');

        assert!(store.is_empty());
        let content = fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<Mapping>(&content).is_ok());
    }

    #[test]
    fn crud_workflow_persists() {
        let (store, temp_dir) = create_test_store();

        store.add("/hi", "Hello there").unwrap();
        store.add("/sig", "Regards,\nMe").unwrap();
        assert_eq!(store.lookup("/hi").as_deref(), Some("Hello there"));

        store.edit("/hi", "/hello", "Hello!").unwrap();
        assert!(store.lookup("/hi").is_none());
        assert_eq!(store.lookup("/hello").as_deref(), Some("Hello!"));

        assert_eq!(store.remove("/sig").unwrap(), "Regards,\nMe");

        let reopened = ExpansionStore::open(temp_dir.path().join("expansions.json"), '/');
        assert_eq!(reopened.triggers(), vec!["/hello"]);
        assert_eq!(reopened.lookup("/hello").as_deref(), Some("Hello!"));
    }

    #[test]
    fn file_is_pretty_printed_object() {
        let (store, _temp_dir) = create_test_store();
        store.add("/hi", "Hello there").unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["/hi"], "Hello there");
    }

    #[test]
    fn duplicate_and_invalid_writes_are_rejected() {
        let (store, _temp_dir) = create_test_store();
        store.add("/hi", "Hello").unwrap();

        assert!(matches!(
            store.add("/hi", "Other"),
            Err(ExpandoError::DuplicateTrigger(_))
        ));
        assert!(matches!(
            store.add("hi", "Hello"),
            Err(ExpandoError::InvalidTrigger { .. })
        ));
        assert!(matches!(store.add("/x", "   "), Err(ExpandoError::EmptyBody)));
        assert_eq!(store.lookup("/hi").as_deref(), Some("Hello"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn edit_rules() {
        let (store, _temp_dir) = create_test_store();
        store.add("/a", "A").unwrap();
        store.add("/b", "B").unwrap();

        // Same trigger, new body
        store.edit("/a", "/a", "AA").unwrap();
        assert_eq!(store.lookup("/a").as_deref(), Some("AA"));

        assert!(matches!(
            store.edit("/a", "/b", "X"),
            Err(ExpandoError::DuplicateTrigger(_))
        ));
        assert!(matches!(
            store.edit("/missing", "/c", "X"),
            Err(ExpandoError::TriggerNotFound(_))
        ));
        assert!(matches!(
            store.remove("/missing"),
            Err(ExpandoError::TriggerNotFound(_))
        ));
    }

    #[test]
    fn failed_save_keeps_previous_mapping() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("expansions.json");
        // A directory where the file should be makes every write fail.
        fs::create_dir(&path).unwrap();

        let store = ExpansionStore::open(&path, '/');
        assert!(store.is_empty());

        assert!(store.add("/hi", "Hello").is_err());
        assert!(store.lookup("/hi").is_none());
    }

    #[test]
    fn external_changes_are_picked_up() {
        let (store, _temp_dir) = create_test_store();
        assert!(!store.reload_if_modified());

        let mut mapping = Mapping::new();
        mapping.insert("/ext".to_string(), "External".to_string());
        // Make sure the new mtime is strictly later than the one recorded.
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(store.path(), serde_json::to_string_pretty(&mapping).unwrap()).unwrap();

        assert!(store.reload_if_modified());
        assert_eq!(store.lookup("/ext").as_deref(), Some("External"));
    }
}
