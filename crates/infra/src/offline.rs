//! Local fallback preference store.
//!
//! Stands in for the remote service when no usable session exists: the
//! same [`Preferences`] contract, backed by a local map with optional
//! JSON-file persistence. Writes are flushed to disk at most once per
//! [`OFFLINE_COMMIT_TICKS`] ticks while dirty.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};
use webprefs_core::Preferences;
use webprefs_domain::constants::OFFLINE_COMMIT_TICKS;
use webprefs_domain::validation::{validate_entry, validate_key};
use webprefs_domain::{PrefsError, Result, SubjectId};

struct StoreState {
    values: HashMap<String, String>,
    tick_number: u32,
    dirty: bool,
}

/// Offline preference collection, optionally persisted to a JSON file.
///
/// A memory-only collection (no backing file) serves as the inert
/// placeholder for subjects whose preferences cannot be stored anywhere.
pub struct OfflinePreferences {
    id: SubjectId,
    is_private: bool,
    is_read_only: bool,
    store: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl OfflinePreferences {
    /// Memory-only collection; contents are lost when dropped.
    pub fn memory(id: SubjectId, is_private: bool, is_read_only: bool) -> Self {
        Self {
            id,
            is_private,
            is_read_only,
            store: None,
            state: Mutex::new(StoreState { values: HashMap::new(), tick_number: 0, dirty: false }),
        }
    }

    /// File-backed collection stored under `dir`, loading any existing
    /// content. Load failures start from an empty map.
    pub fn with_store(dir: &Path, id: SubjectId, is_private: bool, is_read_only: bool) -> Self {
        let file = dir.join(format!(
            "{}.{}prefs.json",
            id,
            if is_private { "private" } else { "" }
        ));
        let values = Self::load_values(&file);
        Self {
            id,
            is_private,
            is_read_only,
            store: Some(file),
            state: Mutex::new(StoreState { values, tick_number: 0, dirty: false }),
        }
    }

    /// Path of the backing file, when there is one.
    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_deref()
    }

    fn load_values(file: &Path) -> HashMap<String, String> {
        if !file.is_file() {
            return HashMap::new();
        }
        match File::open(file) {
            Ok(handle) => match serde_json::from_reader(BufReader::new(handle)) {
                Ok(values) => values,
                Err(err) => {
                    warn!(file = %file.display(), %err, "could not decode offline store");
                    HashMap::new()
                }
            },
            Err(err) => {
                warn!(file = %file.display(), %err, "could not open offline store");
                HashMap::new()
            }
        }
    }

    fn save_values(&self, values: &HashMap<String, String>) {
        let Some(file) = &self.store else { return };
        match File::create(file) {
            Ok(handle) => {
                if let Err(err) = serde_json::to_writer_pretty(BufWriter::new(handle), values) {
                    warn!(file = %file.display(), %err, "could not write offline store");
                } else {
                    debug!(file = %file.display(), count = values.len(), "offline store saved");
                }
            }
            Err(err) => {
                warn!(file = %file.display(), %err, "could not create offline store");
            }
        }
    }
}

impl Preferences for OfflinePreferences {
    fn id(&self) -> &SubjectId {
        &self.id
    }

    fn is_private(&self) -> bool {
        self.is_private
    }

    fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.state.lock().values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.is_read_only {
            return Err(PrefsError::ReadOnly(self.id.to_string()));
        }
        validate_entry(key, value)?;

        let mut state = self.state.lock();
        state.values.insert(key.to_string(), value.to_string());
        state.dirty = true;
        Ok(())
    }

    fn request(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        // There is no server to ask; a requested key materializes empty.
        let mut state = self.state.lock();
        if !state.values.contains_key(key) {
            state.values.insert(key.to_string(), String::new());
        }
        Ok(())
    }

    fn request_keys(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.request(key)?;
        }
        Ok(())
    }

    fn poll(&self) {}

    fn commit(&self, _force: bool) {
        self.state.lock().dirty = true;
    }

    fn on_tick(&self) {
        let values = {
            let mut state = self.state.lock();
            state.tick_number += 1;
            if state.tick_number <= OFFLINE_COMMIT_TICKS || !state.dirty {
                return;
            }
            state.tick_number = 0;
            state.dirty = false;
            state.values.clone()
        };
        self.save_values(&values);
    }
}
