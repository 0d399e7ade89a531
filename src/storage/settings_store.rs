//! Key/value settings storage

use std::{
    collections::HashMap,
    fs,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::state::TimerSettings;

/// Key under which the settings record is stored
pub const SETTINGS_KEY: &str = "timerSettings";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Storage lock poisoned")]
    Poisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Minimal key to blob store
pub trait SettingsStore: Send + Sync {
    /// Raw value stored under `key`, if any
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
}

/// Stores each key as `<key>.json` inside a directory
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    base_dir: PathBuf,
}

impl FileSettingsStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", key))
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        fs::create_dir_all(&self.base_dir)?;
        let path = self.path_for(key);

        // Readers only ever see a complete record
        let temp_path = path.with_extension("tmp");
        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(value.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        fs::rename(&temp_path, &path)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// In-process store, used when nothing should touch the disk
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Load settings, falling back to defaults when absent or unreadable
pub fn load_settings(store: &dyn SettingsStore) -> TimerSettings {
    let raw = match store.get(SETTINGS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("No stored settings, using defaults");
            return TimerSettings::default();
        }
        Err(e) => {
            warn!("Failed to read stored settings: {}, using defaults", e);
            return TimerSettings::default();
        }
    };

    match serde_json::from_str::<TimerSettings>(&raw) {
        Ok(mut settings) => {
            settings.sanitize();
            settings
        }
        Err(e) => {
            warn!("Stored settings are malformed: {}, using defaults", e);
            TimerSettings::default()
        }
    }
}

/// Save the full settings record
pub fn save_settings(store: &dyn SettingsStore, settings: &TimerSettings) -> StorageResult<()> {
    let raw = serde_json::to_string_pretty(settings)?;
    store.set(SETTINGS_KEY, &raw)
}
