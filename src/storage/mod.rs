//! Persistent client storage
//!
//! Settings are kept as a JSON blob under a fixed key. Loading never fails:
//! a missing or malformed record falls back to the defaults.

pub mod settings_store;

pub use settings_store::{
    load_settings, save_settings, FileSettingsStore, MemorySettingsStore, SettingsStore,
    StorageError, StorageResult, SETTINGS_KEY,
};
