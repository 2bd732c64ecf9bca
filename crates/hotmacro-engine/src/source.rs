//! Configuration sources read by the engine when a macro is armed.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use hotmacro_core::config::HotmacroConfig;
use hotmacro_core::types::MessageSlot;

/// Everything the engine reads from the configuration at arm time.
///
/// Durations stay as raw strings; parsing and fallbacks belong to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSnapshot {
    pub messages: Vec<MessageSlot>,
    pub trigger_combo: String,
    pub cadence_secs: String,
    pub loop_enabled: bool,
    pub loop_interval_secs: String,
    pub stop_combo: String,
    pub activate_combo: String,
}

impl From<&HotmacroConfig> for SourceSnapshot {
    fn from(config: &HotmacroConfig) -> Self {
        Self {
            messages: config.message_slots(),
            trigger_combo: config.hotkeys.trigger.clone(),
            cadence_secs: config.playback.cadence_secs.clone(),
            loop_enabled: config.playback.loop_enabled,
            loop_interval_secs: config.playback.loop_interval_secs.clone(),
            stop_combo: config.hotkeys.stop.clone(),
            activate_combo: config.hotkeys.activate.clone(),
        }
    }
}

impl Default for SourceSnapshot {
    fn default() -> Self {
        Self::from(&HotmacroConfig::default())
    }
}

/// Read access to the current settings.
pub trait ConfigSource: Send + Sync {
    fn snapshot(&self) -> SourceSnapshot;
}

/// Re-reads a TOML file on every snapshot, so edits apply at the next arm.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot::from(&HotmacroConfig::load_or_default(&self.path))
    }
}

/// In-memory source that a UI can update between runs.
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    current: Mutex<SourceSnapshot>,
}

impl StaticConfigSource {
    pub fn new(snapshot: SourceSnapshot) -> Self {
        Self {
            current: Mutex::new(snapshot),
        }
    }

    /// Replace the settings returned by future snapshots.
    pub fn update(&self, snapshot: SourceSnapshot) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Edit the settings in place.
    pub fn modify(&self, f: impl FnOnce(&mut SourceSnapshot)) {
        f(&mut self.current.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl ConfigSource for StaticConfigSource {
    fn snapshot(&self) -> SourceSnapshot {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
