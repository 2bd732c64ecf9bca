use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{MessageSlot, MAX_MESSAGE_SLOTS};

/// Top-level configuration for hotmacro.
///
/// Loaded from `~/.hotmacro/config.toml` by default. The engine never reads
/// this struct directly; it goes through a configuration source that turns it
/// into a snapshot at the moment a macro is armed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HotmacroConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub hotkeys: HotkeysConfig,
    #[serde(default)]
    pub playback: PlaybackSettings,
    #[serde(default)]
    pub messages: Vec<MessageEntry>,
}

impl HotmacroConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HotmacroConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Message rows as ordered slots, capped at [`MAX_MESSAGE_SLOTS`].
    pub fn message_slots(&self) -> Vec<MessageSlot> {
        if self.messages.len() > MAX_MESSAGE_SLOTS {
            warn!(
                count = self.messages.len(),
                max = MAX_MESSAGE_SLOTS,
                "Too many messages configured, extra rows ignored"
            );
        }
        self.messages
            .iter()
            .take(MAX_MESSAGE_SLOTS)
            .enumerate()
            .map(|(i, m)| MessageSlot::new(i + 1, m.text.clone(), m.enabled))
            .collect()
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Key combos for the three hotkey roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeysConfig {
    /// Arms the macro from anywhere.
    pub activate: String,
    /// Sends the messages (or starts the loop) while armed.
    pub trigger: String,
    /// Stops playback and disarms.
    pub stop: String,
}

impl Default for HotkeysConfig {
    fn default() -> Self {
        Self {
            activate: "f12".to_string(),
            trigger: "f2".to_string(),
            stop: "esc".to_string(),
        }
    }
}

/// Timing settings.
///
/// Durations are kept as raw strings so that a bad value degrades to the
/// engine's fallback instead of rejecting the whole file. Both TOML numbers
/// and strings are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Delay between consecutive messages, in seconds.
    #[serde(deserialize_with = "number_or_string")]
    pub cadence_secs: String,
    /// Repeat the whole list until stopped.
    pub loop_enabled: bool,
    /// Delay between full passes when looping, in seconds.
    #[serde(deserialize_with = "number_or_string")]
    pub loop_interval_secs: String,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            cadence_secs: "0.5".to_string(),
            loop_enabled: false,
            loop_interval_secs: "20".to_string(),
        }
    }
}

/// One message row in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEntry {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
        Raw::Text(s) => s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HotmacroConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.hotkeys.activate, "f12");
        assert_eq!(config.hotkeys.trigger, "f2");
        assert_eq!(config.hotkeys.stop, "esc");
        assert_eq!(config.playback.cadence_secs, "0.5");
        assert_eq!(config.playback.loop_interval_secs, "20");
        assert!(!config.playback.loop_enabled);
        assert!(config.messages.is_empty());
    }

    #[test]
    fn test_parse_partial_config_fills_defaults() {
        let toml_str = r#"
[hotkeys]
trigger = "a"
"#;
        let config: HotmacroConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hotkeys.trigger, "a");
        assert_eq!(config.hotkeys.activate, "f12");
        assert_eq!(config.playback.cadence_secs, "0.5");
    }

    #[test]
    fn test_numeric_and_string_durations() {
        let toml_str = r#"
[playback]
cadence_secs = 0.25
loop_enabled = true
loop_interval_secs = 20
"#;
        let config: HotmacroConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.playback.cadence_secs, "0.25");
        assert_eq!(config.playback.loop_interval_secs, "20");
        assert!(config.playback.loop_enabled);

        let toml_str = r#"
[playback]
cadence_secs = "abc"
"#;
        let config: HotmacroConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.playback.cadence_secs, "abc");
    }

    #[test]
    fn test_messages_default_enabled() {
        let toml_str = r#"
[[messages]]
text = "hi"

[[messages]]
text = "off"
enabled = false
"#;
        let config: HotmacroConfig = toml::from_str(toml_str).unwrap();
        let slots = config.message_slots();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0], MessageSlot::new(1, "hi", true));
        assert_eq!(slots[1], MessageSlot::new(2, "off", false));
    }

    #[test]
    fn test_message_slots_truncated() {
        let config = HotmacroConfig {
            messages: (0..40)
                .map(|i| MessageEntry {
                    text: format!("m{}", i),
                    enabled: true,
                })
                .collect(),
            ..HotmacroConfig::default()
        };
        let slots = config.message_slots();
        assert_eq!(slots.len(), MAX_MESSAGE_SLOTS);
        assert_eq!(slots.last().unwrap().order, MAX_MESSAGE_SLOTS);
        assert_eq!(slots.last().unwrap().text, "m29");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = HotmacroConfig::default();
        config.hotkeys.trigger = "ctrl+shift+x".to_string();
        config.playback.loop_enabled = true;
        config.messages.push(MessageEntry {
            text: "hello".to_string(),
            enabled: true,
        });
        config.save(&path).unwrap();

        let loaded = HotmacroConfig::load(&path).unwrap();
        assert_eq!(loaded.hotkeys.trigger, "ctrl+shift+x");
        assert!(loaded.playback.loop_enabled);
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].text, "hello");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = HotmacroConfig::load_or_default(&dir.path().join("missing.toml"));
        assert_eq!(config.hotkeys.activate, "f12");
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[hotkeys\ntrigger = ").unwrap();
        let err = HotmacroConfig::load(&path).unwrap_err();
        assert!(matches!(err, crate::HotmacroError::Config(_)));
    }
}
