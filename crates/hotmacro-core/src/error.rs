use thiserror::Error;

use crate::types::HotkeyRole;

/// Top-level error type for hotmacro.
///
/// None of these are fatal to the engine: each one degrades a single
/// hotkey role or a single run, and the caller decides whether to log it
/// or surface it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HotmacroError {
    /// The combo string is empty or does not match the hotkey grammar.
    #[error("Invalid key combo '{combo}': {reason}")]
    InvalidCombo { combo: String, reason: String },

    /// Another role already owns this combo in the binding table.
    #[error("Key combo '{combo}' is already bound to the {role} hotkey")]
    AlreadyBound { combo: String, role: HotkeyRole },

    /// The OS hook refused the registration (e.g. the combo is owned by another process).
    #[error("Hotkey '{combo}' was rejected by the system: {reason}")]
    HookConflict { combo: String, reason: String },

    #[error("Hotkey unregister failed: {0}")]
    Unregister(String),

    #[error("Input injection error: {0}")]
    Injection(String),

    #[error("Engine busy: {0}")]
    Busy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for HotmacroError {
    fn from(err: toml::de::Error) -> Self {
        HotmacroError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for HotmacroError {
    fn from(err: toml::ser::Error) -> Self {
        HotmacroError::Config(err.to_string())
    }
}

/// A specialized `Result` type for hotmacro operations.
pub type Result<T> = std::result::Result<T, HotmacroError>;
