//! Value types shared between the configuration layer and the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound on the number of message slots a macro can hold.
pub const MAX_MESSAGE_SLOTS: usize = 30;

/// Semantic role a registered hotkey plays in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HotkeyRole {
    /// Arms the macro (installs Trigger and Stop).
    Activate,
    /// Sends the messages, or starts the loop.
    Trigger,
    /// Aborts playback and disarms.
    Stop,
}

impl fmt::Display for HotkeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeyRole::Activate => write!(f, "Activate"),
            HotkeyRole::Trigger => write!(f, "Trigger"),
            HotkeyRole::Stop => write!(f, "Stop"),
        }
    }
}

/// One message row as collected by the configuration source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSlot {
    pub text: String,
    pub enabled: bool,
    /// Stable 1-based position in the list.
    pub order: usize,
}

impl MessageSlot {
    pub fn new(order: usize, text: impl Into<String>, enabled: bool) -> Self {
        Self {
            text: text.into(),
            enabled,
            order,
        }
    }
}
