//! Keystroke synthesis.
//!
//! On Windows, [`TextInjector`] types text as Unicode keystrokes and presses
//! named keys by virtual-key code, both through `SendInput`.
//!
//! On non-Windows, it provides a stub that logs and returns an error.

use std::fmt;

#[cfg(not(target_os = "windows"))]
use tracing::warn;

#[cfg(not(target_os = "windows"))]
use hotmacro_core::error::HotmacroError;
use hotmacro_core::error::Result;

/// Keys the engine presses by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Backspace,
}

impl NamedKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamedKey::Enter => "enter",
            NamedKey::Backspace => "backspace",
        }
    }

    #[cfg(target_os = "windows")]
    fn virtual_key(&self) -> u16 {
        use windows_sys::Win32::UI::Input::KeyboardAndMouse::{VK_BACK, VK_RETURN};
        match self {
            NamedKey::Enter => VK_RETURN,
            NamedKey::Backspace => VK_BACK,
        }
    }
}

impl fmt::Display for NamedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthesizes keystrokes into whatever application has focus.
pub trait InputInjector: Send + Sync {
    fn type_text(&self, text: &str) -> Result<()>;
    fn press_key(&self, key: NamedKey) -> Result<()>;
}

/// Production injector.
pub struct TextInjector;

impl TextInjector {
    /// Create a new text injector.
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextInjector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "windows")]
mod send_input {
    use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
    };

    use hotmacro_core::error::{HotmacroError, Result};

    pub(super) fn key_event(vk: u16, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: vk,
                    wScan: scan,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    /// Key down followed by key up.
    pub(super) fn press(vk: u16, scan: u16, flags: KEYBD_EVENT_FLAGS) -> [INPUT; 2] {
        [
            key_event(vk, scan, flags),
            key_event(vk, scan, flags | KEYEVENTF_KEYUP),
        ]
    }

    pub(super) fn send(inputs: &[INPUT]) -> Result<()> {
        let sent = unsafe {
            SendInput(
                inputs.len() as u32,
                inputs.as_ptr(),
                std::mem::size_of::<INPUT>() as i32,
            )
        };

        if sent as usize != inputs.len() {
            return Err(HotmacroError::Injection(format!(
                "SendInput only sent {} of {} events",
                sent,
                inputs.len()
            )));
        }
        Ok(())
    }
}

impl InputInjector for TextInjector {
    /// Type `text` as Unicode keystrokes, one UTF-16 unit per key pair.
    #[cfg(target_os = "windows")]
    fn type_text(&self, text: &str) -> Result<()> {
        use windows_sys::Win32::UI::Input::KeyboardAndMouse::KEYEVENTF_UNICODE;

        if text.is_empty() {
            return Ok(());
        }

        tracing::debug!(text_len = text.len(), "Typing text via SendInput");

        let inputs: Vec<_> = text
            .encode_utf16()
            .flat_map(|unit| send_input::press(0, unit, KEYEVENTF_UNICODE))
            .collect();
        send_input::send(&inputs)
    }

    #[cfg(target_os = "windows")]
    fn press_key(&self, key: NamedKey) -> Result<()> {
        tracing::trace!(key = %key, "Pressing key via SendInput");
        send_input::send(&send_input::press(key.virtual_key(), 0, 0))
    }

    /// Stub on non-Windows: logs and fails.
    #[cfg(not(target_os = "windows"))]
    fn type_text(&self, text: &str) -> Result<()> {
        warn!(
            text_len = text.len(),
            "TextInjector: SendInput not available on this platform"
        );
        Err(HotmacroError::Injection(
            "Text injection is only available on Windows".into(),
        ))
    }

    #[cfg(not(target_os = "windows"))]
    fn press_key(&self, key: NamedKey) -> Result<()> {
        warn!(key = %key, "TextInjector: SendInput not available on this platform");
        Err(HotmacroError::Injection(
            "Key injection is only available on Windows".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_key_names() {
        assert_eq!(NamedKey::Enter.to_string(), "enter");
        assert_eq!(NamedKey::Backspace.to_string(), "backspace");
        assert_eq!(NamedKey::Enter.as_str(), "enter");
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_injection_returns_error_on_non_windows() {
        let injector = TextInjector::new();
        let result = injector.type_text("hello");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("only available on Windows"));
        assert!(injector.press_key(NamedKey::Enter).is_err());
    }
}
