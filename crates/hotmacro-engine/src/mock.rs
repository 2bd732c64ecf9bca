//! In-process stand-ins for the OS hotkey hook and keystroke injection.
//!
//! Used by the test suites and handy for driving the engine without touching
//! the real keyboard.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use hotmacro_core::error::{HotmacroError, Result};

use crate::combo::KeyCombo;
use crate::hotkey::{HotkeyCallback, HotkeyHandle, HotkeyService};
use crate::text_inject::{InputInjector, NamedKey};

struct Registration {
    combo: KeyCombo,
    suppress: bool,
    callback: HotkeyCallback,
}

#[derive(Default)]
struct MockHotkeyState {
    next_id: u64,
    registrations: HashMap<HotkeyHandle, Registration>,
    rejected: HashSet<String>,
    total_registered: usize,
}

/// Hotkey service that records registrations and fires callbacks on demand.
#[derive(Default)]
pub struct MockHotkeyService {
    state: Mutex<MockHotkeyState>,
}

impl MockHotkeyService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a keypress. Returns `false` if nothing is registered for `combo`.
    ///
    /// The callback runs on the caller's thread with no lock held, so it may
    /// register or unregister hotkeys itself.
    pub fn press(&self, combo: &str) -> bool {
        let Ok(combo) = KeyCombo::parse(combo) else {
            return false;
        };
        let callback = self
            .lock()
            .registrations
            .values()
            .find(|r| r.combo == combo)
            .map(|r| r.callback.clone());
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Make future registrations of `combo` fail as if another process owned it.
    pub fn reject(&self, combo: &str) {
        if let Ok(combo) = KeyCombo::parse(combo) {
            self.lock().rejected.insert(combo.as_str().to_string());
        }
    }

    /// Drop every registration behind the engine's back.
    pub fn invalidate_all(&self) {
        self.lock().registrations.clear();
    }

    /// Canonical combos with a live registration, sorted.
    pub fn active_combos(&self) -> Vec<String> {
        let mut combos: Vec<String> = self
            .lock()
            .registrations
            .values()
            .map(|r| r.combo.to_string())
            .collect();
        combos.sort();
        combos
    }

    pub fn active_count(&self) -> usize {
        self.lock().registrations.len()
    }

    /// Live registrations for `combo`.
    pub fn count_for(&self, combo: &str) -> usize {
        self.lock()
            .registrations
            .values()
            .filter(|r| r.combo.as_str() == combo)
            .count()
    }

    pub fn is_suppressed(&self, combo: &str) -> bool {
        self.lock()
            .registrations
            .values()
            .any(|r| r.combo.as_str() == combo && r.suppress)
    }

    /// Successful registrations over the service's lifetime.
    pub fn total_registered(&self) -> usize {
        self.lock().total_registered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockHotkeyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HotkeyService for MockHotkeyService {
    fn register(
        &self,
        combo: &KeyCombo,
        suppress: bool,
        callback: HotkeyCallback,
    ) -> Result<HotkeyHandle> {
        let mut state = self.lock();
        if state.rejected.contains(combo.as_str()) {
            return Err(HotmacroError::HookConflict {
                combo: combo.to_string(),
                reason: "combo is owned by another process".to_string(),
            });
        }
        state.next_id += 1;
        let handle = HotkeyHandle::new(state.next_id);
        state.registrations.insert(
            handle,
            Registration {
                combo: combo.clone(),
                suppress,
                callback,
            },
        );
        state.total_registered += 1;
        Ok(handle)
    }

    fn unregister(&self, handle: HotkeyHandle) -> Result<()> {
        self.lock()
            .registrations
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| HotmacroError::Unregister(format!("unknown handle {}", handle)))
    }
}

/// One synthesized input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedEvent {
    Text(String),
    Key(NamedKey),
}

#[derive(Default)]
struct RecorderState {
    events: Vec<(Instant, InjectedEvent)>,
    failing_texts: HashSet<String>,
}

/// Injector that records every keystroke with a timestamp.
#[derive(Default)]
pub struct RecordingInjector {
    state: Mutex<RecorderState>,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `type_text(text)` fail.
    pub fn fail_text(&self, text: &str) {
        self.lock().failing_texts.insert(text.to_string());
    }

    pub fn events(&self) -> Vec<InjectedEvent> {
        self.lock().events.iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, InjectedEvent)> {
        self.lock().events.clone()
    }

    pub fn typed_texts(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|(_, e)| match e {
                InjectedEvent::Text(t) => Some(t.clone()),
                InjectedEvent::Key(_) => None,
            })
            .collect()
    }

    pub fn backspace_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|(_, e)| *e == InjectedEvent::Key(NamedKey::Backspace))
            .count()
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InputInjector for RecordingInjector {
    fn type_text(&self, text: &str) -> Result<()> {
        let mut state = self.lock();
        if state.failing_texts.contains(text) {
            return Err(HotmacroError::Injection(format!("refused to type '{}'", text)));
        }
        state
            .events
            .push((Instant::now(), InjectedEvent::Text(text.to_string())));
        Ok(())
    }

    fn press_key(&self, key: NamedKey) -> Result<()> {
        self.lock().events.push((Instant::now(), InjectedEvent::Key(key)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_press_invokes_matching_callback() {
        let service = MockHotkeyService::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        service
            .register(
                &KeyCombo::parse("f2").unwrap(),
                true,
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(service.press("F2"));
        assert!(!service.press("f3"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_unknown_handle_fails() {
        let service = MockHotkeyService::new();
        assert!(service.unregister(HotkeyHandle::new(9)).is_err());
    }

    #[test]
    fn test_recording_injector_order() {
        let injector = RecordingInjector::new();
        injector.press_key(NamedKey::Backspace).unwrap();
        injector.type_text("x").unwrap();
        assert_eq!(
            injector.events(),
            vec![
                InjectedEvent::Key(NamedKey::Backspace),
                InjectedEvent::Text("x".to_string())
            ]
        );
        assert_eq!(injector.backspace_count(), 1);
        injector.clear();
        assert!(injector.events().is_empty());
    }
}
