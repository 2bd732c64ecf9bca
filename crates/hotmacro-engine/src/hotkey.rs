//! Global hotkey registration.
//!
//! [`HotkeyService`] is the seam between the engine and the OS-level key hook.
//! Callbacks are delivered one at a time on a single dispatcher thread, so the
//! engine never sees two hotkey callbacks running concurrently.
//!
//! On Windows, [`GlobalHotkeyService`] uses the `global-hotkey` crate. The
//! `GlobalHotKeyManager` is not `Send`, so it lives on a dedicated service
//! thread that pumps the Win32 message queue and executes register/unregister
//! commands sent over a channel. Matched presses are forwarded to a separate
//! dispatcher thread, which lets a callback register or unregister hotkeys
//! without deadlocking the service thread.
//!
//! On non-Windows, the service constructs fine but every registration fails.

use std::fmt;
use std::sync::Arc;

#[cfg(not(target_os = "windows"))]
use tracing::warn;

use hotmacro_core::error::{HotmacroError, Result};

use crate::combo::KeyCombo;

/// Callback invoked when a registered combo is pressed.
pub type HotkeyCallback = Arc<dyn Fn() + Send + Sync>;

/// Opaque handle for one live registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotkeyHandle(u64);

impl HotkeyHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HotkeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// System-wide key interception.
pub trait HotkeyService: Send + Sync {
    /// Register `combo`. When `suppress` is set, the physical keypress must
    /// not reach the foreground application.
    fn register(
        &self,
        combo: &KeyCombo,
        suppress: bool,
        callback: HotkeyCallback,
    ) -> Result<HotkeyHandle>;

    /// Remove a registration. May fail if the handle was already invalidated.
    fn unregister(&self, handle: HotkeyHandle) -> Result<()>;
}

/// Production hotkey backend.
pub struct GlobalHotkeyService {
    #[cfg(target_os = "windows")]
    backend: windows_backend::Backend,
}

impl GlobalHotkeyService {
    /// Start the service and dispatcher threads.
    #[cfg(target_os = "windows")]
    pub fn new() -> Result<Self> {
        let backend = windows_backend::Backend::start()?;
        tracing::info!("Global hotkey service started");
        Ok(Self { backend })
    }

    /// Stub constructor for non-Windows platforms.
    #[cfg(not(target_os = "windows"))]
    pub fn new() -> Result<Self> {
        warn!("Global hotkeys are only available on Windows; registrations will fail");
        Ok(Self {})
    }

    /// Unregister everything and stop the background threads.
    #[cfg(target_os = "windows")]
    pub fn shutdown(&self) {
        self.backend.shutdown();
    }

    /// Stub shutdown.
    #[cfg(not(target_os = "windows"))]
    pub fn shutdown(&self) {}
}

impl HotkeyService for GlobalHotkeyService {
    #[cfg(target_os = "windows")]
    fn register(
        &self,
        combo: &KeyCombo,
        suppress: bool,
        callback: HotkeyCallback,
    ) -> Result<HotkeyHandle> {
        if !suppress {
            tracing::debug!(combo = %combo, "RegisterHotKey always consumes the keypress");
        }
        self.backend.register(combo, callback)
    }

    #[cfg(not(target_os = "windows"))]
    fn register(
        &self,
        combo: &KeyCombo,
        _suppress: bool,
        _callback: HotkeyCallback,
    ) -> Result<HotkeyHandle> {
        Err(HotmacroError::HookConflict {
            combo: combo.to_string(),
            reason: "global hotkeys are only available on Windows".to_string(),
        })
    }

    #[cfg(target_os = "windows")]
    fn unregister(&self, handle: HotkeyHandle) -> Result<()> {
        self.backend.unregister(handle)
    }

    #[cfg(not(target_os = "windows"))]
    fn unregister(&self, handle: HotkeyHandle) -> Result<()> {
        Err(HotmacroError::Unregister(format!(
            "no registration for handle {}",
            handle
        )))
    }
}

#[cfg(target_os = "windows")]
impl Drop for GlobalHotkeyService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(target_os = "windows")]
mod windows_backend {
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use global_hotkey::hotkey::HotKey;
    use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    };

    use hotmacro_core::error::{HotmacroError, Result};

    use super::{HotkeyCallback, HotkeyHandle};
    use crate::combo::KeyCombo;

    /// How often the service thread pumps messages and drains commands.
    const POLL_INTERVAL: Duration = Duration::from_millis(10);

    type CallbackMap = Arc<Mutex<HashMap<u32, HotkeyCallback>>>;

    enum Command {
        Register {
            hotkey: HotKey,
            reply: Sender<Result<()>>,
        },
        Unregister {
            id: u32,
            reply: Sender<Result<()>>,
        },
        Shutdown,
    }

    pub(super) struct Backend {
        commands: Mutex<Sender<Command>>,
        callbacks: CallbackMap,
        threads: Mutex<Vec<JoinHandle<()>>>,
    }

    impl Backend {
        pub(super) fn start() -> Result<Self> {
            let (command_tx, command_rx) = mpsc::channel();
            let (pressed_tx, pressed_rx) = mpsc::channel();
            let (ready_tx, ready_rx) = mpsc::channel();
            let callbacks: CallbackMap = Arc::new(Mutex::new(HashMap::new()));

            let service = thread::Builder::new()
                .name("hotmacro-hotkeys".to_string())
                .spawn(move || run_service(command_rx, pressed_tx, ready_tx))?;

            ready_rx
                .recv()
                .map_err(|_| hook_error("", "hotkey service thread exited during startup"))??;

            let dispatch_callbacks = Arc::clone(&callbacks);
            let dispatcher = thread::Builder::new()
                .name("hotmacro-dispatch".to_string())
                .spawn(move || run_dispatcher(pressed_rx, dispatch_callbacks))?;

            Ok(Self {
                commands: Mutex::new(command_tx),
                callbacks,
                threads: Mutex::new(vec![service, dispatcher]),
            })
        }

        pub(super) fn register(
            &self,
            combo: &KeyCombo,
            callback: HotkeyCallback,
        ) -> Result<HotkeyHandle> {
            let hotkey =
                HotKey::from_str(combo.as_str()).map_err(|e| HotmacroError::InvalidCombo {
                    combo: combo.to_string(),
                    reason: e.to_string(),
                })?;

            let (reply_tx, reply_rx) = mpsc::channel();
            self.send(Command::Register {
                hotkey,
                reply: reply_tx,
            })?;
            reply_rx
                .recv()
                .map_err(|_| hook_error(combo.as_str(), "hotkey service stopped"))?
                .map_err(|e| match e {
                    HotmacroError::HookConflict { reason, .. } => hook_error(combo.as_str(), &reason),
                    other => other,
                })?;

            let id = hotkey.id();
            self.callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, callback);
            tracing::info!(combo = %combo, id, "Global hotkey registered");
            Ok(HotkeyHandle::new(u64::from(id)))
        }

        pub(super) fn unregister(&self, handle: HotkeyHandle) -> Result<()> {
            let id = u32::try_from(handle.id())
                .map_err(|_| HotmacroError::Unregister(format!("bad handle {}", handle)))?;
            self.callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);

            let (reply_tx, reply_rx) = mpsc::channel();
            self.send(Command::Unregister { id, reply: reply_tx })?;
            reply_rx
                .recv()
                .map_err(|_| HotmacroError::Unregister("hotkey service stopped".to_string()))?
        }

        pub(super) fn shutdown(&self) {
            let _ = self.send(Command::Shutdown);
            let threads: Vec<JoinHandle<()>> = self
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .collect();
            for handle in threads {
                let _ = handle.join();
            }
        }

        fn send(&self, command: Command) -> Result<()> {
            self.commands
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(command)
                .map_err(|_| hook_error("", "hotkey service stopped"))
        }
    }

    fn hook_error(combo: &str, reason: &str) -> HotmacroError {
        HotmacroError::HookConflict {
            combo: combo.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Owns the manager; must stay on one thread for its whole life.
    fn run_service(commands: Receiver<Command>, pressed: Sender<u32>, ready: Sender<Result<()>>) {
        let manager = match GlobalHotKeyManager::new() {
            Ok(m) => {
                let _ = ready.send(Ok(()));
                m
            }
            Err(e) => {
                let _ = ready.send(Err(hook_error(
                    "",
                    &format!("failed to create hotkey manager: {}", e),
                )));
                return;
            }
        };
        let mut registered: HashMap<u32, HotKey> = HashMap::new();

        loop {
            pump_messages();

            while let Ok(command) = commands.try_recv() {
                match command {
                    Command::Register { hotkey, reply } => {
                        let result = manager
                            .register(hotkey)
                            .map(|()| {
                                registered.insert(hotkey.id(), hotkey);
                            })
                            .map_err(|e| hook_error("", &e.to_string()));
                        let _ = reply.send(result);
                    }
                    Command::Unregister { id, reply } => {
                        let result = match registered.remove(&id) {
                            Some(hotkey) => manager
                                .unregister(hotkey)
                                .map_err(|e| HotmacroError::Unregister(e.to_string())),
                            None => Err(HotmacroError::Unregister(format!(
                                "hotkey id {} is not registered",
                                id
                            ))),
                        };
                        let _ = reply.send(result);
                    }
                    Command::Shutdown => {
                        for (_, hotkey) in registered.drain() {
                            let _ = manager.unregister(hotkey);
                        }
                        tracing::info!("Global hotkey service stopped");
                        return;
                    }
                }
            }

            while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
                if event.state() == HotKeyState::Pressed
                    && registered.contains_key(&event.id())
                    && pressed.send(event.id()).is_err()
                {
                    return;
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Invokes callbacks serially, in press order.
    fn run_dispatcher(pressed: Receiver<u32>, callbacks: CallbackMap) {
        for id in pressed {
            let callback = callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&id)
                .cloned();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    fn pump_messages() {
        // SAFETY: MSG is plain data; PeekMessageW only writes into it.
        unsafe {
            let mut msg: MSG = std::mem::zeroed();
            while PeekMessageW(&mut msg, 0, 0, 0, PM_REMOVE) != 0 {
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_roundtrip() {
        let handle = HotkeyHandle::new(42);
        assert_eq!(handle.id(), 42);
        assert_eq!(handle.to_string(), "#42");
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_global_service_stub_rejects_registration() {
        let service = GlobalHotkeyService::new().unwrap();
        let combo = KeyCombo::parse("f2").unwrap();
        let result = service.register(&combo, true, Arc::new(|| {}));
        assert!(matches!(result, Err(HotmacroError::HookConflict { .. })));
        assert!(service.unregister(HotkeyHandle::new(1)).is_err());
        service.shutdown();
    }
}
