//! Playback engine driving the hotkey-triggered macro lifecycle.
//!
//! The `MacroEngine` owns the [`EngineState`], the hotkey bindings and the
//! current run. Hotkey callbacks hold only a weak reference back to the
//! engine and go through the same entry points as the UI (`start`, `fire`,
//! `stop`), so state is never mutated from anywhere else.
//!
//! The engine lock is never held while typing or sleeping. A manual send
//! pass runs with the lock released, on the caller's thread for a direct
//! `fire` or on a short-lived send thread when the Trigger hotkey fires. A
//! loop runs on its own thread and only shares the run's cancellation flag.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hotmacro_core::error::{HotmacroError, Result};
use hotmacro_core::types::HotkeyRole;

use crate::binding::BindingTable;
use crate::combo::KeyCombo;
use crate::hotkey::{HotkeyCallback, HotkeyHandle, HotkeyService};
use crate::playback::{send_pass, PassReport, PlaybackConfig};
use crate::scheduler::{CancellationFlag, LoopHandle, LoopScheduler};
use crate::source::ConfigSource;
use crate::state::EngineState;
use crate::text_inject::InputInjector;

/// Result of [`MacroEngine::start`].
#[derive(Debug)]
pub enum StartOutcome {
    /// The macro is armed. Roles that could not be bound are listed with the reason.
    Armed {
        run_id: Uuid,
        unbound: Vec<(HotkeyRole, HotmacroError)>,
    },
    /// A run was already armed or playing; nothing changed.
    AlreadyActive(EngineState),
}

/// Result of [`MacroEngine::fire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// A single pass ran to completion or was cut short by Stop.
    Sent(PassReport),
    /// The loop scheduler was spawned for this run.
    LoopStarted,
    /// The loop thread could not be spawned; the run stays armed.
    LoopSpawnFailed,
    /// The trigger does nothing in this state.
    Ignored(EngineState),
}

/// One armed cycle, from start until stop.
struct ActiveRun {
    id: Uuid,
    started_at: DateTime<Utc>,
    config: Arc<PlaybackConfig>,
    trigger: KeyCombo,
    cancel: CancellationFlag,
    /// Detached on stop, never joined.
    loop_handle: Option<LoopHandle>,
}

impl ActiveRun {
    fn elapsed_secs(&self) -> f64 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_milliseconds() as f64 / 1000.0
    }
}

struct EngineInner {
    state: EngineState,
    bindings: BindingTable,
    activate_combo: Option<KeyCombo>,
    run: Option<ActiveRun>,
    loop_started: bool,
    loops_spawned: usize,
}

impl EngineInner {
    fn transition(&mut self, target: EngineState) -> bool {
        if self.state.can_transition_to(&target) {
            debug!("Engine state: {} -> {}", self.state, target);
            self.state = target;
            true
        } else {
            debug!("Ignoring invalid transition: {} -> {}", self.state, target);
            false
        }
    }
}

/// The hotkey-driven playback state machine.
pub struct MacroEngine {
    me: Weak<MacroEngine>,
    source: Arc<dyn ConfigSource>,
    injector: Arc<dyn InputInjector>,
    inner: Mutex<EngineInner>,
}

impl std::fmt::Debug for MacroEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MacroEngine")
            .field("state", &inner.state)
            .field("bindings", &inner.bindings)
            .field("run_id", &inner.run.as_ref().map(|r| r.id))
            .field("loop_started", &inner.loop_started)
            .finish()
    }
}

impl MacroEngine {
    /// Create an Idle engine and install the Activate hotkey from the source.
    ///
    /// A bad or conflicting Activate combo is logged; the engine still works
    /// through direct `start`/`stop` calls.
    pub fn new(
        source: Arc<dyn ConfigSource>,
        hotkeys: Arc<dyn HotkeyService>,
        injector: Arc<dyn InputInjector>,
    ) -> Arc<Self> {
        let activate = source.snapshot().activate_combo;
        let engine = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            source,
            injector,
            inner: Mutex::new(EngineInner {
                state: EngineState::Idle,
                bindings: BindingTable::new(hotkeys),
                activate_combo: None,
                run: None,
                loop_started: false,
                loops_spawned: 0,
            }),
        });

        if let Err(e) = engine.set_activate_combo(&activate) {
            warn!(combo = %activate, error = %e, "Activate hotkey not installed");
        }
        engine
    }

    /// Returns the current engine state.
    pub fn state(&self) -> EngineState {
        self.lock().state
    }

    /// Identifier of the armed run, if any.
    pub fn run_id(&self) -> Option<Uuid> {
        self.lock().run.as_ref().map(|r| r.id)
    }

    /// Loop threads spawned over the engine's lifetime.
    pub fn loops_spawned(&self) -> usize {
        self.lock().loops_spawned
    }

    pub fn is_bound(&self, role: HotkeyRole) -> bool {
        self.lock().bindings.is_bound(role)
    }

    pub fn bound_roles(&self) -> Vec<HotkeyRole> {
        self.lock().bindings.bound_roles()
    }

    pub fn activate_combo(&self) -> Option<KeyCombo> {
        self.lock().activate_combo.clone()
    }

    /// Reassign the Activate hotkey. Only allowed while Idle.
    ///
    /// The previous binding is removed before the new one is registered. If
    /// registration fails the engine has no Activate hotkey until the next
    /// successful call or the next stop.
    pub fn set_activate_combo(&self, raw: &str) -> Result<()> {
        let combo = KeyCombo::parse(raw)?;
        let mut inner = self.lock();
        if inner.state != EngineState::Idle {
            return Err(HotmacroError::Busy(format!(
                "cannot reassign the Activate hotkey while {}",
                inner.state
            )));
        }
        inner.activate_combo = Some(combo.clone());
        self.bind_activate(&mut inner, &combo)?;
        Ok(())
    }

    /// Arm the macro: snapshot the configuration and install Stop and Trigger.
    ///
    /// A no-op unless Idle. An invalid trigger combo aborts the start and
    /// leaves the engine Idle. Any other binding failure is reported in the
    /// outcome and the engine arms without that role.
    pub fn start(&self) -> Result<StartOutcome> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.state != EngineState::Idle {
            debug!(state = %inner.state, "Start ignored, macro already active");
            return Ok(StartOutcome::AlreadyActive(inner.state));
        }

        let snapshot = self.source.snapshot();
        let trigger = KeyCombo::parse(&snapshot.trigger_combo)?;
        let config = Arc::new(PlaybackConfig::from_snapshot(&snapshot));

        // Stop goes first so it wins if Trigger asks for the same combo.
        let mut unbound = Vec::new();
        let stop_result = KeyCombo::parse(&snapshot.stop_combo).and_then(|stop| {
            inner
                .bindings
                .bind(HotkeyRole::Stop, &stop, self.callback(|engine| {
                    engine.stop();
                }))
        });
        if let Err(e) = stop_result {
            warn!(error = %e, "Armed without a Stop hotkey");
            unbound.push((HotkeyRole::Stop, e));
        }

        let trigger_result = inner.bindings.bind(
            HotkeyRole::Trigger,
            &trigger,
            self.callback(|engine| engine.fire_detached()),
        );
        if let Err(e) = trigger_result {
            warn!(error = %e, "Armed without a Trigger hotkey");
            unbound.push((HotkeyRole::Trigger, e));
        }

        let run = ActiveRun {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            config,
            trigger,
            cancel: CancellationFlag::new(),
            loop_handle: None,
        };
        info!(
            run_id = %run.id,
            trigger = %run.trigger,
            messages = run.config.sendable_count(),
            loop_enabled = run.config.loop_enabled,
            "Macro armed"
        );

        let run_id = run.id;
        inner.run = Some(run);
        inner.loop_started = false;
        inner.transition(EngineState::Armed);
        Ok(StartOutcome::Armed { run_id, unbound })
    }

    /// Trigger handler.
    ///
    /// With looping off, types one pass on the calling thread and returns to
    /// Armed. With looping on, spawns the loop once per run; later triggers
    /// are ignored until Stop.
    pub fn fire(&self) -> FireOutcome {
        let (config, backspace_first, cancel, run_id) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if inner.state != EngineState::Armed {
                debug!(state = %inner.state, "Trigger ignored");
                return FireOutcome::Ignored(inner.state);
            }
            let Some(run) = inner.run.as_mut() else {
                return FireOutcome::Ignored(inner.state);
            };

            if run.config.loop_enabled {
                if inner.loop_started {
                    return FireOutcome::Ignored(inner.state);
                }
                let spawned = LoopScheduler::spawn(
                    Arc::clone(&run.config),
                    Arc::clone(&self.injector),
                    run.cancel.clone(),
                );
                return match spawned {
                    Ok(handle) => {
                        info!(run_id = %run.id, "Send loop spawned");
                        run.loop_handle = Some(handle);
                        inner.loop_started = true;
                        inner.loops_spawned += 1;
                        inner.transition(EngineState::Looping);
                        FireOutcome::LoopStarted
                    }
                    Err(e) => {
                        warn!(run_id = %run.id, error = %e, "Failed to spawn send loop");
                        FireOutcome::LoopSpawnFailed
                    }
                };
            }

            let params = (
                Arc::clone(&run.config),
                run.trigger.is_single_char(),
                run.cancel.clone(),
                run.id,
            );
            inner.transition(EngineState::Sending);
            params
        };

        info!(run_id = %run_id, "Sending messages");
        let report = send_pass(&config, self.injector.as_ref(), backspace_first, &cancel);

        let mut inner = self.lock();
        let same_run = inner.run.as_ref().map(|r| r.id) == Some(run_id);
        if same_run && inner.state == EngineState::Sending {
            inner.transition(EngineState::Armed);
        }
        FireOutcome::Sent(report)
    }

    /// Run [`fire`](Self::fire) on a short-lived thread.
    ///
    /// Used by the Trigger hotkey so a manual pass never occupies the hotkey
    /// dispatcher, leaving the Stop hotkey able to cut the pass short.
    pub fn fire_detached(&self) {
        let Some(engine) = self.me.upgrade() else {
            return;
        };
        let spawned = thread::Builder::new()
            .name("hotmacro-send".to_string())
            .spawn(move || {
                engine.fire();
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn send thread");
        }
    }

    /// Disarm: cancel playback, drop Trigger and Stop, keep Activate.
    ///
    /// Returns immediately without waiting for a running loop to exit.
    /// Returns `false` if the engine was already Idle.
    pub fn stop(&self) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.state == EngineState::Idle {
            debug!("Stop ignored, macro not active");
            return false;
        }

        if let Some(run) = inner.run.take() {
            run.cancel.cancel();
            info!(
                run_id = %run.id,
                elapsed_secs = run.elapsed_secs(),
                from = %inner.state,
                loop_running = run.loop_handle.as_ref().is_some_and(|h| !h.is_finished()),
                "Macro stopped"
            );
        }

        inner.bindings.unbind_all();
        inner.loop_started = false;
        inner.transition(EngineState::Idle);

        // The hook may have been dropped outside the table's knowledge, so
        // Activate is always re-registered rather than checked.
        if let Some(combo) = inner.activate_combo.clone() {
            if let Err(e) = self.bind_activate(inner, &combo) {
                warn!(combo = %combo, error = %e, "Could not re-arm Activate hotkey");
            }
        }
        true
    }

    /// Stop any run and release every hotkey, Activate included.
    pub fn shutdown(&self) {
        self.stop();
        self.lock().bindings.unbind(HotkeyRole::Activate);
    }

    fn bind_activate(&self, inner: &mut EngineInner, combo: &KeyCombo) -> Result<HotkeyHandle> {
        inner.bindings.bind(
            HotkeyRole::Activate,
            combo,
            self.callback(|engine| {
                if let Err(e) = engine.start() {
                    warn!(error = %e, "Activate hotkey could not arm the macro");
                }
            }),
        )
    }

    fn callback(&self, action: fn(&MacroEngine)) -> HotkeyCallback {
        let me = self.me.clone();
        Arc::new(move || {
            if let Some(engine) = me.upgrade() {
                action(&engine);
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MacroEngine {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = inner.run.take() {
            run.cancel.cancel();
        }
        inner.bindings.unbind_all();
        inner.bindings.unbind(HotkeyRole::Activate);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockHotkeyService, RecordingInjector};
    use crate::source::{SourceSnapshot, StaticConfigSource};
    use hotmacro_core::types::MessageSlot;

    struct Fixture {
        source: Arc<StaticConfigSource>,
        hotkeys: Arc<MockHotkeyService>,
        injector: Arc<RecordingInjector>,
        engine: Arc<MacroEngine>,
    }

    fn fixture(modify: impl FnOnce(&mut SourceSnapshot)) -> Fixture {
        let mut snapshot = SourceSnapshot {
            messages: vec![MessageSlot::new(1, "hello", true)],
            cadence_secs: "0.001".to_string(),
            ..SourceSnapshot::default()
        };
        modify(&mut snapshot);
        let source = Arc::new(StaticConfigSource::new(snapshot));
        let hotkeys = Arc::new(MockHotkeyService::new());
        let injector = Arc::new(RecordingInjector::new());
        let engine = MacroEngine::new(
            Arc::clone(&source) as Arc<dyn ConfigSource>,
            Arc::clone(&hotkeys) as Arc<dyn HotkeyService>,
            Arc::clone(&injector) as Arc<dyn InputInjector>,
        );
        Fixture {
            source,
            hotkeys,
            injector,
            engine,
        }
    }

    #[test]
    fn test_new_engine_is_idle_with_activate_bound() {
        let f = fixture(|_| {});
        assert_eq!(f.engine.state(), EngineState::Idle);
        assert_eq!(f.engine.bound_roles(), vec![HotkeyRole::Activate]);
        assert_eq!(f.hotkeys.active_combos(), vec!["f12".to_string()]);
        assert!(f.engine.run_id().is_none());
    }

    #[test]
    fn test_invalid_activate_combo_is_not_fatal() {
        let f = fixture(|s| s.activate_combo = "ctrl+".to_string());
        assert_eq!(f.engine.state(), EngineState::Idle);
        assert!(f.engine.bound_roles().is_empty());
        assert!(matches!(f.engine.start(), Ok(StartOutcome::Armed { .. })));
    }

    #[test]
    fn test_start_arms_trigger_and_stop() {
        let f = fixture(|_| {});
        match f.engine.start().unwrap() {
            StartOutcome::Armed { unbound, .. } => assert!(unbound.is_empty()),
            other => panic!("Expected Armed, got {:?}", other),
        }
        assert_eq!(f.engine.state(), EngineState::Armed);
        assert_eq!(
            f.hotkeys.active_combos(),
            vec!["esc".to_string(), "f12".to_string(), "f2".to_string()]
        );
        assert!(f.engine.run_id().is_some());
    }

    #[test]
    fn test_start_with_invalid_trigger_stays_idle() {
        let f = fixture(|s| s.trigger_combo = "".to_string());
        let err = f.engine.start().unwrap_err();
        assert!(matches!(err, HotmacroError::InvalidCombo { .. }));
        assert_eq!(f.engine.state(), EngineState::Idle);
        assert_eq!(f.engine.bound_roles(), vec![HotkeyRole::Activate]);
    }

    #[test]
    fn test_trigger_conflict_reports_unbound_role() {
        let f = fixture(|_| {});
        f.hotkeys.reject("f2");
        match f.engine.start().unwrap() {
            StartOutcome::Armed { unbound, .. } => {
                assert_eq!(unbound.len(), 1);
                assert_eq!(unbound[0].0, HotkeyRole::Trigger);
                assert!(matches!(unbound[0].1, HotmacroError::HookConflict { .. }));
            }
            other => panic!("Expected Armed, got {:?}", other),
        }
        assert_eq!(f.engine.state(), EngineState::Armed);
        assert!(f.engine.is_bound(HotkeyRole::Stop));
        assert!(!f.engine.is_bound(HotkeyRole::Trigger));
    }

    #[test]
    fn test_fire_single_pass_returns_to_armed() {
        let f = fixture(|_| {});
        f.engine.start().unwrap();
        match f.engine.fire() {
            FireOutcome::Sent(report) => assert_eq!(report.sent, 1),
            other => panic!("Expected Sent, got {:?}", other),
        }
        assert_eq!(f.engine.state(), EngineState::Armed);
        assert_eq!(f.injector.typed_texts(), vec!["hello".to_string()]);

        // Trigger stays armed for repeated manual firing.
        f.engine.fire();
        assert_eq!(f.injector.typed_texts().len(), 2);
    }

    #[test]
    fn test_fire_while_idle_is_ignored() {
        let f = fixture(|_| {});
        assert_eq!(f.engine.fire(), FireOutcome::Ignored(EngineState::Idle));
        assert!(f.injector.events().is_empty());
    }

    #[test]
    fn test_fire_loop_mode_spawns_once() {
        let f = fixture(|s| {
            s.loop_enabled = true;
            s.loop_interval_secs = "10".to_string();
        });
        f.engine.start().unwrap();
        assert_eq!(f.engine.fire(), FireOutcome::LoopStarted);
        assert_eq!(f.engine.state(), EngineState::Looping);
        assert_eq!(f.engine.fire(), FireOutcome::Ignored(EngineState::Looping));
        assert_eq!(f.engine.loops_spawned(), 1);
        assert!(f.engine.stop());
    }

    #[test]
    fn test_stop_from_idle_is_noop() {
        let f = fixture(|_| {});
        assert!(!f.engine.stop());
        assert_eq!(f.engine.state(), EngineState::Idle);
        assert_eq!(f.engine.bound_roles(), vec![HotkeyRole::Activate]);
    }

    #[test]
    fn test_stop_rearms_lost_activate_binding() {
        let f = fixture(|_| {});
        f.engine.start().unwrap();
        f.hotkeys.invalidate_all();

        assert!(f.engine.stop());
        assert_eq!(f.engine.bound_roles(), vec![HotkeyRole::Activate]);
        assert_eq!(f.hotkeys.active_combos(), vec!["f12".to_string()]);
    }

    #[test]
    fn test_set_activate_combo_requires_idle() {
        let f = fixture(|_| {});
        f.engine.start().unwrap();
        let err = f.engine.set_activate_combo("f11").unwrap_err();
        assert!(matches!(err, HotmacroError::Busy(_)));
        assert_eq!(f.engine.activate_combo().unwrap().as_str(), "f12");

        f.engine.stop();
        f.engine.set_activate_combo("F11").unwrap();
        assert_eq!(f.engine.activate_combo().unwrap().as_str(), "f11");
        assert_eq!(f.hotkeys.active_combos(), vec!["f11".to_string()]);
    }

    #[test]
    fn test_start_survives_out_of_range_durations() {
        let f = fixture(|s| {
            s.cadence_secs = "1e20".to_string();
            s.loop_enabled = true;
            s.loop_interval_secs = "1e20".to_string();
        });
        assert!(matches!(f.engine.start(), Ok(StartOutcome::Armed { .. })));
        assert_eq!(f.engine.fire(), FireOutcome::LoopStarted);
        assert!(f.engine.stop());

        // Activate must still arm after the bad run.
        assert!(f.hotkeys.press("f12"));
        assert_eq!(f.engine.state(), EngineState::Armed);
        f.engine.stop();
    }

    #[test]
    fn test_snapshot_taken_at_start() {
        let f = fixture(|_| {});
        f.engine.start().unwrap();
        f.source.modify(|s| s.messages = vec![MessageSlot::new(1, "changed", true)]);
        f.engine.fire();
        assert_eq!(f.injector.typed_texts(), vec!["hello".to_string()]);

        f.engine.stop();
        f.engine.start().unwrap();
        f.engine.fire();
        assert_eq!(
            f.injector.typed_texts(),
            vec!["hello".to_string(), "changed".to_string()]
        );
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let f = fixture(|_| {});
        f.engine.start().unwrap();
        f.engine.shutdown();
        assert_eq!(f.engine.state(), EngineState::Idle);
        assert_eq!(f.hotkeys.active_count(), 0);
    }
}
