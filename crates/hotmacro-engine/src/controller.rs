//! UI-facing façade over the playback engine.

use std::sync::Arc;

use tracing::{info, warn};

use hotmacro_core::error::Result;

use crate::engine::{MacroEngine, StartOutcome};
use crate::state::EngineState;

/// Start/Stop surface for a UI or CLI.
///
/// Cloning is cheap; every clone drives the same engine.
#[derive(Debug, Clone)]
pub struct MacroController {
    engine: Arc<MacroEngine>,
}

impl MacroController {
    pub fn new(engine: Arc<MacroEngine>) -> Self {
        Self { engine }
    }

    /// Arm the macro. Same as pressing the Activate hotkey.
    pub fn start(&self) -> Result<StartOutcome> {
        let outcome = self.engine.start()?;
        if let StartOutcome::Armed { run_id, unbound } = &outcome {
            for (role, error) in unbound {
                warn!(%run_id, role = %role, error = %error, "Hotkey unavailable for this run");
            }
            info!(%run_id, "Macro started");
        }
        Ok(outcome)
    }

    /// Disarm the macro. Returns immediately even if a loop is still winding down.
    pub fn stop(&self) -> bool {
        self.engine.stop()
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    /// Whether a Start button should be enabled.
    pub fn can_start(&self) -> bool {
        !self.state().is_active()
    }

    /// Whether a Stop button should be enabled.
    pub fn can_stop(&self) -> bool {
        self.state().is_active()
    }

    pub fn set_activate_combo(&self, raw: &str) -> Result<()> {
        self.engine.set_activate_combo(raw)
    }

    pub fn engine(&self) -> &Arc<MacroEngine> {
        &self.engine
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::HotkeyService;
    use crate::mock::{MockHotkeyService, RecordingInjector};
    use crate::source::{ConfigSource, StaticConfigSource};
    use crate::text_inject::InputInjector;
    use hotmacro_core::error::HotmacroError;

    fn controller() -> MacroController {
        let engine = MacroEngine::new(
            Arc::new(StaticConfigSource::default()) as Arc<dyn ConfigSource>,
            Arc::new(MockHotkeyService::new()) as Arc<dyn HotkeyService>,
            Arc::new(RecordingInjector::new()) as Arc<dyn InputInjector>,
        );
        MacroController::new(engine)
    }

    #[test]
    fn test_button_enablement_follows_state() {
        let controller = controller();
        assert!(controller.can_start());
        assert!(!controller.can_stop());

        controller.start().unwrap();
        assert_eq!(controller.state(), EngineState::Armed);
        assert!(!controller.can_start());
        assert!(controller.can_stop());

        assert!(controller.stop());
        assert!(controller.can_start());
        assert!(!controller.stop());
    }

    #[test]
    fn test_second_start_reports_already_active() {
        let controller = controller();
        controller.start().unwrap();
        let outcome = controller.start().unwrap();
        assert!(matches!(
            outcome,
            StartOutcome::AlreadyActive(EngineState::Armed)
        ));
    }

    #[test]
    fn test_set_activate_combo_rejects_garbage() {
        let controller = controller();
        let err = controller.set_activate_combo("ctrl+shift").unwrap_err();
        assert!(matches!(err, HotmacroError::InvalidCombo { .. }));
        assert_eq!(
            controller.engine().activate_combo().unwrap().as_str(),
            "f12"
        );
    }
}
