//! Playback engine states and the transitions allowed between them.
//!
//! - Idle -> Armed (start)
//! - Armed -> Sending (trigger, looping off)
//! - Sending -> Armed (pass finished)
//! - Armed -> Looping (trigger, looping on)
//! - Armed / Sending / Looping -> Idle (stop)

use std::fmt;

/// Operational state of the playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// No Trigger or Stop hotkey installed. Only Activate is live.
    Idle,
    /// Trigger and Stop installed, waiting for the trigger.
    Armed,
    /// A single manual pass is typing messages.
    Sending,
    /// The loop scheduler owns playback until Stop.
    Looping,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Armed => write!(f, "Armed"),
            EngineState::Sending => write!(f, "Sending"),
            EngineState::Looping => write!(f, "Looping"),
        }
    }
}

impl EngineState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &EngineState) -> bool {
        matches!(
            (self, target),
            (EngineState::Idle, EngineState::Armed)
                | (EngineState::Armed, EngineState::Sending)
                | (EngineState::Sending, EngineState::Armed)
                | (EngineState::Armed, EngineState::Looping)
                // Stop
                | (EngineState::Armed, EngineState::Idle)
                | (EngineState::Sending, EngineState::Idle)
                | (EngineState::Looping, EngineState::Idle)
        )
    }

    /// True while a run is armed or playing.
    pub fn is_active(&self) -> bool {
        *self != EngineState::Idle
    }
}

// =============================================================================
// Tests
// =============================================================================
