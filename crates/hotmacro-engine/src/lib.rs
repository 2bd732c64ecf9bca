//! Hotmacro Engine crate - Hotkey-triggered message playback.
//!
//! Arms a set of global hotkeys and types pre-written messages into the
//! focused window, once per trigger or on a repeating interval, through a
//! strict state machine: Idle -> Armed -> (Sending | Looping) -> Idle.
//! A Stop hotkey is honored promptly even mid-send.

pub mod binding;
pub mod combo;
pub mod controller;
pub mod engine;
pub mod hotkey;
pub mod mock;
pub mod playback;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod text_inject;

pub use binding::BindingTable;
pub use combo::{normalize, KeyCombo};
pub use controller::MacroController;
pub use engine::{FireOutcome, MacroEngine, StartOutcome};
pub use hotkey::{GlobalHotkeyService, HotkeyCallback, HotkeyHandle, HotkeyService};
pub use playback::{PassReport, PlaybackConfig};
pub use scheduler::{CancellationFlag, LoopHandle, LoopScheduler};
pub use source::{ConfigSource, FileConfigSource, SourceSnapshot, StaticConfigSource};
pub use state::EngineState;
pub use text_inject::{InputInjector, NamedKey, TextInjector};
