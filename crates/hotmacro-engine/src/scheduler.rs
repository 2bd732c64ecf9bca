//! Repeating send loop with cooperative cancellation.
//!
//! The loop runs on its own OS thread and shares exactly two things with the
//! engine: the immutable [`PlaybackConfig`] and a [`CancellationFlag`]. It never
//! takes the engine lock. Stop sets the flag and returns immediately; the loop
//! notices within one [`SLEEP_SLICE`] while sleeping, or after the keystroke
//! currently being injected. That slice is the only Stop latency; a long loop
//! interval does not delay it.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::playback::{send_pass, PlaybackConfig};
use crate::text_inject::InputInjector;

/// Granularity at which sleeps re-check the cancellation flag.
pub const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// Shared stop request for one run.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleep for `duration` in [`SLEEP_SLICE`] steps.
///
/// Returns `false` as soon as the flag is observed set, `true` if the full
/// duration elapsed. A duration past the clock's range sleeps until cancelled.
pub fn sleep_interruptible(duration: Duration, cancel: &CancellationFlag) -> bool {
    let deadline = Instant::now().checked_add(duration);
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let remaining = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                deadline - now
            }
            None => SLEEP_SLICE,
        };
        thread::sleep(remaining.min(SLEEP_SLICE));
    }
}

/// Spawns the repeating loop.
pub struct LoopScheduler;

impl LoopScheduler {
    /// Start a loop thread: full pass, loop-interval sleep, repeat until cancelled.
    ///
    /// Loop passes never inject a leading backspace; only the manual trigger
    /// keystroke needs erasing.
    pub fn spawn(
        config: Arc<PlaybackConfig>,
        injector: Arc<dyn InputInjector>,
        cancel: CancellationFlag,
    ) -> io::Result<LoopHandle> {
        let thread_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name("hotmacro-loop".to_string())
            .spawn(move || run_loop(&config, injector.as_ref(), &thread_cancel))?;
        Ok(LoopHandle { handle, cancel })
    }
}

fn run_loop(config: &PlaybackConfig, injector: &dyn InputInjector, cancel: &CancellationFlag) -> u64 {
    info!(
        messages = config.sendable_count(),
        cadence_ms = config.cadence.as_millis() as u64,
        interval_ms = config.loop_interval.as_millis() as u64,
        "Send loop started"
    );

    let mut cycles = 0u64;
    while !cancel.is_cancelled() {
        let report = send_pass(config, injector, false, cancel);
        if report.cancelled {
            break;
        }
        cycles += 1;
        debug!(cycle = cycles, sent = report.sent, "Loop cycle complete");
        // A pass that typed nothing returns instantly; keep an empty list
        // with a zero interval from spinning.
        let pause = if report.sent == 0 && report.failed == 0 {
            config.loop_interval.max(SLEEP_SLICE)
        } else {
            config.loop_interval
        };
        if !sleep_interruptible(pause, cancel) {
            break;
        }
    }

    info!(cycles, "Send loop stopped");
    cycles
}

/// Handle to a running loop thread. Dropping it detaches the thread.
#[derive(Debug)]
pub struct LoopHandle {
    handle: JoinHandle<u64>,
    cancel: CancellationFlag,
}

impl LoopHandle {
    /// Request the loop to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread and return the number of completed cycles.
    pub fn join(self) -> thread::Result<u64> {
        self.handle.join()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
