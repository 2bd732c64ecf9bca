//! Per-run playback configuration and the message send pass.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::scheduler::{sleep_interruptible, CancellationFlag};
use crate::source::SourceSnapshot;
use crate::text_inject::{InputInjector, NamedKey};

/// Cadence used when the configured value is unusable, in seconds.
pub const MIN_CADENCE_SECS: f64 = 0.001;

/// Cadences below this are treated as zero and raised to [`MIN_CADENCE_SECS`].
const CADENCE_FLOOR_SECS: f64 = 0.00001;

/// Loop interval used when the configured value does not parse, in seconds.
pub const DEFAULT_LOOP_INTERVAL_SECS: f64 = 20.0;

/// Immutable settings for one armed run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Enabled message texts in order. Empty texts are kept and skipped at send time.
    pub messages: Vec<String>,
    pub cadence: Duration,
    pub loop_enabled: bool,
    pub loop_interval: Duration,
}

impl PlaybackConfig {
    pub fn from_snapshot(snapshot: &SourceSnapshot) -> Self {
        let mut slots: Vec<_> = snapshot.messages.iter().filter(|m| m.enabled).collect();
        slots.sort_by_key(|m| m.order);

        Self {
            messages: slots.into_iter().map(|m| m.text.clone()).collect(),
            cadence: parse_cadence(&snapshot.cadence_secs),
            loop_enabled: snapshot.loop_enabled,
            loop_interval: parse_loop_interval(&snapshot.loop_interval_secs),
        }
    }

    /// Number of messages that will actually be typed per pass.
    pub fn sendable_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_empty()).count()
    }
}

/// Parse the cadence, falling back to [`MIN_CADENCE_SECS`].
///
/// Values too large for a `Duration` fall back as well.
pub fn parse_cadence(raw: &str) -> Duration {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| if v < CADENCE_FLOOR_SECS { MIN_CADENCE_SECS } else { v })
        .and_then(|v| Duration::try_from_secs_f64(v).ok());
    parsed.unwrap_or_else(|| {
        debug!(value = raw, fallback = MIN_CADENCE_SECS, "Unusable cadence, using minimum");
        Duration::from_secs_f64(MIN_CADENCE_SECS)
    })
}

/// Parse the loop interval. Negative values clamp to zero; garbage and
/// values too large for a `Duration` fall back to [`DEFAULT_LOOP_INTERVAL_SECS`].
pub fn parse_loop_interval(raw: &str) -> Duration {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .and_then(|v| Duration::try_from_secs_f64(v.max(0.0)).ok());
    parsed.unwrap_or_else(|| {
        debug!(
            value = raw,
            fallback = DEFAULT_LOOP_INTERVAL_SECS,
            "Unusable loop interval, using default"
        );
        Duration::from_secs_f64(DEFAULT_LOOP_INTERVAL_SECS)
    })
}

/// What a single pass accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassReport {
    /// Messages typed and submitted.
    pub sent: usize,
    /// Messages whose injection failed.
    pub failed: usize,
    /// The pass stopped early because cancellation was requested.
    pub cancelled: bool,
}

/// Type every non-empty message once, in order.
///
/// Each message is: optional backspace, the text, Enter, then a cadence sleep.
/// Empty messages cost nothing. Cancellation is checked before each message
/// and throughout each sleep.
pub fn send_pass(
    config: &PlaybackConfig,
    injector: &dyn InputInjector,
    backspace_first: bool,
    cancel: &CancellationFlag,
) -> PassReport {
    let started = Instant::now();
    let mut report = PassReport::default();

    for (index, message) in config.messages.iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        if message.is_empty() {
            continue;
        }

        match send_message(injector, message, backspace_first) {
            Ok(()) => report.sent += 1,
            Err(e) => {
                warn!(index, error = %e, "Message injection failed, skipping");
                report.failed += 1;
            }
        }

        if !sleep_interruptible(config.cadence, cancel) {
            report.cancelled = true;
            break;
        }
    }

    debug!(
        sent = report.sent,
        failed = report.failed,
        cancelled = report.cancelled,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Send pass finished"
    );
    report
}

fn send_message(
    injector: &dyn InputInjector,
    message: &str,
    backspace_first: bool,
) -> hotmacro_core::Result<()> {
    if backspace_first {
        injector.press_key(NamedKey::Backspace)?;
    }
    injector.type_text(message)?;
    injector.press_key(NamedKey::Enter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
