//! Per-channel recording state and redraw triggering
//!
//! Monitors report state transitions here; the shell loop listens on the
//! redraw channel and repaints the status display. Updates are debounced
//! per channel: reporting an unchanged state is a no-op, so a monitor
//! can report "not recording" every failed cycle without repaint storms.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Tracks which channels are currently recording and signals the display
/// when that picture changes.
pub struct StatusReporter {
    states: Mutex<HashMap<String, bool>>,
    suppressed: AtomicBool,
    redraw_tx: mpsc::UnboundedSender<()>,
}

impl StatusReporter {
    /// Create a reporter and the redraw stream consumed by the shell loop.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (redraw_tx, redraw_rx) = mpsc::unbounded_channel();
        (
            Self {
                states: Mutex::new(HashMap::new()),
                suppressed: AtomicBool::new(false),
                redraw_tx,
            },
            redraw_rx,
        )
    }

    /// Record a channel's recording state.
    ///
    /// No-op when the state is unchanged. On change, updates the record
    /// and, unless suppressed, emits one redraw trigger.
    pub fn report(&self, channel_id: &str, recording: bool) {
        let changed = {
            let mut states = self.states.lock().expect("status states lock");
            match states.insert(channel_id.to_string(), recording) {
                Some(previous) => previous != recording,
                None => true,
            }
        };

        if !changed {
            return;
        }

        debug!("Channel {} recording={}", channel_id, recording);
        if !self.suppressed.load(Ordering::SeqCst) {
            let _ = self.redraw_tx.send(());
        }
    }

    /// Drop a channel's state entirely (channel removed).
    pub fn forget(&self, channel_id: &str) {
        self.states.lock().expect("status states lock").remove(channel_id);
    }

    /// Whether the channel is currently marked as recording.
    pub fn recording(&self, channel_id: &str) -> bool {
        self.states
            .lock()
            .expect("status states lock")
            .get(channel_id)
            .copied()
            .unwrap_or(false)
    }

    /// Whether every listed channel has reported at least one state.
    pub fn has_reported<'a>(&self, channel_ids: impl IntoIterator<Item = &'a str>) -> bool {
        let states = self.states.lock().expect("status states lock");
        channel_ids.into_iter().all(|id| states.contains_key(id))
    }

    /// Suppress or re-enable redraw triggers (startup barrier).
    pub fn set_suppressed(&self, suppressed: bool) {
        self.suppressed.store(suppressed, Ordering::SeqCst);
    }

    /// Force a repaint regardless of state changes.
    pub fn trigger_redraw(&self) {
        let _ = self.redraw_tx.send(());
    }

    pub fn snapshot(&self) -> HashMap<String, bool> {
        self.states.lock().expect("status states lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_report_triggers_once() {
        let (reporter, mut redraw_rx) = StatusReporter::new();

        reporter.report("@alice", true);
        reporter.report("@alice", true);

        assert!(redraw_rx.try_recv().is_ok());
        assert!(redraw_rx.try_recv().is_err());
        assert!(reporter.recording("@alice"));
    }

    #[test]
    fn test_initial_report_is_a_change() {
        let (reporter, mut redraw_rx) = StatusReporter::new();

        reporter.report("@alice", false);

        assert!(redraw_rx.try_recv().is_ok());
        assert!(!reporter.recording("@alice"));
    }

    #[test]
    fn test_suppressed_reports_update_state_without_redraw() {
        let (reporter, mut redraw_rx) = StatusReporter::new();
        reporter.set_suppressed(true);

        reporter.report("@alice", true);

        assert!(redraw_rx.try_recv().is_err());
        assert!(reporter.recording("@alice"));
    }

    #[test]
    fn test_different_channels_both_take_effect() {
        let (reporter, mut redraw_rx) = StatusReporter::new();

        reporter.report("@alice", true);
        reporter.report("@bob", true);

        assert!(redraw_rx.try_recv().is_ok());
        assert!(redraw_rx.try_recv().is_ok());
        assert!(reporter.recording("@alice"));
        assert!(reporter.recording("@bob"));
    }

    #[test]
    fn test_has_reported_barrier() {
        let (reporter, _redraw_rx) = StatusReporter::new();

        reporter.report("@alice", false);
        assert!(reporter.has_reported(["@alice"]));
        assert!(!reporter.has_reported(["@alice", "@bob"]));
    }

    #[test]
    fn test_forget_clears_state() {
        let (reporter, _redraw_rx) = StatusReporter::new();

        reporter.report("@alice", true);
        reporter.forget("@alice");

        assert!(!reporter.recording("@alice"));
        assert!(!reporter.has_reported(["@alice"]));
    }
}
