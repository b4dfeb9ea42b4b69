//! Per-channel supervision loop
//!
//! Each registered channel gets one monitor task that cycles through
//! probe -> capture -> wait-for-exit -> backoff until it is told to halt.
//! Every failure inside a cycle is treated as "not live" for that cycle,
//! so a transient tool or network error costs one backoff interval and
//! nothing else; the monitor itself never dies from a failed cycle.
//!
//! Halt requests are cooperative: the monitor checks its cancel flag and
//! the shared stopped-set at the top of each cycle. An active capture is
//! terminated out-of-band by the supervisor, which unblocks the wait
//! below and brings the loop back to that check.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capture::CaptureSession;
use crate::registry::Channel;
use crate::supervisor::Shared;

/// Timing constants of the polling loop.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Wait between unsuccessful or completed polling cycles.
    pub probe_backoff: Duration,
    /// Wait after opening a capture before trusting it as a recording.
    pub startup_grace: Duration,
    /// Upper bound on one liveness probe.
    pub probe_timeout: Duration,
    /// Settle delay after the startup reporting barrier.
    pub startup_settle: Duration,
}

impl Timing {
    pub fn from_secs(backoff: u64, grace: u64, timeout: u64, settle: u64) -> Self {
        Self {
            probe_backoff: Duration::from_secs(backoff),
            startup_grace: Duration::from_secs(grace),
            probe_timeout: Duration::from_secs(timeout),
            startup_settle: Duration::from_secs(settle),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::from_secs(10, 3, 30, 5)
    }
}

/// Run the supervision loop for one channel until halted.
///
/// The loop reports an initial "not recording" state so the startup
/// barrier sees every channel even when nothing is live.
pub(crate) async fn run(shared: Arc<Shared>, channel: Channel, cancel: Arc<AtomicBool>) {
    info!("Monitor started for {}", channel.id);
    let timing = shared.timing;

    shared.reporter.report(&channel.id, false);
    let mut recording = false;

    loop {
        if shared.halt_requested(&channel.id, &cancel) {
            break;
        }

        let Some(title) = shared.tool.probe(&channel.url, timing.probe_timeout).await else {
            if recording {
                shared.reporter.report(&channel.id, false);
                recording = false;
            }
            tokio::time::sleep(timing.probe_backoff).await;
            continue;
        };

        let mut session =
            match CaptureSession::open(&shared.tool, &channel, &title, &shared.recordings_dir).await
            {
                Ok(session) => session,
                Err(e) => {
                    warn!("Failed to open capture for {}: {:#}", channel.id, e);
                    if recording {
                        shared.reporter.report(&channel.id, false);
                        recording = false;
                    }
                    tokio::time::sleep(timing.probe_backoff).await;
                    continue;
                }
            };

        if !shared.register_session(&cancel, session.handle()) {
            // Halt was requested while the capture spawned; reap it so no
            // process outlives its tracking entry.
            session.stop();
            let _ = session.wait().await;
            continue;
        }

        tokio::time::sleep(timing.startup_grace).await;
        if session.is_alive() {
            if !recording {
                shared.reporter.report(&channel.id, true);
                recording = true;
            }
        } else {
            debug!(
                "Capture for {} exited within the startup grace period",
                channel.id
            );
        }

        let status = session.wait().await;
        shared.clear_session(&channel.id, session.pid());

        match status {
            Ok(status) if status.success() => {
                debug!("Capture for {} ended ({})", channel.id, status);
            }
            Ok(status) => {
                debug!("Capture for {} exited with {}", channel.id, status);
                if recording {
                    shared.reporter.report(&channel.id, false);
                    recording = false;
                }
            }
            Err(e) => {
                warn!("Failed waiting on capture for {}: {}", channel.id, e);
                if recording {
                    shared.reporter.report(&channel.id, false);
                    recording = false;
                }
            }
        }

        tokio::time::sleep(timing.probe_backoff).await;
    }

    shared.reporter.report(&channel.id, false);
    shared.retire_monitor(&channel.id, &cancel);
    info!("Monitor stopped for {}", channel.id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_matches_polling_contract() {
        let timing = Timing::default();
        assert_eq!(timing.probe_backoff, Duration::from_secs(10));
        assert_eq!(timing.startup_grace, Duration::from_secs(3));
        assert_eq!(timing.probe_timeout, Duration::from_secs(30));
        assert_eq!(timing.startup_settle, Duration::from_secs(5));
    }
}
