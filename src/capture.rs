//! Capture session management
//!
//! One [`CaptureSession`] owns exactly one external capture process for
//! one channel's live segment. The monitor loop that opened the session
//! keeps the child handle and blocks on its exit; the supervisor tracks
//! a detached [`SessionHandle`] so stop requests can signal the process
//! without taking ownership of it.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::probe::StreamTool;
use crate::registry::Channel;

/// File extension of captured segments (MPEG-TS survives truncation).
const CAPTURE_EXT: &str = "ts";

/// Derive the destination filename for a capture run.
///
/// The timestamp is local time in a lexicographically sortable format so
/// segments of the same channel list in capture order.
pub fn capture_filename(channel_id: &str, title: &str, started_at: &DateTime<Local>) -> String {
    format!(
        "{}_{}_{}.{}",
        channel_id,
        title,
        started_at.format("%Y%m%d_%H%M%S"),
        CAPTURE_EXT
    )
}

/// A running external capture process for one live segment.
pub struct CaptureSession {
    channel_id: String,
    child: Child,
    pid: Option<u32>,
    output_path: PathBuf,
    started_at: DateTime<Local>,
}

impl CaptureSession {
    /// Spawn a capture process for a live channel.
    ///
    /// Ensures the recordings directory exists, derives the destination
    /// filename from channel id, normalized title and start time, and
    /// starts the external tool. Spawn failures propagate to the caller;
    /// this layer never retries.
    pub async fn open(
        tool: &StreamTool,
        channel: &Channel,
        title: &str,
        recordings_dir: &Path,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(recordings_dir)
            .await
            .with_context(|| format!("Failed to create recordings directory: {:?}", recordings_dir))?;

        let started_at = Local::now();
        let output_path = recordings_dir.join(capture_filename(&channel.id, title, &started_at));

        let child = tool
            .spawn_capture(&channel.url, &output_path)
            .with_context(|| format!("Failed to spawn capture for {}", channel.id))?;
        let pid = child.id();

        info!(
            "Capture started for {}: pid={:?}, output={:?}",
            channel.id, pid, output_path
        );

        Ok(Self {
            channel_id: channel.id.clone(),
            child,
            pid,
            output_path,
            started_at,
        })
    }

    /// Detached tracking entry for the supervisor's active-session map.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            channel_id: self.channel_id.clone(),
            pid: self.pid,
            output_path: self.output_path.clone(),
        }
    }

    /// Non-blocking liveness check of the capture process.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Block until the capture process exits and return its status.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Send the capture process a graceful termination signal.
    pub fn stop(&self) {
        if let Some(pid) = self.pid {
            terminate(pid);
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }
}

/// Supervisor-side handle to a running capture session.
///
/// Holds the process id, not the process: the owning monitor keeps the
/// child and observes its exit, while the supervisor uses this handle to
/// request termination from another task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub channel_id: String,
    pid: Option<u32>,
    pub output_path: PathBuf,
}

impl SessionHandle {
    /// Request graceful termination of the capture process.
    ///
    /// Fire-and-forget: the owning monitor observes the resulting exit
    /// through its `wait()` and clears its own tracking.
    pub fn stop(&self) {
        debug!(
            "Stopping capture for {} (pid={:?})",
            self.channel_id, self.pid
        );
        if let Some(pid) = self.pid {
            terminate(pid);
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[cfg(test)]
    pub fn for_tests(channel_id: &str, pid: Option<u32>, output_path: PathBuf) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            pid,
            output_path,
        }
    }
}

/// Ask a process to terminate gracefully. Does not block for exit.
fn terminate(pid: u32) {
    #[cfg(unix)]
    unsafe {
        if libc::kill(pid as i32, libc::SIGTERM) != 0 {
            warn!(
                "SIGTERM to pid {} failed: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(windows)]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .output();
    }
}
