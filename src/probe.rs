//! Liveness probing via the external capture tool
//!
//! Asks the tool for stream metadata in JSON mode. Any failure along the
//! way (spawn error, timeout, non-zero exit, unparsable output, missing
//! title) collapses to "not live" - the monitor loop treats a failed
//! probe the same as an offline channel and retries after its backoff.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Maximum length of a normalized title, in characters. Keeps derived
/// filenames within OS path limits.
const MAX_TITLE_LEN: usize = 150;

/// Characters that cannot appear in filenames on common filesystems.
const ILLEGAL_FILENAME_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    metadata: ProbeMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeMetadata {
    title: Option<String>,
}

/// Wrapper around the external capture tool (streamlink by default).
///
/// The same executable serves both roles: metadata queries for liveness
/// probing and the actual capture runs.
#[derive(Debug, Clone)]
pub struct StreamTool {
    program: PathBuf,
}

impl StreamTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Probe a channel URL for a live broadcast.
    ///
    /// Returns the normalized stream title when the channel is live, or
    /// `None` otherwise. Never returns an error; the probe is bounded by
    /// `timeout` so a hung tool costs at most one polling cycle.
    pub async fn probe(&self, url: &str, timeout: Duration) -> Option<String> {
        // A timed-out probe must not leave the tool running; dropping the
        // output future detaches the child unless it is marked for kill.
        let command = Command::new(&self.program)
            .arg("--json")
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, command).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Probe spawn failed for {}: {}", url, e);
                return None;
            }
            Err(_) => {
                warn!("Probe timed out after {:?} for {}", timeout, url);
                return None;
            }
        };

        if !output.status.success() {
            debug!("Probe reported not live for {} ({})", url, output.status);
            return None;
        }

        let parsed: ProbeOutput = match serde_json::from_slice(&output.stdout) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Probe output unparsable for {}: {}", url, e);
                return None;
            }
        };

        let title = normalize_title(parsed.metadata.title.as_deref()?);
        if title.is_empty() {
            return None;
        }
        Some(title)
    }

    /// Spawn a capture run writing the stream to `output_path`.
    ///
    /// Selects the best available quality and keeps the tool quiet apart
    /// from errors. Stdout/stderr are discarded; the capture's progress
    /// is tracked through process liveness, not its output.
    pub fn spawn_capture(&self, url: &str, output_path: &Path) -> std::io::Result<Child> {
        Command::new(&self.program)
            .arg("--loglevel")
            .arg("error")
            .arg(url)
            .arg("best")
            .arg("-o")
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

/// Make a stream title safe for use in a filename.
///
/// Strips filesystem-illegal characters, collapses whitespace runs into
/// single underscores, and truncates to [`MAX_TITLE_LEN`] characters.
pub fn normalize_title(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_whitespace = false;

    for ch in raw.chars() {
        if ILLEGAL_FILENAME_CHARS.contains(&ch) {
            continue;
        }
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push('_');
                in_whitespace = true;
            }
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }

    if let Some((idx, _)) = out.char_indices().nth(MAX_TITLE_LEN) {
        out.truncate(idx);
    }
    out
}
