//! End-to-end monitor loop tests against a stub capture tool.
//!
//! The stub is a shell script that answers metadata probes with canned
//! JSON and plays the capture role by sleeping or exiting, so the full
//! probe -> capture -> wait -> backoff cycle runs with real processes
//! and real (shortened) timings.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use streamwatch::monitor::Timing;
use streamwatch::probe::StreamTool;
use streamwatch::registry::ChannelRegistry;
use streamwatch::status::StatusReporter;
use streamwatch::supervisor::{Supervisor, SupervisorSettings};
use tokio::sync::mpsc;

struct Harness {
    dir: PathBuf,
    supervisor: Supervisor,
    redraw_rx: mpsc::UnboundedReceiver<()>,
}

impl Harness {
    fn new(name: &str, tool_body: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "streamwatch-it-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();

        let tool_path = write_tool(&dir, tool_body);

        let settings = SupervisorSettings {
            tool: StreamTool::new(&tool_path),
            timing: Timing {
                probe_backoff: Duration::from_millis(50),
                startup_grace: Duration::from_millis(100),
                probe_timeout: Duration::from_secs(2),
                startup_settle: Duration::from_millis(50),
            },
            recordings_dir: dir.join("recordings"),
            registry_path: dir.join("channels.json"),
        };

        let (reporter, redraw_rx) = StatusReporter::new();
        let supervisor = Supervisor::new(settings, ChannelRegistry::new(), reporter);

        Self {
            dir,
            supervisor,
            redraw_rx,
        }
    }

    fn recording(&self, channel_id: &str) -> bool {
        self.supervisor
            .status_rows()
            .into_iter()
            .any(|(id, recording)| id == channel_id && recording)
    }

    fn drain_redraws(&mut self) {
        while self.redraw_rx.try_recv().is_ok() {}
    }

    fn count_redraws(&mut self) -> usize {
        let mut count = 0;
        while self.redraw_rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.supervisor.stop_all();
        std::fs::remove_dir_all(&self.dir).ok();
    }
}

fn write_tool(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("tool.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

async fn wait_for(what: &str, timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Probe reports live, capture runs until signalled. The channel must
/// reach the recording state, track exactly one session, and wind down
/// cleanly on stop.
#[tokio::test(flavor = "multi_thread")]
async fn live_channel_records_until_stopped() {
    let harness = Harness::new(
        "live",
        r#"if [ "$1" = "--json" ]; then
  echo '{"metadata":{"title":"Live Set"}}'
  exit 0
fi
touch "$6"
exec sleep 60"#,
    );

    harness.supervisor.add_channel("@alice").unwrap();

    wait_for("recording to start", Duration::from_secs(5), || {
        harness.recording("@alice")
    })
    .await;
    assert_eq!(
        harness.supervisor.active_sessions(),
        vec!["@alice".to_string()]
    );

    let capture_files: Vec<String> = std::fs::read_dir(harness.dir.join("recordings"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(capture_files.len(), 1);
    assert!(capture_files[0].starts_with("@alice_Live_Set_"));
    assert!(capture_files[0].ends_with(".ts"));

    harness.supervisor.stop_channel("@alice").unwrap();

    wait_for("recording to stop", Duration::from_secs(5), || {
        !harness.recording("@alice") && harness.supervisor.active_sessions().is_empty()
    })
    .await;
    assert!(harness.supervisor.is_stopped("@alice"));
}

/// A capture that dies inside the startup grace period must never be
/// reported as recording.
#[tokio::test(flavor = "multi_thread")]
async fn instant_exit_never_reports_recording() {
    let harness = Harness::new(
        "instant-exit",
        r#"if [ "$1" = "--json" ]; then
  echo '{"metadata":{"title":"Flicker"}}'
  exit 0
fi
exit 1"#,
    );

    harness.supervisor.add_channel("@alice").unwrap();

    // Several full probe/capture cycles fit in this window.
    let deadline = Instant::now() + Duration::from_millis(800);
    while Instant::now() < deadline {
        assert!(
            !harness.recording("@alice"),
            "grace-period casualty was reported as recording"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Once a channel was recording, repeated failed probes flip the state
/// to not-recording exactly once, not once per cycle.
#[tokio::test(flavor = "multi_thread")]
async fn failed_probes_flip_state_once() {
    let marker = std::env::temp_dir().join(format!("streamwatch-it-marker-{}", std::process::id()));
    std::fs::remove_file(&marker).ok();

    let body = format!(
        r#"MARKER="{}"
if [ "$1" = "--json" ]; then
  if [ -f "$MARKER" ]; then exit 1; fi
  echo '{{"metadata":{{"title":"Show"}}}}'
  exit 0
fi
while [ ! -f "$MARKER" ]; do sleep 0.05; done
exit 0"#,
        marker.display()
    );
    let mut harness = Harness::new("flip-once", &body);

    harness.supervisor.add_channel("@alice").unwrap();
    wait_for("recording to start", Duration::from_secs(5), || {
        harness.recording("@alice")
    })
    .await;

    harness.drain_redraws();

    // End the stream; every probe from here on reports not live.
    std::fs::write(&marker, b"").unwrap();

    wait_for("state to flip", Duration::from_secs(5), || {
        !harness.recording("@alice")
    })
    .await;

    // Let several more failed probe cycles elapse.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(
        harness.count_redraws(),
        1,
        "state change must be reported exactly once"
    );

    std::fs::remove_file(&marker).ok();
}

/// Stop followed by start resumes recording with a fresh monitor.
#[tokio::test(flavor = "multi_thread")]
async fn stop_then_start_records_again() {
    let mut harness = Harness::new(
        "restart",
        r#"if [ "$1" = "--json" ]; then
  echo '{"metadata":{"title":"Live Set"}}'
  exit 0
fi
exec sleep 60"#,
    );

    harness.supervisor.add_channel("@alice").unwrap();
    wait_for("first recording", Duration::from_secs(5), || {
        harness.recording("@alice")
    })
    .await;

    harness.supervisor.stop_channel("@alice").unwrap();
    wait_for("stop to settle", Duration::from_secs(5), || {
        !harness.recording("@alice") && harness.supervisor.active_sessions().is_empty()
    })
    .await;

    harness.supervisor.start_channel("@alice").unwrap();
    assert!(!harness.supervisor.is_stopped("@alice"));

    wait_for("second recording", Duration::from_secs(5), || {
        harness.recording("@alice")
    })
    .await;

    harness.drain_redraws();
}
