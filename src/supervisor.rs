//! Channel supervision
//!
//! The supervisor owns the channel registry, the set of running monitor
//! tasks, the active-session map and the stopped-set. Every public
//! operation serializes on one mutex over that state, which is what
//! guarantees the two core invariants: at most one tracked capture
//! session per channel, and at most one live monitor per channel.
//!
//! Monitors cooperate through two signals: a per-monitor cancel flag
//! (set when that specific monitor must wind down, e.g. on stop or
//! restart) and the stopped-set (membership means the channel must not
//! be monitored until started again). Registration of a new capture
//! session re-checks both under the lock, so a stop that races a
//! spawning capture still terminates it instead of leaking it.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::SessionHandle;
use crate::config::Config;
use crate::monitor::{self, Timing};
use crate::probe::StreamTool;
use crate::registry::{Channel, ChannelRegistry};
use crate::status::StatusReporter;

/// Errors surfaced to the operator for channel commands.
///
/// These never affect other channels' monitors; the shell shows them as
/// transient notices.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("channel {0} already exists")]
    AlreadyExists(String),
    #[error("channel {0} not found")]
    NotFound(String),
    #[error("channel {0} is already recording")]
    AlreadyRecording(String),
}

/// Construction parameters for a [`Supervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub tool: StreamTool,
    pub timing: Timing,
    pub recordings_dir: PathBuf,
    pub registry_path: PathBuf,
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            tool: StreamTool::new(&config.probe.tool),
            timing: config.timing(),
            recordings_dir: config.recordings_dir(),
            registry_path: config
                .channels_path()
                .context("Failed to resolve registry path")?,
        })
    }
}

/// Handle to one running monitor task.
pub(crate) struct MonitorHandle {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Mutable supervision state, guarded by one mutex.
#[derive(Default)]
pub(crate) struct State {
    registry: ChannelRegistry,
    sessions: HashMap<String, SessionHandle>,
    stopped: HashSet<String>,
    monitors: HashMap<String, MonitorHandle>,
}

/// State shared between the supervisor and its monitor tasks.
pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    pub(crate) reporter: StatusReporter,
    pub(crate) tool: StreamTool,
    pub(crate) timing: Timing,
    pub(crate) recordings_dir: PathBuf,
    registry_path: PathBuf,
}

impl Shared {
    /// Whether the monitor owning `cancel` must exit at its next
    /// iteration boundary.
    pub(crate) fn halt_requested(&self, channel_id: &str, cancel: &AtomicBool) -> bool {
        cancel.load(Ordering::SeqCst)
            || self
                .state
                .lock()
                .expect("supervisor state lock")
                .stopped
                .contains(channel_id)
    }

    /// Track a freshly spawned capture session.
    ///
    /// Refuses when the owning monitor has been cancelled or the channel
    /// stopped in the meantime, and when a session is already tracked
    /// for the channel. The caller must terminate the capture on refusal.
    pub(crate) fn register_session(&self, cancel: &AtomicBool, handle: SessionHandle) -> bool {
        let mut state = self.state.lock().expect("supervisor state lock");
        if cancel.load(Ordering::SeqCst) || state.stopped.contains(&handle.channel_id) {
            return false;
        }
        if state.sessions.contains_key(&handle.channel_id) {
            return false;
        }
        state.sessions.insert(handle.channel_id.clone(), handle);
        true
    }

    /// Untrack a finished capture session.
    ///
    /// Only removes the entry when it still belongs to the caller's
    /// process: a stop request may already have untracked it.
    pub(crate) fn clear_session(&self, channel_id: &str, pid: Option<u32>) {
        let mut state = self.state.lock().expect("supervisor state lock");
        if state.sessions.get(channel_id).map(|h| h.pid()) == Some(pid) {
            state.sessions.remove(channel_id);
        }
    }

    /// Drop a monitor's registry entry as it exits.
    ///
    /// Matches on the cancel-flag identity so a draining monitor cannot
    /// remove the entry of a fresh monitor that replaced it.
    pub(crate) fn retire_monitor(&self, channel_id: &str, cancel: &Arc<AtomicBool>) {
        let mut state = self.state.lock().expect("supervisor state lock");
        if let Some(handle) = state.monitors.get(channel_id) {
            if Arc::ptr_eq(&handle.cancel, cancel) {
                state.monitors.remove(channel_id);
            }
        }
    }
}

/// Owns the monitor fleet and mediates all channel commands.
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    pub fn new(
        settings: SupervisorSettings,
        registry: ChannelRegistry,
        reporter: StatusReporter,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    registry,
                    ..State::default()
                }),
                reporter,
                tool: settings.tool,
                timing: settings.timing,
                recordings_dir: settings.recordings_dir,
                registry_path: settings.registry_path,
            }),
        }
    }

    /// Register a channel, persist the registry and start monitoring it.
    pub fn add_channel(&self, channel_id: &str) -> Result<(), CommandError> {
        let mut state = self.lock_state();
        if state.registry.contains(channel_id) {
            return Err(CommandError::AlreadyExists(channel_id.to_string()));
        }

        state.registry.insert(channel_id);
        self.persist_registry(&state);
        state.stopped.remove(channel_id);
        Self::spawn_monitor(&self.shared, &mut state, Channel::new(channel_id));

        info!("Channel {} added", channel_id);
        Ok(())
    }

    /// Unregister a channel, stopping any active capture first.
    ///
    /// Afterwards no tracking map holds an entry for the channel.
    pub fn remove_channel(&self, channel_id: &str) -> Result<(), CommandError> {
        let mut state = self.lock_state();
        if !state.registry.contains(channel_id) {
            return Err(CommandError::NotFound(channel_id.to_string()));
        }

        if let Some(session) = state.sessions.remove(channel_id) {
            session.stop();
        }
        if let Some(handle) = state.monitors.remove(channel_id) {
            handle.cancel.store(true, Ordering::SeqCst);
        }
        state.registry.remove(channel_id);
        state.stopped.remove(channel_id);
        self.persist_registry(&state);
        drop(state);

        self.shared.reporter.forget(channel_id);
        info!("Channel {} removed", channel_id);
        Ok(())
    }

    /// Resume monitoring a registered channel.
    ///
    /// No-op when a capture is already active. Clears the stopped-set so
    /// a stop immediately followed by a start never leaves the channel
    /// permanently stopped.
    pub fn start_channel(&self, channel_id: &str) -> Result<(), CommandError> {
        let mut state = self.lock_state();
        let Some(channel) = state.registry.get(channel_id).cloned() else {
            return Err(CommandError::NotFound(channel_id.to_string()));
        };
        if state.sessions.contains_key(channel_id) {
            return Err(CommandError::AlreadyRecording(channel_id.to_string()));
        }

        state.stopped.remove(channel_id);
        Self::spawn_monitor(&self.shared, &mut state, channel);

        info!("Channel {} started", channel_id);
        Ok(())
    }

    /// Halt a channel's monitor and terminate any active capture.
    ///
    /// The monitor observes the halt at its next iteration boundary;
    /// the capture process is signalled immediately.
    pub fn stop_channel(&self, channel_id: &str) -> Result<(), CommandError> {
        let mut state = self.lock_state();
        if !state.registry.contains(channel_id) {
            return Err(CommandError::NotFound(channel_id.to_string()));
        }

        if let Some(session) = state.sessions.remove(channel_id) {
            session.stop();
        }
        if let Some(handle) = state.monitors.get(channel_id) {
            handle.cancel.store(true, Ordering::SeqCst);
        }
        state.stopped.insert(channel_id.to_string());
        drop(state);

        self.shared.reporter.report(channel_id, false);
        info!("Channel {} stopped", channel_id);
        Ok(())
    }

    /// Stop every channel with an active capture. Used at shutdown.
    pub fn stop_all(&self) {
        let recording: Vec<String> = {
            let state = self.lock_state();
            state.sessions.keys().cloned().collect()
        };

        for channel_id in recording {
            if let Err(e) = self.stop_channel(&channel_id) {
                warn!("Failed to stop channel {}: {}", channel_id, e);
            }
        }
    }

    /// Launch one monitor per registered channel.
    ///
    /// Status redraws are suppressed until every channel has reported an
    /// initial state, plus a settle delay, so startup paints the display
    /// once instead of once per channel.
    pub async fn start_all(&self) {
        let channels: Vec<Channel> = {
            let state = self.lock_state();
            state.registry.channels().to_vec()
        };
        if channels.is_empty() {
            return;
        }

        self.shared.reporter.set_suppressed(true);
        {
            let mut state = self.lock_state();
            for channel in channels {
                Self::spawn_monitor(&self.shared, &mut state, channel);
            }
        }

        loop {
            let ids: Vec<String> = {
                let state = self.lock_state();
                state.registry.ids().map(String::from).collect()
            };
            if self
                .shared
                .reporter
                .has_reported(ids.iter().map(String::as_str))
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }

        tokio::time::sleep(self.shared.timing.startup_settle).await;
        self.shared.reporter.set_suppressed(false);
        self.shared.reporter.trigger_redraw();
    }

    /// Channel states in registry (insertion) order, for display.
    pub fn status_rows(&self) -> Vec<(String, bool)> {
        let ids: Vec<String> = {
            let state = self.lock_state();
            state.registry.ids().map(String::from).collect()
        };
        ids.into_iter()
            .map(|id| {
                let recording = self.shared.reporter.recording(&id);
                (id, recording)
            })
            .collect()
    }

    /// Channels with a tracked capture session.
    pub fn active_sessions(&self) -> Vec<String> {
        let state = self.lock_state();
        state.sessions.keys().cloned().collect()
    }

    pub fn is_stopped(&self, channel_id: &str) -> bool {
        self.lock_state().stopped.contains(channel_id)
    }

    pub fn is_registered(&self, channel_id: &str) -> bool {
        self.lock_state().registry.contains(channel_id)
    }

    pub fn has_live_monitor(&self, channel_id: &str) -> bool {
        let state = self.lock_state();
        state
            .monitors
            .get(channel_id)
            .map(|h| !h.task.is_finished() && !h.cancel.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn recordings_dir(&self) -> &Path {
        &self.shared.recordings_dir
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.shared.state.lock().expect("supervisor state lock")
    }

    /// Spawn a fresh monitor unless one is already live and healthy.
    fn spawn_monitor(shared: &Arc<Shared>, state: &mut State, channel: Channel) {
        if let Some(existing) = state.monitors.get(&channel.id) {
            if !existing.task.is_finished() && !existing.cancel.load(Ordering::SeqCst) {
                debug!("Monitor already live for {}", channel.id);
                return;
            }
            // A cancelled monitor may still be draining; it unregisters
            // only itself, so replacing its entry is safe.
            existing.cancel.store(true, Ordering::SeqCst);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(monitor::run(
            shared.clone(),
            channel.clone(),
            cancel.clone(),
        ));
        state
            .monitors
            .insert(channel.id, MonitorHandle { cancel, task });
    }

    /// Persist the registry after a mutation.
    ///
    /// On failure the in-memory registry stays authoritative for the
    /// current run; the mutation is simply not durable.
    fn persist_registry(&self, state: &State) {
        if let Err(e) = state.registry.save(&self.shared.registry_path) {
            warn!("Failed to persist channel registry: {:#}", e);
        }
    }
}
