//! Configuration management for streamwatch

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::monitor::Timing;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Recording configuration (where captures land)
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Probe and capture tool configuration
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Base directory under which the `recordings` folder is created.
    /// When unset, falls back to the user's video directory, then home,
    /// then the working directory.
    pub base_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// External capture tool executable
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Wait between unsuccessful or completed polling cycles (seconds)
    #[serde(default = "default_probe_backoff")]
    pub probe_backoff_secs: u64,

    /// Wait after starting a capture before reporting it as recording (seconds)
    #[serde(default = "default_startup_grace")]
    pub startup_grace_secs: u64,

    /// Upper bound on a single liveness probe (seconds)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Settle delay after all channels have reported at startup (seconds)
    #[serde(default = "default_startup_settle")]
    pub startup_settle_secs: u64,
}

// Default value functions
fn default_tool() -> String {
    "streamlink".to_string()
}

fn default_probe_backoff() -> u64 {
    10
}

fn default_startup_grace() -> u64 {
    3
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_startup_settle() -> u64 {
    5
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            probe_backoff_secs: default_probe_backoff(),
            startup_grace_secs: default_startup_grace(),
            probe_timeout_secs: default_probe_timeout(),
            startup_settle_secs: default_startup_settle(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recording: RecordingConfig::default(),
            probe: ProbeConfig::default(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location or create it.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path);
            Ok(config)
        } else {
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = match &self.config_path {
            Some(path) => path.clone(),
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// The config file location this instance was loaded from.
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "streamwatch", "streamwatch")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Directory where captures are written: `<base>/recordings`.
    pub fn recordings_dir(&self) -> PathBuf {
        let base = self
            .recording
            .base_directory
            .clone()
            .or_else(|| directories::UserDirs::new().and_then(|d| d.video_dir().map(PathBuf::from)))
            .or_else(|| directories::UserDirs::new().map(|d| d.home_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("recordings")
    }

    /// Location of the persisted channel registry.
    pub fn channels_path(&self) -> Result<PathBuf> {
        let config_path = self.config_path()?;
        let dir = config_path
            .parent()
            .context("Config path has no parent directory")?;
        Ok(dir.join("channels.json"))
    }

    /// Monitor timing derived from the configured second counts.
    pub fn timing(&self) -> Timing {
        Timing::from_secs(
            self.probe.probe_backoff_secs,
            self.probe.startup_grace_secs,
            self.probe.probe_timeout_secs,
            self.probe.startup_settle_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_polling_contract() {
        let config = Config::default();
        assert_eq!(config.probe.tool, "streamlink");
        assert_eq!(config.probe.probe_backoff_secs, 10);
        assert_eq!(config.probe.startup_grace_secs, 3);
        assert_eq!(config.probe.probe_timeout_secs, 30);
        assert_eq!(config.probe.startup_settle_secs, 5);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [recording]
            base_directory = "/srv/video"

            [probe]
            probe_backoff_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(
            config.recording.base_directory.as_deref(),
            Some(std::path::Path::new("/srv/video"))
        );
        assert_eq!(config.probe.probe_backoff_secs, 2);
        assert_eq!(config.probe.tool, "streamlink");
        assert_eq!(
            config.recordings_dir(),
            PathBuf::from("/srv/video/recordings")
        );
    }
}
