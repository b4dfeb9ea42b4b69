//! Channel registry
//!
//! Maps channel identifiers to their liveness-check URLs. Insertion order
//! is preserved so the status display lists channels in the order they
//! were added. The registry persists as a JSON list of identifiers; URLs
//! are rederived from the identifier shape on reload.

use anyhow::{Context, Result};
use std::path::Path;

/// A registered live-stream channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel identifier: a handle (`@name`) or a raw channel id.
    pub id: String,
    /// Derived liveness-check URL.
    pub url: String,
}

impl Channel {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let url = live_url(&id);
        Self { id, url }
    }
}

/// Derive the liveness-check URL for a channel identifier.
///
/// Handle-style identifiers (`@name`) and raw channel ids use different
/// URL templates.
pub fn live_url(id: &str) -> String {
    if id.starts_with('@') {
        format!("https://www.youtube.com/{}/live", id)
    } else {
        format!("https://www.youtube.com/channel/{}/live", id)
    }
}

/// Ordered set of registered channels.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the registry from a JSON list of channel ids.
    ///
    /// A missing file yields an empty registry; the caller decides
    /// whether to create the file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read registry: {:?}", path));
            }
        };

        let ids: Vec<String> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse registry: {:?}", path))?;

        let mut registry = Self::new();
        for id in ids {
            registry.insert(&id);
        }
        Ok(registry)
    }

    /// Persist the registry as a JSON list of channel ids.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create registry directory: {:?}", parent))?;
        }

        let ids: Vec<&str> = self.channels.iter().map(|c| c.id.as_str()).collect();
        let contents = serde_json::to_string_pretty(&ids).context("Failed to serialize registry")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write registry: {:?}", path))?;

        Ok(())
    }

    /// Add a channel. Returns false if the id is already registered.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.channels.push(Channel::new(id));
        true
    }

    /// Remove a channel. Returns false if the id is not registered.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.channels.len();
        self.channels.retain(|c| c.id != id);
        self.channels.len() != before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.channels.iter().any(|c| c.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Channels in insertion order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
