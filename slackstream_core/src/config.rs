use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StreamError};
use crate::network::Limits;

/// Contents of `config.toml`.
///
/// ```toml
/// [limits]
/// workers = 4
/// [limits.tier_3]
/// boost = 120
/// burst = 5
/// retries = 3
///
/// [stream]
/// fast_search = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub limits: Limits,
    pub stream: StreamOptions,
}

/// Behaviour switches for a [`crate::Stream`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Include messages with exactly the `oldest`/`latest` timestamp.
    pub inclusive: bool,
    /// Search fetches channel info only, skipping the member lists.
    pub fast_search: bool,
    /// Fail the run on `channel_not_found` instead of skipping the channel.
    pub fail_on_channel_not_found: bool,
    pub channel_workers: usize,
    pub thread_workers: usize,
    pub channel_queue_size: usize,
    /// Discovered threads waiting to be fetched.  Channel workers block once
    /// this fills up.
    pub thread_queue_size: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            inclusive: true,
            fast_search: false,
            fail_on_channel_not_found: false,
            channel_workers: 1,
            thread_workers: 1,
            channel_queue_size: 16,
            thread_queue_size: 4000,
        }
    }
}

impl StreamOptions {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("channel_workers", self.channel_workers),
            ("thread_workers", self.thread_workers),
            ("channel_queue_size", self.channel_queue_size),
            ("thread_queue_size", self.thread_queue_size),
        ] {
            if v == 0 {
                return Err(StreamError::Config(format!("stream.{name} must be >= 1")));
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(content)?;
        cfg.limits.validate()?;
        cfg.stream.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Loads `path` if given, else the default location if it exists, else
    /// the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let path = Self::default_path();
        if path.exists() {
            return Self::load(path);
        }
        Ok(Self::default())
    }

    /// `<config dir>/slackstream/config.toml`
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("slackstream").join("config.toml")
    }
}
