//! Client configuration: YAML file, then environment, then explicit overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::gateway::{Gateway, DEFAULT_BASE_URL};
use crate::session::DEFAULT_SESSION_TTL_MINUTES;

/// Environment variable overriding the backend base URL.
pub const API_URL_ENV: &str = "YOLOGEN_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL (e.g. "http://localhost:8000")
    pub base_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Backend health poll interval in seconds
    pub health_poll_interval_secs: u64,
    /// Lifetime of an access token in minutes
    pub session_ttl_minutes: i64,
    /// Where the CLI keeps the session between invocations
    pub session_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            health_poll_interval_secs: 10,
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            session_path: PathBuf::from(".yologen/session.yaml"),
        }
    }
}

impl ClientConfig {
    /// Load from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Apply `YOLOGEN_API_URL` if set and non-empty.
    pub fn with_env(self) -> Self {
        let url = std::env::var(API_URL_ENV).ok();
        self.with_base_url_override(url)
    }

    pub fn with_base_url_override(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        self
    }

    pub fn gateway(&self) -> Result<Gateway> {
        Gateway::new(&self.base_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_secs(self.health_poll_interval_secs.max(1))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_ttl_minutes.max(0))
    }
}
