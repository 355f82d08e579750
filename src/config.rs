//! User settings
//!
//! Read from `~/.config/gitform/config.toml`, then overridden by the
//! environment and finally by command-line flags.

use anyhow::{Context, Result};
use reconcile::PollConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the API base URL
pub const BASE_URL_ENV: &str = "GITLAB_BASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// GitLab REST root, e.g. `https://gitlab.example.com/api/v4`
    pub base_url: String,
    /// Name of the environment variable holding the access token
    pub token_env: String,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    pub jobs: usize,
    pub manifest: String,
    pub state: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: labkit::DEFAULT_API_BASE.to_string(),
            token_env: "GITLAB_TOKEN".to_string(),
            poll_interval_secs: 3,
            poll_timeout_secs: 300,
            jobs: 4,
            manifest: "gitform.toml".to_string(),
            state: "gitform.state.json".to_string(),
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("gitform"))
}

impl Settings {
    /// Load the user config file (if any) and apply environment overrides
    pub fn load() -> Result<Self> {
        let path = config_dir()?.join("config.toml");
        let mut settings = Self::load_from(&path)?;
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load settings from `path`, falling back to defaults when it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
    }

    /// Access token from the configured environment variable
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }

    pub fn manifest_path(&self) -> PathBuf {
        expand(&self.manifest)
    }

    pub fn state_path(&self) -> PathBuf {
        expand(&self.state)
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig::new(
            Duration::from_secs(self.poll_interval_secs.max(1)),
            Duration::from_secs(self.poll_timeout_secs),
        )
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
