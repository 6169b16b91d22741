// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Configuration for tokenwatch.
//!
//! Settings live in `~/.tokenwatch/config.json`. The portal URL can be
//! overridden per invocation with the `TOKENWATCH_PORTAL_URL` environment
//! variable.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default portal base URL (local development gateway).
pub const DEFAULT_PORTAL_URL: &str = "http://localhost:8080";

/// Default timeout for portal API requests (in seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Environment variable that overrides the configured portal URL.
pub const PORTAL_URL_ENV: &str = "TOKENWATCH_PORTAL_URL";

/// User-facing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the portal API gateway.
    pub portal_url: String,

    /// Per-request timeout for portal calls, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Directory holding tokenwatch state (`~/.tokenwatch`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".tokenwatch"))
}

/// Path of the config file (`~/.tokenwatch/config.json`).
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

impl Config {
    /// Load the config file, falling back to defaults when it doesn't exist.
    ///
    /// `TOKENWATCH_PORTAL_URL` takes precedence over the file in either case.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Could not read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(PORTAL_URL_ENV) {
            if !url.trim().is_empty() {
                config.portal_url = url.trim().to_string();
            }
        }

        Ok(config)
    }

    /// Write the config file, creating `~/.tokenwatch` if needed.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
        let path = config_path()?;
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(&path, raw)
            .with_context(|| format!("Could not write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.portal_url, DEFAULT_PORTAL_URL);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_parse_config_with_missing_timeout() {
        let config: Config =
            serde_json::from_str(r#"{"portal_url": "https://portal.example.com"}"#)
                .expect("should parse");
        assert_eq!(config.portal_url, "https://portal.example.com");
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }
}
