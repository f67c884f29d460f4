//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The OAuth client id may come from GITHUB_CLIENT_ID so deployments can share
//! one TOML file across apps.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use github_auth::{AUTHORIZE_TIMEOUT, DEFAULT_API_URL, DEFAULT_BASE_URL, TOKEN_WAIT_TIMEOUT};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub github: GithubConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// GitHub (or GitHub Enterprise) endpoints and the OAuth app
#[derive(Debug, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub client_id: String,
    /// Origin of the page the authorization flow redirects to
    pub auth_page_origin: String,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub token_file: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub token_wait_secs: u64,
    pub authorize_secs: u64,
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            token_wait_secs: TOKEN_WAIT_TIMEOUT.as_secs(),
            authorize_secs: AUTHORIZE_TIMEOUT.as_secs(),
            request_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn token_wait(&self) -> Duration {
        Duration::from_secs(self.token_wait_secs)
    }

    pub fn authorize(&self) -> Duration {
        Duration::from_secs(self.authorize_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Scheme and host (with optional port) only.
fn is_bare_origin(origin: &str) -> bool {
    let host = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"));
    matches!(host, Some(host) if !host.is_empty() && !host.contains(['/', '?', '#']))
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(client_id) = std::env::var("GITHUB_CLIENT_ID") {
            config.github.client_id = client_id;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let github = &self.github;

        for (field, url) in [
            ("github.base_url", &github.base_url),
            ("github.api_url", &github.api_url),
        ] {
            if !is_http_url(url) {
                return Err(common::Error::invalid(
                    field,
                    format!("must start with http:// or https://, got: {url}"),
                ));
            }
        }

        if !is_bare_origin(&github.auth_page_origin) {
            return Err(common::Error::invalid(
                "github.auth_page_origin",
                format!(
                    "must be a bare origin like https://host, got: {}",
                    github.auth_page_origin
                ),
            ));
        }

        if github.client_id.trim().is_empty() {
            return Err(common::Error::invalid(
                "github.client_id",
                "must not be empty (set it in the config or GITHUB_CLIENT_ID)",
            ));
        }

        let timeouts = &self.timeouts;
        for (field, secs) in [
            ("timeouts.token_wait_secs", timeouts.token_wait_secs),
            ("timeouts.authorize_secs", timeouts.authorize_secs),
            ("timeouts.request_secs", timeouts.request_secs),
        ] {
            if secs == 0 {
                return Err(common::Error::invalid(field, "must be greater than 0"));
            }
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("auth-bridge.toml")
    }
}
