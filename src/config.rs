//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then a
//! handful of environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{LiveError, Result};

/// Browser-like user agent; AtCoder and the proxy reject bare clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; AtCoderProblemsFetcher/1.0)";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Comments microservice root.
    pub comments_base_url: String,
    /// AtCoder-Problems resource mirror root.
    pub problems_base_url: String,
    pub atcoder_base_url: String,
    /// CORS relays, tried in order. Each takes the page URL in `quest`.
    pub proxies: Vec<String>,
    pub room_id: u64,
    /// Identity sent with like/unlike requests.
    pub user_id: u64,
    /// Contests outside `{prefix}{n}` with `n >= threshold` are hidden.
    pub contest_prefix: String,
    pub contest_threshold: u32,
    pub poll_interval_secs: u64,
    pub store_path: PathBuf,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            comments_base_url: "https://mobpro-api.taketo-u.net".to_string(),
            problems_base_url: "https://kenkoooo.com/atcoder/resources".to_string(),
            atcoder_base_url: "https://atcoder.jp".to_string(),
            proxies: vec!["https://api.codetabs.com/v1/proxy".to_string()],
            room_id: 1,
            user_id: 1,
            contest_prefix: "abc".to_string(),
            contest_threshold: 100,
            poll_interval_secs: 30,
            store_path: PathBuf::from("live-coders-store.json"),
            request_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration from `path` (if given) and the environment.
    ///
    /// # Errors
    /// Returns [`LiveError::Config`] when the file cannot be read or is not
    /// valid TOML for this schema.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| LiveError::Config {
                    detail: format!("{}: {e}", p.display()),
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| LiveError::Config {
            detail: e.to_string(),
        })
    }

    /// Apply `LIVE_CODERS_*` overrides. `lookup` abstracts the environment
    /// so tests don't have to mutate process state.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LIVE_CODERS_COMMENTS_URL") {
            self.comments_base_url = url;
        }
        if let Some(room) = lookup("LIVE_CODERS_ROOM").and_then(|r| r.parse().ok()) {
            self.room_id = room;
        }
        if let Some(store) = lookup("LIVE_CODERS_STORE") {
            self.store_path = PathBuf::from(store);
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Shared HTTP client for every remote service.
    pub fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
            .unwrap_or_default()
    }
}
