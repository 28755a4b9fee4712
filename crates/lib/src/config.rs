//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.config/hackmud-chat/config.json`) and environment.
//! Every field is optional; the defaults match the live service's rate limits.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Chat API endpoint and rate-limit settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Live polling settings.
    #[serde(default)]
    pub poll: PollConfig,

    /// Chat token. Overridden by HACKMUD_CHAT_TOKEN env.
    #[serde(default)]
    pub token: Option<String>,

    /// Users to fetch messages for. Empty = every user on the account.
    #[serde(default)]
    pub users: Vec<String>,
}

/// Base URL, call spacing and retry policy for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Calls go to `{baseUrl}/{method}.json`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Minimum gap between calls, in ms (default 2000).
    #[serde(default = "default_call_spacing_ms")]
    pub call_spacing_ms: u64,

    /// Minimum gap before an `account_data` call, in ms (default 5000). The server throttles it harder.
    #[serde(default = "default_account_data_spacing_ms")]
    pub account_data_spacing_ms: u64,

    /// Attempts per call when the transport fails (default 4).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between attempts, in ms (default 1000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl ApiConfig {
    pub fn call_spacing(&self) -> Duration {
        Duration::from_millis(self.call_spacing_ms)
    }

    pub fn account_data_spacing(&self) -> Duration {
        Duration::from_millis(self.account_data_spacing_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            call_spacing_ms: default_call_spacing_ms(),
            account_data_spacing_ms: default_account_data_spacing_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Polling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    /// Delay between the end of one fetch and the start of the next, in ms (default 2000).
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.hackmud.com/mobile".to_string()
}

fn default_call_spacing_ms() -> u64 {
    2000
}

fn default_account_data_spacing_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    4
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    2000
}

const TOKEN_ENV: &str = "HACKMUD_CHAT_TOKEN";

/// The chat token to use: HACKMUD_CHAT_TOKEN if set, else `token` from the config file.
pub fn resolve_token(config: &Config) -> Option<String> {
    pick_token(std::env::var(TOKEN_ENV).ok().as_deref(), config)
}

/// Blank values count as unset at both levels.
fn pick_token(env: Option<&str>, config: &Config) -> Option<String> {
    [env, config.token.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_owned)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("HACKMUD_CHAT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::config_dir()
                .map(|d| d.join("hackmud-chat").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Read the config at `path` (default: [`default_config_path`]) and return it with the path used.
/// A file that does not exist yet yields the defaults.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok((Config::default(), path));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading config from {}", path.display()))
        }
    };
    let config = serde_json::from_str(&text)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    Ok((config, path))
}
