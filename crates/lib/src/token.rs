//! Chat token type and the on-disk token file used by the terminal client.

use crate::gateway::ApiError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Length of every chat token issued by the server.
pub const TOKEN_LEN: usize = 20;

/// Long-lived credential obtained from a chat pass. Immutable once created.
#[derive(Clone, PartialEq, Eq)]
pub struct ChatToken(String);

impl ChatToken {
    pub fn new(token: impl Into<String>) -> Result<Self, ApiError> {
        let token = token.into();
        if token.chars().count() != TOKEN_LEN {
            return Err(ApiError::InvalidToken);
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep the secret out of logs.
impl std::fmt::Debug for ChatToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let head: String = self.0.chars().take(4).collect();
        write!(f, "ChatToken({}...)", head)
    }
}

impl std::str::FromStr for ChatToken {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

/// Default token file: `<config dir>/hackmud-chat/token.txt`.
pub fn default_token_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("hackmud-chat").join("token.txt"))
        .unwrap_or_else(|| PathBuf::from("token.txt"))
}

/// Load a stored token. Missing or empty file => `None`.
pub fn load_token(path: &Path) -> Result<Option<String>> {
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("reading token from {}", path.display()))
        }
    };
    let t = s.trim().to_string();
    if t.is_empty() {
        Ok(None)
    } else {
        Ok(Some(t))
    }
}

/// Persist a token. Creates parent dirs if needed.
pub fn save_token(path: &Path, token: &ChatToken) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, token.as_str())
        .with_context(|| format!("writing token to {}", path.display()))?;
    Ok(())
}
