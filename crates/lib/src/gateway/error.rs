//! Error taxonomy for calls to the chat API.

/// Failure of a chat API call. The gateway is the only place these are classified;
/// everything above it passes them through untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// HTTP 401: the chat token is expired or was never valid. Not retried.
    #[error("expired or invalid token")]
    Auth,

    /// Connection or transport failure. Retried up to the configured bound.
    #[error("network error: {0}")]
    Network(String),

    /// The response did not look like the chat API (content type, empty body, bad JSON, missing fields).
    #[error("unexpected response from server: {0}")]
    Protocol(String),

    /// Well-formed `{ "ok": false, "msg": ... }` reply; `msg` is surfaced verbatim.
    #[error("{0}")]
    Remote(String),

    /// `chats` rejected some of the requested usernames.
    #[error("invalid usernames: {}", .0.join(", "))]
    InvalidUsernames(Vec<String>),

    /// Chat tokens are exactly 20 characters.
    #[error("chat token must be 20 characters")]
    InvalidToken,
}

impl ApiError {
    /// True for failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}
