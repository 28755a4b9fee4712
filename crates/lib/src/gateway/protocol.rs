//! Chat API wire types: endpoints, request bodies, response bodies and raw messages.
//!
//! Every call is `POST {base}/{method}.json` with a JSON body. Replies use the envelope
//! `{ "ok": true, ... }` or `{ "ok": false, "msg": "..." }`.

use crate::gateway::error::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote API method. Also selects the minimum spacing before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetToken,
    AccountData,
    Chats,
    CreateChat,
}

impl Endpoint {
    /// Method name as it appears in the URL (`{base}/{name}.json`).
    pub fn method(self) -> &'static str {
        match self {
            Endpoint::GetToken => "get_token",
            Endpoint::AccountData => "account_data",
            Endpoint::Chats => "chats",
            Endpoint::CreateChat => "create_chat",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.method())
    }
}

/// Common reply envelope. Endpoint-specific fields are read from the same object afterwards.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub ok: bool,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub invalid_usernames: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetTokenRequest<'a> {
    pub pass: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetTokenResponse {
    pub chat_token: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AccountDataRequest<'a> {
    pub chat_token: &'a str,
}

/// `users`: user -> channel -> members. Map order is the server's order.
#[derive(Debug, Deserialize)]
pub(crate) struct AccountDataResponse {
    pub users: serde_json::Map<String, serde_json::Value>,
}

/// Fetch window anchor, flattened into the request as `before` or `after` (seconds since epoch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Before(f64),
    After(f64),
}

impl Window {
    pub fn before(time: DateTime<Utc>) -> Self {
        Window::Before(to_wire_seconds(time))
    }

    pub fn after(time: DateTime<Utc>) -> Self {
        Window::After(to_wire_seconds(time))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatsRequest<'a> {
    pub chat_token: &'a str,
    pub usernames: &'a [String],
    #[serde(flatten)]
    pub window: Window,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatsResponse {
    pub chats: serde_json::Map<String, serde_json::Value>,
}

impl ChatsResponse {
    /// Per-recipient raw messages in server order.
    pub fn into_recipients(self) -> Result<Vec<(String, Vec<RawMessage>)>, ApiError> {
        self.chats
            .into_iter()
            .map(|(user, value)| {
                let messages: Vec<RawMessage> = serde_json::from_value(value).map_err(|e| {
                    ApiError::Protocol(format!("chats for {}: {}", user, e))
                })?;
                Ok((user, messages))
            })
            .collect()
    }
}

/// Where a `create_chat` goes: `channel` for a send, `tell` for a direct message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTarget<'a> {
    Channel(&'a str),
    Tell(&'a str),
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateChatRequest<'a> {
    pub chat_token: &'a str,
    pub username: &'a str,
    #[serde(flatten)]
    pub target: ChatTarget<'a>,
    pub msg: &'a str,
}

/// Acknowledgement body of `create_chat` (`{ "ok": true }`).
#[derive(Debug, Deserialize)]
pub(crate) struct Ack {}

/// What a channel message announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelEvent {
    Join,
    Leave,
    Send,
}

/// Discriminant of a raw message, decided once while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTarget {
    Channel { channel: String, event: ChannelEvent },
    Tell { to_user: String },
}

/// One message as delivered to exactly one recipient.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct RawMessage {
    pub id: String,
    pub time: DateTime<Utc>,
    pub sender: String,
    pub content: String,
    pub target: RawTarget,
}

/// Loose on-the-wire shape; `channel` vs `to_user` and the `is_join`/`is_leave` flags decide the variant.
#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    t: f64,
    from_user: String,
    msg: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    to_user: Option<String>,
    #[serde(default)]
    is_join: bool,
    #[serde(default)]
    is_leave: bool,
}

impl TryFrom<WireMessage> for RawMessage {
    type Error = String;

    fn try_from(w: WireMessage) -> Result<Self, Self::Error> {
        let time = from_wire_seconds(w.t)
            .ok_or_else(|| format!("message {} has out of range timestamp {}", w.id, w.t))?;
        let target = match (w.channel, w.to_user) {
            (Some(channel), _) => {
                let event = if w.is_join {
                    ChannelEvent::Join
                } else if w.is_leave {
                    ChannelEvent::Leave
                } else {
                    ChannelEvent::Send
                };
                RawTarget::Channel { channel, event }
            }
            (None, Some(to_user)) => RawTarget::Tell { to_user },
            (None, None) => {
                return Err(format!("message {} has neither channel nor to_user", w.id))
            }
        };
        Ok(RawMessage {
            id: w.id,
            time,
            sender: w.from_user,
            content: w.msg,
            target,
        })
    }
}

/// Seconds since the Unix epoch with millisecond precision, as the API expects.
pub fn to_wire_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

pub fn from_wire_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
}
