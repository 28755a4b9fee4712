//! Normalized messages and the merge from per-recipient raw messages.
//!
//! The `chats` endpoint returns one copy of a channel message per tracked recipient. The
//! normalizer folds copies sharing an id into one [`ChannelMessage`] carrying every recipient.

use crate::gateway::{ChannelEvent, RawMessage, RawTarget};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Flat discriminant over both message shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Join,
    Leave,
    Send,
    Tell,
}

impl From<ChannelEvent> for MessageKind {
    fn from(event: ChannelEvent) -> Self {
        match event {
            ChannelEvent::Join => MessageKind::Join,
            ChannelEvent::Leave => MessageKind::Leave,
            ChannelEvent::Send => MessageKind::Send,
        }
    }
}

/// A message in a channel, seen by one or more of the tracked users.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub id: String,
    pub sender: String,
    pub event: ChannelEvent,
    pub content: String,
    pub channel: String,
    pub time: DateTime<Utc>,
    /// Tracked users that received it, in encounter order.
    pub recipients: Vec<String>,
}

/// A direct message ("tell") to a single user.
#[derive(Debug, Clone, PartialEq)]
pub struct TellMessage {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub time: DateTime<Utc>,
    pub recipient: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Channel(ChannelMessage),
    Tell(TellMessage),
}

impl Message {
    pub fn id(&self) -> &str {
        match self {
            Message::Channel(m) => &m.id,
            Message::Tell(m) => &m.id,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Message::Channel(m) => m.time,
            Message::Tell(m) => m.time,
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            Message::Channel(m) => &m.sender,
            Message::Tell(m) => &m.sender,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::Channel(m) => &m.content,
            Message::Tell(m) => &m.content,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Channel(m) => m.event.into(),
            Message::Tell(_) => MessageKind::Tell,
        }
    }
}

/// Merge per-recipient raw messages into distinct messages sorted by time (stable on ties).
///
/// Repeated ids of a channel message add the recipient and change nothing else. A repeated
/// direct-message id, or an id reused across kinds, is malformed input: the first copy is kept.
pub fn normalize<I>(by_recipient: I) -> Vec<Message>
where
    I: IntoIterator<Item = (String, Vec<RawMessage>)>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Message> = Vec::new();

    for (recipient, raws) in by_recipient {
        for raw in raws {
            if let Some(&i) = index.get(&raw.id) {
                match (&mut out[i], &raw.target) {
                    (Message::Channel(m), RawTarget::Channel { .. }) => {
                        m.recipients.push(recipient.clone());
                    }
                    (Message::Tell(_), RawTarget::Tell { .. }) => {
                        log::warn!("duplicate direct message id {}, keeping first", raw.id);
                    }
                    _ => {
                        log::warn!("message id {} reused across kinds, keeping first", raw.id);
                    }
                }
                continue;
            }

            index.insert(raw.id.clone(), out.len());
            out.push(match raw.target {
                RawTarget::Channel { channel, event } => Message::Channel(ChannelMessage {
                    id: raw.id,
                    sender: raw.sender,
                    event,
                    content: raw.content,
                    channel,
                    time: raw.time,
                    recipients: vec![recipient.clone()],
                }),
                RawTarget::Tell { to_user } => Message::Tell(TellMessage {
                    id: raw.id,
                    sender: raw.sender,
                    content: raw.content,
                    time: raw.time,
                    recipient: to_user,
                }),
            });
        }
    }

    out.sort_by_key(|m| m.time());
    out
}
