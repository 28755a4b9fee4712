//! hackmud chat client library: a rate-limited gateway to the chat API, the normalizer that
//! merges per-recipient message copies, and a live polling loop with observers.

pub mod channels;
pub mod client;
pub mod config;
pub mod gateway;
pub mod messages;
pub mod poll;
pub mod token;

pub use channels::ChannelData;
pub use client::Client;
pub use gateway::{ApiError, Gateway};
pub use messages::{ChannelMessage, Message, MessageKind, TellMessage};
pub use poll::{MessageObserver, ObserverId};
pub use token::ChatToken;
