//! Gateway: the single, rate-limited path to the chat API.
//!
//! All calls share one FIFO gate per gateway instance, with a minimum spacing between calls
//! (longer for `account_data`), bounded retry on transport failures, and the server's clock
//! recorded from every reply.

mod endpoints;
mod error;
pub(crate) mod gate;
mod protocol;
mod transport;

pub use error::ApiError;
pub use gate::Gateway;
pub use protocol::{
    from_wire_seconds, to_wire_seconds, ChannelEvent, ChatTarget, Endpoint, RawMessage,
    RawTarget, Window,
};
pub use transport::{HttpReply, ReqwestTransport, Transport};
