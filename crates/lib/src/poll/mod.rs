//! Live message polling.
//!
//! The poller repeatedly fetches the window after its cursor, filters ids already delivered in
//! the previous batch, and passes new messages to observers. It starts with the first observer
//! and stops on `shutdown`, when the last observer leaves, or on an auth failure.

mod cursor;
mod observers;
mod poller;

pub use cursor::PollCursor;
pub use observers::{MessageObserver, ObserverId, ObserverRegistry};
pub use poller::{MessageSource, Poller};
