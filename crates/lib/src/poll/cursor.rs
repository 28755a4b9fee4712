//! Poll cursor: where the next fetch window starts, and which ids the last batch held.

use crate::messages::Message;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct PollCursor {
    after: DateTime<Utc>,
    last_batch: HashSet<String>,
}

impl PollCursor {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            after: start,
            last_batch: HashSet::new(),
        }
    }

    /// Start of the next fetch window.
    pub fn after(&self) -> DateTime<Utc> {
        self.after
    }

    /// Fold one fetched batch into the cursor and return the messages not seen in the previous batch.
    ///
    /// With new messages the window moves to the newest one's time (never backwards). Without,
    /// it jumps to `server_clock` so a quiet session does not keep re-reading an old window.
    pub fn advance(
        &mut self,
        batch: Vec<Message>,
        server_clock: Option<DateTime<Utc>>,
    ) -> Vec<Message> {
        let ids: HashSet<String> = batch.iter().map(|m| m.id().to_string()).collect();
        let fresh: Vec<Message> = batch
            .into_iter()
            .filter(|m| !self.last_batch.contains(m.id()))
            .collect();
        self.last_batch = ids;

        match fresh.iter().map(Message::time).max() {
            Some(newest) => self.after = self.after.max(newest),
            None => {
                if let Some(now) = server_clock {
                    self.after = now;
                }
            }
        }
        fresh
    }
}
