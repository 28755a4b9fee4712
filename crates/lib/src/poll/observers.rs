//! Observer registry: who receives live messages, in registration order.

use crate::gateway::ApiError;
use crate::messages::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Receives batches of new messages from the polling loop.
pub trait MessageObserver: Send + Sync {
    /// New messages, oldest first.
    fn on_messages(&self, messages: &[Message]);

    /// A poll cycle failed. Polling continues unless the error is `ApiError::Auth`.
    fn on_error(&self, _error: &ApiError) {}
}

impl<F> MessageObserver for F
where
    F: Fn(&[Message]) + Send + Sync,
{
    fn on_messages(&self, messages: &[Message]) {
        self(messages)
    }
}

/// Handle returned on registration; pass it back to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub struct ObserverRegistry {
    inner: Mutex<Vec<(ObserverId, Arc<dyn MessageObserver>)>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer; returns its id and the number registered afterwards.
    pub fn add(&self, observer: Arc<dyn MessageObserver>) -> (ObserverId, usize) {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        g.push((id, observer));
        (id, g.len())
    }

    /// Remove an observer; returns whether it was present and the number left.
    pub fn remove(&self, id: ObserverId) -> (bool, usize) {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = g.len();
        g.retain(|(oid, _)| *oid != id);
        (g.len() != before, g.len())
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Observers are called outside the lock so they may (un)register from a callback.
    fn snapshot(&self) -> Vec<Arc<dyn MessageObserver>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, o)| o.clone())
            .collect()
    }

    pub fn notify(&self, messages: &[Message]) {
        for observer in self.snapshot() {
            observer.on_messages(messages);
        }
    }

    pub fn notify_error(&self, error: &ApiError) {
        for observer in self.snapshot() {
            observer.on_error(error);
        }
    }
}
