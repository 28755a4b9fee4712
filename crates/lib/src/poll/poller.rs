//! Live polling: a cancellable task that fetches the window after the cursor, drops repeats,
//! and hands new messages to the registered observers.

use crate::gateway::ApiError;
use crate::messages::Message;
use crate::poll::cursor::PollCursor;
use crate::poll::observers::{MessageObserver, ObserverId, ObserverRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Where the poller gets its messages from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Messages in the window starting at `after`, merged and time-ordered.
    async fn fetch_after(&self, after: DateTime<Utc>) -> Result<Vec<Message>, ApiError>;

    /// Latest known server time.
    fn server_clock(&self) -> Option<DateTime<Utc>>;
}

struct PollTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the observer list and the polling task. Idle until the first observer registers.
pub struct Poller {
    source: Arc<dyn MessageSource>,
    interval: Duration,
    observers: Arc<ObserverRegistry>,
    task: Mutex<Option<PollTask>>,
}

impl Poller {
    pub fn new(source: Arc<dyn MessageSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            observers: Arc::new(ObserverRegistry::new()),
            task: Mutex::new(None),
        }
    }

    /// Register an observer. The first registration starts polling, so this must be called
    /// from within a tokio runtime.
    pub fn register(&self, observer: Arc<dyn MessageObserver>) -> ObserverId {
        let (id, _) = self.observers.add(observer);
        self.ensure_started();
        id
    }

    /// Unregister an observer. Removing the last one stops polling.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let (removed, left) = self.observers.remove(id);
        if removed && left == 0 {
            if let Some(task) = self.take_task() {
                let _ = task.stop_tx.send(true);
            }
        }
        removed
    }

    /// True while the polling task is alive.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Stop polling and wait for the task to finish. Observers stay registered.
    pub async fn shutdown(&self) {
        let Some(task) = self.take_task() else {
            return;
        };
        let _ = task.stop_tx.send(true);
        if let Err(e) = task.handle.await {
            log::warn!("poll task ended abnormally: {}", e);
        }
    }

    fn take_task(&self) -> Option<PollTask> {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn ensure_started(&self) {
        let mut g = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if g.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_poll_loop(
            self.source.clone(),
            self.observers.clone(),
            self.interval,
            stop_rx,
        ));
        *g = Some(PollTask { stop_tx, handle });
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(task) = self.take_task() {
            let _ = task.stop_tx.send(true);
        }
    }
}

async fn run_poll_loop(
    source: Arc<dyn MessageSource>,
    observers: Arc<ObserverRegistry>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let start = source.server_clock().unwrap_or_else(Utc::now);
    let mut cursor = PollCursor::new(start);
    log::info!("polling for messages after {}", start);

    loop {
        let fetched = tokio::select! {
            r = source.fetch_after(cursor.after()) => r,
            _ = stop_rx.changed() => break,
        };
        match fetched {
            Ok(batch) => {
                let fresh = cursor.advance(batch, source.server_clock());
                log::debug!(
                    "poll cycle: {} new, next window after {}",
                    fresh.len(),
                    cursor.after()
                );
                if !fresh.is_empty() {
                    observers.notify(&fresh);
                }
            }
            Err(ApiError::Auth) => {
                log::error!("polling stopped: {}", ApiError::Auth);
                observers.notify_error(&ApiError::Auth);
                break;
            }
            Err(e) => {
                log::warn!("poll cycle failed: {}", e);
                observers.notify_error(&e);
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop_rx.changed() => break,
        }
    }
    log::info!("poll loop stopped");
}
