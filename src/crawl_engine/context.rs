//! Task-scoped collection context
//!
//! Everything a running task needs travels in one explicit context object
//! owned by the task: identifiers, the shared configuration, the event
//! channel, and the cancellation token. No ambient globals; concurrent
//! tasks each get their own context and never share coordinator state.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::infrastructure::config::AppConfig;

use super::events::TaskEvent;

/// Shared communication infrastructure for one collection session
#[derive(Clone)]
pub struct CollectionContext {
    /// Session identifier (one browser session)
    pub session_id: String,
    /// Task identifier (one keyword run within the session)
    pub task_id: String,
    /// System configuration
    pub config: Arc<AppConfig>,
    /// Event channel: independent state publishing (broadcast)
    event_tx: broadcast::Sender<TaskEvent>,
    /// Cancellation signal observable at every suspension point
    cancellation: CancellationToken,
}

impl CollectionContext {
    /// Create a fresh session context and its event receiver
    pub fn new(config: Arc<AppConfig>) -> (Self, broadcast::Receiver<TaskEvent>) {
        let (event_tx, event_rx) = broadcast::channel(256);
        let context = Self {
            session_id: Uuid::new_v4().to_string(),
            task_id: String::new(),
            config,
            event_tx,
            cancellation: CancellationToken::new(),
        };
        (context, event_rx)
    }

    /// Derive a task-scoped context for one keyword run
    pub fn with_task(&self) -> Self {
        let mut context = self.clone();
        context.task_id = Uuid::new_v4().to_string();
        context
    }

    /// Subscribe to task events
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_tx.subscribe()
    }

    /// Publish an event; a lagging or absent subscriber is not an error
    pub fn emit(&self, event: TaskEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Request cancellation of this session and all its tasks
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancellable jittered pause within `[min_ms, max_ms]`.
    /// Returns `false` when cancellation interrupted the pause.
    pub async fn paced_sleep(&self, min_ms: u64, max_ms: u64) -> bool {
        let span = max_ms.max(min_ms);
        let delay_ms = if span > min_ms {
            fastrand::u64(min_ms..=span)
        } else {
            min_ms
        };
        tokio::select! {
            () = tokio::time::sleep(std::time::Duration::from_millis(delay_ms)) => true,
            () = self.cancellation.cancelled() => false,
        }
    }
}
