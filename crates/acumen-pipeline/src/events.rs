//! Query event system for observability.
//!
//! Emits [`QueryEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, SSE streams, tests) can follow query
//! execution progress without coupling to the engine internals.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted during query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueryEvent {
    QueryStarted {
        query_id: Uuid,
        query_name: String,
        stage_count: usize,
    },
    StageStarted {
        query_id: Uuid,
        stage: String,
    },
    StageCompleted {
        query_id: Uuid,
        stage: String,
        duration_ms: u64,
    },
    StageRetrying {
        query_id: Uuid,
        stage: String,
        attempt: u32,
        delay_ms: u64,
    },
    StageFailed {
        query_id: Uuid,
        stage: String,
        error: String,
    },
    ValidationChecked {
        query_id: Uuid,
        ok: bool,
    },
    QueryCancelled {
        query_id: Uuid,
    },
    QueryCompleted {
        query_id: Uuid,
        status: String,
        duration_ms: u64,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<QueryEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: QueryEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<QueryEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
