//! Session events for observers.
//!
//! Events report what a pipeline did; they never drive state. Handlers run
//! outside the state lock and may read the session freely.

use crate::gate::Ticket;
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

/// The three latest-wins pipelines of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Pipeline {
    Suggestions,
    Generation,
    Execution,
}

/// Events emitted by a composer session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ComposerEvent {
    /// A non-empty suggestion list was delivered
    SuggestionsReady {
        token: String,
        suggestions: Vec<String>,
    },
    /// Query text written by the generation pipeline
    QueryGenerated { ticket: Ticket, text: String },
    /// Generation service failed; query text left untouched
    GenerationFailed { ticket: Ticket, message: String },
    /// Result pane text written by the execution pipeline
    ResultReady {
        ticket: Ticket,
        text: String,
        failed: bool,
    },
    /// A superseded operation finished and its result was dropped
    Discarded { pipeline: Pipeline, ticket: Ticket },
    /// Session torn down
    Closed { session_id: Uuid },
}

/// Callback for composer events
pub type ComposerEventHandler = Box<dyn Fn(ComposerEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct EventBus {
    handlers: RwLock<Vec<ComposerEventHandler>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self, handler: ComposerEventHandler) {
        self.handlers.write().push(handler);
    }

    pub(crate) fn emit(&self, event: ComposerEvent) {
        for handler in self.handlers.read().iter() {
            handler(event.clone());
        }
    }
}
