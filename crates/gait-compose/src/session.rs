//! Composer session: one activation of the composition tool.
//!
//! A session owns the composition state, the three pipelines and every task
//! they spawn. Dropping the session (or calling [`ComposerSession::close`])
//! detaches all of them; nothing is delivered afterwards.

use crate::events::{ComposerEvent, ComposerEventHandler};
use crate::execution::ExecutionPipeline;
use crate::gate::Ticket;
use crate::generation::GenerationPipeline;
use crate::runtime::Shared;
use crate::state::CompositionState;
use crate::suggestions::SuggestionPipeline;
use crate::{ComposeError, Endpoint, GenerationRequest, ModelChoice, Services};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

pub struct ComposerSession {
    id: Uuid,
    services: Services,
    shared: Shared,
    endpoints: RwLock<Vec<Endpoint>>,
    suggestions: SuggestionPipeline,
    generation: GenerationPipeline,
    execution: ExecutionPipeline,
    suggestion_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<String>>>>,
    closed: AtomicBool,
}

impl ComposerSession {
    /// Fresh state with `model` selected and no endpoint.
    ///
    /// Pipeline work is spawned onto the ambient Tokio runtime, so
    /// submissions must happen inside one.
    pub fn new(services: Services, model: ModelChoice) -> Self {
        let (sink, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        debug!(session = %id, %model, "composer session created");
        Self {
            id,
            shared: Shared::new(CompositionState::new(model)),
            endpoints: RwLock::new(Vec::new()),
            suggestions: SuggestionPipeline::new(services.schema.clone(), sink),
            generation: GenerationPipeline::new(services.generator.clone()),
            execution: ExecutionPipeline::new(services.executor.clone()),
            suggestion_rx: Mutex::new(Some(rx)),
            services,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // ========================================================================
    // Endpoint and model selection
    // ========================================================================

    /// Load the endpoint directory and, unless the user already picked one,
    /// select its first entry. Returns the selected endpoint.
    pub async fn activate(&self) -> Result<Option<Endpoint>, ComposeError> {
        self.ensure_open()?;
        let listed = self
            .services
            .directory
            .list_endpoints()
            .await
            .map_err(ComposeError::Directory)?;
        self.ensure_open()?;

        let first = listed.first().cloned();
        *self.endpoints.write() = listed;
        let selected = self.shared.update(|state| {
            if state.selected_endpoint.is_none() {
                state.selected_endpoint = first;
            }
            state.selected_endpoint.clone()
        });
        info!(
            session = %self.id,
            endpoints = self.endpoints.read().len(),
            selected = selected.as_ref().map(Endpoint::label),
            "composer session activated"
        );
        Ok(selected)
    }

    /// Endpoints loaded by [`activate`](Self::activate).
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.read().clone()
    }

    /// Select the endpoint with `url`.
    ///
    /// URLs missing from the directory are accepted as ad-hoc endpoints when
    /// they parse as absolute http(s) URLs.
    pub fn select_endpoint(&self, url: &str) -> Result<Endpoint, ComposeError> {
        self.ensure_open()?;
        let url = url.trim();
        let endpoint = match self.endpoints.read().iter().find(|e| e.url == url) {
            Some(listed) => listed.clone(),
            None => {
                let parsed = url::Url::parse(url)
                    .map_err(|_| ComposeError::InvalidEndpoint(url.to_string()))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(ComposeError::InvalidEndpoint(url.to_string()));
                }
                Endpoint::new(url)
            }
        };
        debug!(session = %self.id, endpoint = %endpoint.url, "endpoint selected");
        self.shared
            .update(|state| state.selected_endpoint = Some(endpoint.clone()));
        Ok(endpoint)
    }

    pub fn select_model(&self, model: ModelChoice) -> Result<(), ComposeError> {
        self.ensure_open()?;
        debug!(session = %self.id, %model, "model selected");
        self.shared.update(|state| state.selected_model = model);
        Ok(())
    }

    // ========================================================================
    // Natural-language input and suggestions
    // ========================================================================

    /// Replace the natural-language text, then treat it as an input edit.
    pub fn set_natural_language(&self, text: &str) -> Option<Ticket> {
        if self.is_closed() {
            return None;
        }
        self.shared
            .update(|state| state.natural_language_text = Some(text.to_string()));
        self.on_input_changed(text)
    }

    /// Input edit: submit the trailing token for suggestion lookup.
    /// Blank input submits nothing.
    pub fn on_input_changed(&self, raw: &str) -> Option<Ticket> {
        if self.is_closed() {
            return None;
        }
        self.suggestions.submit(&self.shared, raw)
    }

    /// Receiver of delivered suggestion lists. Handed out once.
    pub fn suggestions(&self) -> Option<mpsc::UnboundedReceiver<Vec<String>>> {
        self.suggestion_rx.lock().take()
    }

    /// A suggestion was picked from the rendered list.
    pub fn suggestion_selected(&self, text: &str) -> Result<(), ComposeError> {
        self.add_suggestion(text)
    }

    /// Append `" " + text` to the natural-language text.
    pub fn add_suggestion(&self, text: &str) -> Result<(), ComposeError> {
        self.ensure_open()?;
        self.shared.update(|state| state.append_to_request(text));
        Ok(())
    }

    // ========================================================================
    // Generation and execution
    // ========================================================================

    /// Hand edit of the query text.
    pub fn set_query_text(&self, text: &str) -> Result<(), ComposeError> {
        self.ensure_open()?;
        self.shared
            .update(|state| state.generated_query_text = text.to_string());
        Ok(())
    }

    /// Submit the trimmed natural-language text for generation.
    ///
    /// `Ok(None)` when the text is blank: nothing is mutated and the
    /// generator is not called. Without a selected endpoint the call is
    /// rejected, equally without side effects.
    pub fn generate_query(&self) -> Result<Option<Ticket>, ComposeError> {
        self.ensure_open()?;
        let state = self.shared.snapshot();
        let Some(text) = state.request_text() else {
            debug!(session = %self.id, "blank request, generation skipped");
            return Ok(None);
        };
        let endpoint = state
            .selected_endpoint
            .clone()
            .ok_or(ComposeError::NoEndpointSelected)?;
        let request = GenerationRequest {
            endpoint,
            model: state.selected_model,
            text: text.to_string(),
        };
        Ok(Some(self.generation.submit(&self.shared, request)))
    }

    /// Execute the current query text against the selected endpoint.
    ///
    /// Callers gate this on [`CompositionState::can_execute`]; the query
    /// text is not re-validated here.
    pub fn send_query(&self) -> Result<Ticket, ComposeError> {
        self.ensure_open()?;
        let state = self.shared.snapshot();
        let endpoint = state
            .selected_endpoint
            .ok_or(ComposeError::NoEndpointSelected)?;
        Ok(self
            .execution
            .submit(&self.shared, endpoint.url, state.generated_query_text))
    }

    // ========================================================================
    // Observation and teardown
    // ========================================================================

    pub fn snapshot(&self) -> CompositionState {
        self.shared.snapshot()
    }

    /// Receiver that sees every committed state.
    pub fn subscribe(&self) -> watch::Receiver<CompositionState> {
        self.shared.state.subscribe()
    }

    /// Register an event handler.
    ///
    /// Handlers run on pipeline tasks and must not register further
    /// handlers from inside the callback.
    pub fn on_event(&self, handler: ComposerEventHandler) {
        self.shared.events.subscribe(handler);
    }

    /// Detach every pipeline: stale and pending results are refused,
    /// in-flight tasks are aborted and the suggestion channel is closed.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.suggestions.close();
        self.generation.close();
        self.execution.close();
        self.shared.tasks.abort_all();
        info!(session = %self.id, "composer session closed");
        self.shared.emit(ComposerEvent::Closed {
            session_id: self.id,
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), ComposeError> {
        if self.is_closed() {
            Err(ComposeError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for ComposerSession {
    fn drop(&mut self) {
        self.close();
    }
}
