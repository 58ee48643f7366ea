//! Suggestion pipeline: trailing token → entity match → field names.
//!
//! Every edit of the natural-language input submits its trailing token.
//! A lookup fetches the endpoint's entities, and when the token names one
//! of them (case-normalised), fetches that entity's fields. Non-empty
//! results of the latest token are pushed onto the suggestion channel;
//! empty results and lookup failures are swallowed so the rendered list
//! does not change.

use crate::events::{ComposerEvent, Pipeline};
use crate::gate::{LatestGate, Ticket};
use crate::naming;
use crate::runtime::Shared;
use crate::{EntityDescriptor, SchemaIntrospection, ServiceError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Field suggestions for `token` on the endpoint at `endpoint_url`.
///
/// Empty when the token names no entity of the endpoint.
pub async fn lookup_suggestions(
    schema: &dyn SchemaIntrospection,
    endpoint_url: &str,
    token: &str,
) -> Result<Vec<String>, ServiceError> {
    let entities = schema.list_entities(endpoint_url).await?;
    let Some(entity) = entities
        .iter()
        .filter_map(EntityDescriptor::short_name)
        .find(|name| naming::matches_entity(token, name))
    else {
        return Ok(Vec::new());
    };

    let fields = schema.list_fields(&entity).await?;
    Ok(fields
        .iter()
        .filter_map(|uri| naming::field_short_name(uri))
        .map(str::to_string)
        .collect())
}

pub(crate) struct SuggestionPipeline {
    schema: Arc<dyn SchemaIntrospection>,
    gate: Arc<LatestGate>,
    sink: Mutex<Option<mpsc::UnboundedSender<Vec<String>>>>,
}

impl SuggestionPipeline {
    pub(crate) fn new(
        schema: Arc<dyn SchemaIntrospection>,
        sink: mpsc::UnboundedSender<Vec<String>>,
    ) -> Self {
        Self {
            schema,
            gate: Arc::new(LatestGate::new()),
            sink: Mutex::new(Some(sink)),
        }
    }

    /// Submit the trailing token of `raw`. Blank input submits nothing.
    pub(crate) fn submit(&self, shared: &Shared, raw: &str) -> Option<Ticket> {
        let token = naming::trailing_token(raw)?.to_string();
        let sink = self.sink.lock().clone()?;
        let endpoint = shared.state.borrow().selected_endpoint.clone();
        let ticket = self.gate.issue();
        debug!(%ticket, token = %token, "suggestion lookup submitted");

        let schema = Arc::clone(&self.schema);
        let gate = Arc::clone(&self.gate);
        let task_shared = shared.clone();
        shared.tasks.spawn(async move {
            let suggestions = match endpoint {
                Some(endpoint) => {
                    match lookup_suggestions(schema.as_ref(), &endpoint.url, &token).await {
                        Ok(found) => found,
                        Err(err) => {
                            warn!(%ticket, token = %token, error = %err, "suggestion lookup failed");
                            Vec::new()
                        }
                    }
                }
                None => Vec::new(),
            };
            if suggestions.is_empty() {
                debug!(%ticket, token = %token, "no suggestions");
                return;
            }

            match gate.admit(ticket, || sink.send(suggestions.clone()).is_ok()) {
                Some(true) => task_shared.emit(ComposerEvent::SuggestionsReady {
                    token,
                    suggestions,
                }),
                Some(false) => debug!(%ticket, "suggestion receiver dropped"),
                None => {
                    debug!(%ticket, "stale suggestions discarded");
                    task_shared.emit(ComposerEvent::Discarded {
                        pipeline: Pipeline::Suggestions,
                        ticket,
                    });
                }
            }
        });
        Some(ticket)
    }

    pub(crate) fn close(&self) {
        self.gate.retire();
        self.sink.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockServices;

    fn bookstore() -> MockServices {
        MockServices::new()
            .with_entities(
                "https://books.example/graphql",
                ["https://schema.example/Book", "https://schema.example/Author/"],
            )
            .with_fields(
                "Book",
                ["https://schema.example/Book/title", "https://schema.example/Book/author"],
            )
    }

    #[tokio::test]
    async fn test_lookup_matches_whole_entity_name() {
        let mock = bookstore();
        let found = lookup_suggestions(&mock, "https://books.example/graphql", "BOOK")
            .await
            .unwrap();
        assert_eq!(found, vec!["title", "author"]);

        let partial = lookup_suggestions(&mock, "https://books.example/graphql", "boo")
            .await
            .unwrap();
        assert!(partial.is_empty());

        let plural = lookup_suggestions(&mock, "https://books.example/graphql", "books")
            .await
            .unwrap();
        assert!(plural.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_requests_fields_by_normalized_name() {
        let mock = bookstore().with_fields("Author", ["https://schema.example/Author/name"]);
        let found = lookup_suggestions(&mock, "https://books.example/graphql", "aUTHOR")
            .await
            .unwrap();
        assert_eq!(found, vec!["name"]);
    }

    #[tokio::test]
    async fn test_lookup_propagates_service_failure() {
        let mock = bookstore().with_entities_failure(
            "https://books.example/graphql",
            ServiceError::Transport("connection refused".to_string()),
        );
        let err = lookup_suggestions(&mock, "https://books.example/graphql", "book")
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Transport("connection refused".to_string()));
    }
}
