//! Query execution pipeline.
//!
//! Each trigger raises `is_executing`, runs the current query against the
//! selected endpoint and reads exactly one value from the executor's
//! stream. Data is pretty-printed into the result pane; failures become a
//! pretty-printed `{"error": ...}` payload instead of propagating. Only the
//! latest trigger's result is applied.

use crate::events::{ComposerEvent, Pipeline};
use crate::gate::{LatestGate, Ticket};
use crate::runtime::Shared;
use crate::{QueryExecutor, ServiceError};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Indented JSON, two spaces per level.
pub fn render_data(data: &Value) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
}

/// Indented `{"error": <details>}` payload.
pub fn render_error(err: &ServiceError) -> String {
    render_data(&err.to_payload())
}

/// First emission of `watch_query`, rendered for the result pane.
/// The flag is true when the text is an error payload.
pub async fn execute_once(
    executor: &dyn QueryExecutor,
    endpoint_url: &str,
    query: &str,
    variables: Option<&Value>,
) -> (String, bool) {
    let mut results = executor.watch_query(endpoint_url, query, variables);
    match results.next().await {
        Some(Ok(data)) => (render_data(&data), false),
        Some(Err(err)) => (render_error(&err), true),
        None => (render_error(&ServiceError::EmptyResponse), true),
    }
}

pub(crate) struct ExecutionPipeline {
    executor: Arc<dyn QueryExecutor>,
    gate: Arc<LatestGate>,
}

impl ExecutionPipeline {
    pub(crate) fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            gate: Arc::new(LatestGate::new()),
        }
    }

    pub(crate) fn submit(&self, shared: &Shared, endpoint_url: String, query: String) -> Ticket {
        let gate = Arc::clone(&self.gate);
        let ticket = shared.update(|state| {
            state.begin_execution();
            gate.issue()
        });
        debug!(%ticket, endpoint = %endpoint_url, "execution submitted");

        let executor = Arc::clone(&self.executor);
        let task_shared = shared.clone();
        shared.tasks.spawn(async move {
            let (text, failed) =
                execute_once(executor.as_ref(), &endpoint_url, &query, None).await;

            let applied = task_shared.update_if(|state| {
                gate.admit(ticket, || state.finish_execution(text.clone()))
            });
            if applied.is_some() {
                info!(%ticket, failed, "execution result applied");
                task_shared.emit(ComposerEvent::ResultReady {
                    ticket,
                    text,
                    failed,
                });
            } else {
                debug!(%ticket, "stale execution result discarded");
                task_shared.emit(ComposerEvent::Discarded {
                    pipeline: Pipeline::Execution,
                    ticket,
                });
            }
        });
        ticket
    }

    pub(crate) fn close(&self) {
        self.gate.retire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockServices, ResultStream};
    use futures::{stream, StreamExt};
    use serde_json::json;

    struct LiveQuery;

    impl QueryExecutor for LiveQuery {
        fn watch_query(&self, _: &str, _: &str, _: Option<&Value>) -> ResultStream {
            stream::iter(vec![Ok(json!({ "tick": 1 })), Ok(json!({ "tick": 2 }))]).boxed()
        }
    }

    struct Silent;

    impl QueryExecutor for Silent {
        fn watch_query(&self, _: &str, _: &str, _: Option<&Value>) -> ResultStream {
            stream::empty().boxed()
        }
    }

    #[test]
    fn test_render_data_is_indented() {
        let text = render_data(&json!({ "books": [{ "title": "Dune" }] }));
        assert_eq!(
            text,
            "{\n  \"books\": [\n    {\n      \"title\": \"Dune\"\n    }\n  ]\n}"
        );
    }

    #[test]
    fn test_render_error_wraps_details() {
        let text = render_error(&ServiceError::Transport("timeout".to_string()));
        assert_eq!(text, "{\n  \"error\": \"timeout\"\n}");
    }

    #[tokio::test]
    async fn test_only_first_emission_is_used() {
        let (text, failed) = execute_once(&LiveQuery, "https://x.example", "{ tick }", None).await;
        assert!(!failed);
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({ "tick": 1 }));
    }

    #[tokio::test]
    async fn test_empty_stream_is_an_error_payload() {
        let (text, failed) = execute_once(&Silent, "https://x.example", "{ tick }", None).await;
        assert!(failed);
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({ "error": "query produced no result" })
        );
    }

    #[tokio::test]
    async fn test_mock_failure_renders_payload() {
        let mock = MockServices::new().with_execution_failure(
            "{ books { title } }",
            ServiceError::GraphQl(vec![json!({ "message": "boom" })]),
        );
        let (text, failed) =
            execute_once(&mock, "https://books.example/graphql", "{ books { title } }", None)
                .await;
        assert!(failed);
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({ "error": [{ "message": "boom" }] })
        );
    }
}
