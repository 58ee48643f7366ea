//! Error types for collaborators and session operations.

use serde_json::{json, Value};

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// Connection, timeout or other transport-level failure
    #[error("{0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// GraphQL `errors` array returned without data
    #[error("GraphQL request failed with {} error(s)", .0.len())]
    GraphQl(Vec<Value>),
    #[error("query produced no result")]
    EmptyResponse,
}

impl ServiceError {
    /// Failure details for the `error` member of a displayed error payload.
    pub fn details(&self) -> Value {
        match self {
            ServiceError::Transport(msg) | ServiceError::InvalidResponse(msg) => {
                Value::String(msg.clone())
            }
            ServiceError::Http { status, body } => json!({ "status": status, "body": body }),
            ServiceError::GraphQl(errors) => Value::Array(errors.clone()),
            ServiceError::EmptyResponse => Value::String(self.to_string()),
        }
    }

    /// `{"error": <details>}`
    pub fn to_payload(&self) -> Value {
        json!({ "error": self.details() })
    }
}

/// Rejected session operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComposeError {
    #[error("no endpoint selected")]
    NoEndpointSelected,
    #[error("not a usable endpoint url: {0}")]
    InvalidEndpoint(String),
    #[error("unknown model `{0}` (expected one of: OpenAi, Custom)")]
    UnknownModel(String),
    #[error("session is closed")]
    SessionClosed,
    #[error("failed to load endpoint directory: {0}")]
    Directory(#[source] ServiceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_payload_is_bare_message() {
        let err = ServiceError::Transport("timeout".to_string());
        assert_eq!(err.to_payload(), json!({ "error": "timeout" }));
        assert_eq!(err.to_string(), "timeout");
    }

    #[test]
    fn test_graphql_payload_keeps_errors() {
        let err = ServiceError::GraphQl(vec![json!({ "message": "Cannot query field \"x\"" })]);
        assert_eq!(
            err.to_payload(),
            json!({ "error": [{ "message": "Cannot query field \"x\"" }] })
        );
        assert_eq!(err.to_string(), "GraphQL request failed with 1 error(s)");
    }

    #[test]
    fn test_http_payload_is_structured() {
        let err = ServiceError::Http {
            status: 500,
            body: "Failed to call OpenAI API".to_string(),
        };
        assert_eq!(err.details()["status"], 500);
        assert_eq!(err.to_string(), "HTTP 500: Failed to call OpenAI API");
    }
}
