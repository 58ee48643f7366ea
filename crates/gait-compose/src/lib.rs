//! GAIT Compose: interactive GraphQL query composition
//!
//! This crate is the engine behind the GAIT tool: a user types a request in
//! natural language, picks an API endpoint and a generation model, gets a
//! generated GraphQL query back, may edit it, executes it and reads the JSON
//! result. While the request is typed, the engine offers field suggestions
//! drawn from the endpoint's schema.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        COMPOSER SESSION                                  │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │  keystrokes ──► ┌──────────────┐   entities/fields   ┌───────────────┐   │
//! │                 │  Suggestion  │◄───────────────────►│    Schema     │   │
//! │                 │  pipeline    │──► suggestions      │ Introspection │   │
//! │                 └──────────────┘                     └───────────────┘   │
//! │                                                                          │
//! │  submit ──────► ┌──────────────┐   (endpoint, model, text)               │
//! │                 │  Generation  │◄───────────────────►┌───────────────┐   │
//! │                 │  pipeline    │                     │   Generator   │   │
//! │                 └──────┬───────┘                     └───────────────┘   │
//! │                        ▼                                                 │
//! │                 ┌──────────────┐  watch channel                          │
//! │                 │ Composition  │──────────────────► presentation layer   │
//! │                 │    State     │                                         │
//! │                 └──────▲───────┘                                         │
//! │                        │                                                 │
//! │  execute ─────► ┌──────┴───────┐   (endpoint, query) ┌───────────────┐   │
//! │                 │  Execution   │◄───────────────────►│   Executor    │   │
//! │                 │  pipeline    │                     └───────────────┘   │
//! │                 └──────────────┘                                         │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each pipeline is latest-submission-wins: a newer submission revokes the
//! right of every older, still pending operation of the same pipeline to
//! touch shared state. Pipelines never cancel each other.
//!
//! The collaborators (endpoint directory, schema introspection, query
//! generation, query execution) are traits; `http` provides the networked
//! implementations and `mock` an in-memory set for tests and demos.

pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod gate;
pub mod generation;
#[cfg(feature = "http")]
pub mod http;
pub mod mock;
pub mod naming;
mod runtime;
pub mod session;
pub mod state;
pub mod suggestions;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use config::{ComposerConfig, ConfigError};
pub use error::{ComposeError, ServiceError};
pub use events::{ComposerEvent, ComposerEventHandler, Pipeline};
pub use gate::{LatestGate, Ticket};
pub use mock::MockServices;
pub use session::ComposerSession;
pub use state::CompositionState;

// ============================================================================
// Core Types
// ============================================================================

/// A configured GraphQL API target. Identity is the URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    /// Display name supplied by the endpoint directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Any other directory-supplied metadata
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn named(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(url)
        }
    }

    /// Name when the directory gave one, the URL otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Endpoint {}

/// Query generation model offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelChoice {
    #[default]
    OpenAi,
    Custom,
}

impl ModelChoice {
    /// Every selectable model, in presentation order.
    pub const ALL: [ModelChoice; 2] = [ModelChoice::OpenAi, ModelChoice::Custom];

    /// Wire name sent to the generation service.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelChoice::OpenAi => "OpenAi",
            ModelChoice::Custom => "Custom",
        }
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelChoice {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ModelChoice::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ComposeError::UnknownModel(wanted.to_string()))
    }
}

/// An entity exposed by an endpoint's schema, identified by a resource URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub uri: String,
}

impl EntityDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// Case-normalised short name (`.../book/` → `Book`).
    pub fn short_name(&self) -> Option<String> {
        naming::entity_short_name(&self.uri)
    }
}

/// One submission to the generation service. Built per request, never kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub endpoint: Endpoint,
    pub model: ModelChoice,
    pub text: String,
}

/// Generation service answer: a query, or a message explaining why there is
/// none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GenerationResult {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            query: None,
            message: Some(message.into()),
        }
    }

    /// Text for the query editor: the query when present, else the message.
    pub fn display_text(&self) -> Option<&str> {
        self.query.as_deref().or(self.message.as_deref())
    }
}

/// Values emitted by one query execution. Transports may emit more than once
/// (live queries); the execution pipeline only reads the first item.
pub type ResultStream = BoxStream<'static, Result<serde_json::Value, ServiceError>>;

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Lists the API endpoints a user can target.
#[async_trait]
pub trait EndpointDirectory: Send + Sync {
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>, ServiceError>;
}

/// Entity and field lookups for autocomplete.
#[async_trait]
pub trait SchemaIntrospection: Send + Sync {
    /// Entities exposed by the endpoint at `endpoint_url`
    async fn list_entities(&self, endpoint_url: &str)
        -> Result<Vec<EntityDescriptor>, ServiceError>;

    /// Field URIs of the entity called `entity_name` (case-normalised)
    async fn list_fields(&self, entity_name: &str) -> Result<Vec<String>, ServiceError>;
}

/// Turns natural language into a GraphQL query.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationResult, ServiceError>;
}

/// Runs a query against an endpoint.
pub trait QueryExecutor: Send + Sync {
    fn watch_query(
        &self,
        endpoint_url: &str,
        query: &str,
        variables: Option<&serde_json::Value>,
    ) -> ResultStream;
}

/// The collaborators one session talks to.
#[derive(Clone)]
pub struct Services {
    pub directory: Arc<dyn EndpointDirectory>,
    pub schema: Arc<dyn SchemaIntrospection>,
    pub generator: Arc<dyn QueryGenerator>,
    pub executor: Arc<dyn QueryExecutor>,
}

impl Services {
    /// Query manager + GraphQL-over-HTTP, configured from `config`.
    #[cfg(feature = "http")]
    pub fn http(config: &ComposerConfig) -> Result<Self, ServiceError> {
        let client = http::build_client(config)?;
        let manager = Arc::new(http::QueryManagerClient::new(
            client.clone(),
            &config.query_manager_url,
        ));
        Ok(Self {
            directory: manager.clone(),
            schema: manager.clone(),
            generator: manager,
            executor: Arc::new(http::GraphQlHttpExecutor::new(client)),
        })
    }

    /// Every collaborator backed by the same in-memory mock.
    pub fn mock(mock: Arc<MockServices>) -> Self {
        Self {
            directory: mock.clone(),
            schema: mock.clone(),
            generator: mock.clone(),
            executor: mock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_choice_parsing() {
        assert_eq!("openai".parse::<ModelChoice>().unwrap(), ModelChoice::OpenAi);
        assert_eq!(" CUSTOM ".parse::<ModelChoice>().unwrap(), ModelChoice::Custom);
        assert!(matches!(
            "gpt".parse::<ModelChoice>(),
            Err(ComposeError::UnknownModel(m)) if m == "gpt"
        ));
        assert_eq!(ModelChoice::default(), ModelChoice::ALL[0]);
    }

    #[test]
    fn test_endpoint_identity_is_url() {
        let a = Endpoint::named("Countries", "https://countries.trevorblades.com/");
        let b = Endpoint::new("https://countries.trevorblades.com/");
        assert_eq!(a, b);
        assert_eq!(a.label(), "Countries");
        assert_eq!(b.label(), "https://countries.trevorblades.com/");
    }

    #[test]
    fn test_endpoint_keeps_directory_metadata() {
        let endpoint: Endpoint = serde_json::from_value(serde_json::json!({
            "name": "TCGdex",
            "url": "https://api.tcgdex.net/v2/graphql",
            "auth": "none"
        }))
        .unwrap();
        assert_eq!(endpoint.name.as_deref(), Some("TCGdex"));
        assert_eq!(endpoint.metadata["auth"], "none");
    }

    #[test]
    fn test_generation_result_prefers_query() {
        let both = GenerationResult {
            query: Some("{ books { title } }".to_string()),
            message: Some("ignored".to_string()),
        };
        assert_eq!(both.display_text(), Some("{ books { title } }"));
        assert_eq!(
            GenerationResult::message("no match").display_text(),
            Some("no match")
        );
        assert_eq!(GenerationResult::default().display_text(), None);
    }
}
