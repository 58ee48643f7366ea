//! Networked collaborators.
//!
//! - [`QueryManagerClient`]: the query manager service, which serves the
//!   endpoint directory (`GET /apis`), schema lookups (`GET /entities`,
//!   `GET /entities/{entity}`) and query generation (`POST /generate_query`).
//! - [`GraphQlHttpExecutor`]: GraphQL over HTTP POST against the endpoint
//!   itself.

use crate::{
    ComposerConfig, Endpoint, EndpointDirectory, EntityDescriptor, GenerationRequest,
    GenerationResult, QueryExecutor, QueryGenerator, ResultStream, SchemaIntrospection,
    ServiceError,
};
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::OnceLock;
use tracing::debug;

/// Shared HTTP client honouring the configured timeout.
pub fn build_client(config: &ComposerConfig) -> Result<Client, ServiceError> {
    let mut builder = Client::builder();
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(transport)
}

fn transport(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Transport("timeout".to_string())
    } else {
        ServiceError::Transport(err.to_string())
    }
}

/// Non-2xx answer as an error. FastAPI's `{"detail": "..."}` is unwrapped.
pub fn http_error(status: u16, body: &str) -> ServiceError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string));
    ServiceError::Http {
        status,
        body: detail.unwrap_or_else(|| body.trim().to_string()),
    }
}

/// Remove a leading "```graphql" line and a trailing "```" fence.
pub fn strip_code_fence(raw: &str) -> String {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"^```graphql\n|```$").ok());
    match fence {
        Some(re) => re.replace_all(raw, "").trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Reads an entity list given either as `[{"uri": ...}]` or as bare URIs.
pub fn parse_entities(data: Value) -> Result<Vec<EntityDescriptor>, ServiceError> {
    let Value::Array(items) = data else {
        return Err(ServiceError::InvalidResponse(
            "expected an array of entities".to_string(),
        ));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(uri) => Ok(EntityDescriptor::new(uri)),
            Value::Object(mut fields) => match fields.remove("uri") {
                Some(Value::String(uri)) => Ok(EntityDescriptor::new(uri)),
                _ => Err(ServiceError::InvalidResponse(
                    "entity without a `uri`".to_string(),
                )),
            },
            other => Err(ServiceError::InvalidResponse(format!(
                "unexpected entity {other}"
            ))),
        })
        .collect()
}

/// Applies GraphQL-over-HTTP response rules: any `errors` fail the request,
/// otherwise `data` is the result.
pub fn interpret_graphql_response(status: u16, body: &str) -> Result<Value, ServiceError> {
    let success = (200..300).contains(&status);
    let parsed: Value = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) if !success => return Err(http_error(status, body)),
        Err(e) => return Err(ServiceError::InvalidResponse(e.to_string())),
    };
    if let Some(errors) = parsed.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            return Err(ServiceError::GraphQl(errors.clone()));
        }
    }
    match parsed.get("data") {
        Some(data) if !data.is_null() && success => Ok(data.clone()),
        _ if !success => Err(http_error(status, body)),
        _ => Err(ServiceError::InvalidResponse(
            "response has neither data nor errors".to_string(),
        )),
    }
}

// ============================================================================
// Query manager
// ============================================================================

pub struct QueryManagerClient {
    client: Client,
    base_url: String,
}

impl QueryManagerClient {
    /// `base_url` is expected normalised (see [`crate::config::normalize_base_url`]).
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, ServiceError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ServiceError::Transport(format!("bad base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Transport("base url cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http_error(status.as_u16(), &body));
        }
        response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl EndpointDirectory for QueryManagerClient {
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>, ServiceError> {
        let url = self.url(&["apis"])?;
        debug!(%url, "listing endpoints");
        let response = self.client.get(url).send().await.map_err(transport)?;
        Self::read(response).await
    }
}

#[async_trait]
impl SchemaIntrospection for QueryManagerClient {
    async fn list_entities(
        &self,
        endpoint_url: &str,
    ) -> Result<Vec<EntityDescriptor>, ServiceError> {
        let url = self.url(&["entities"])?;
        let response = self
            .client
            .get(url)
            .query(&[("api_url", endpoint_url)])
            .send()
            .await
            .map_err(transport)?;
        parse_entities(Self::read(response).await?)
    }

    async fn list_fields(&self, entity_name: &str) -> Result<Vec<String>, ServiceError> {
        let url = self.url(&["entities", entity_name])?;
        let response = self.client.get(url).send().await.map_err(transport)?;
        Self::read(response).await
    }
}

#[async_trait]
impl QueryGenerator for QueryManagerClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ServiceError> {
        let url = self.url(&["generate_query"])?;
        let body = json!({
            "api_url": request.endpoint.url,
            "model": request.model.as_str(),
            "user_input": request.text,
        });
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let mut result: GenerationResult = Self::read(response).await?;
        result.query = result
            .query
            .map(|q| strip_code_fence(&q))
            .filter(|q| !q.is_empty());
        Ok(result)
    }
}

// ============================================================================
// GraphQL executor
// ============================================================================

pub struct GraphQlHttpExecutor {
    client: Client,
}

impl GraphQlHttpExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl QueryExecutor for GraphQlHttpExecutor {
    /// Plain HTTP delivers exactly one value per query.
    fn watch_query(
        &self,
        endpoint_url: &str,
        query: &str,
        variables: Option<&Value>,
    ) -> ResultStream {
        let mut body = json!({ "query": query });
        if let Some(variables) = variables {
            body["variables"] = variables.clone();
        }
        let request = self.client.post(endpoint_url).json(&body);
        futures::stream::once(async move {
            let response = request.send().await.map_err(transport)?;
            let status = response.status().as_u16();
            let text = response.text().await.map_err(transport)?;
            interpret_graphql_response(status, &text)
        })
        .boxed()
    }
}
