//! In-memory collaborators for tests and offline demos.
//!
//! One `MockServices` plays all four collaborator roles. Answers are
//! scripted per key (endpoint URL, entity name, request text, query text)
//! with an optional delay, so tests can force any completion order. Every
//! call is recorded.

use crate::{
    naming, Endpoint, EndpointDirectory, EntityDescriptor, GenerationRequest, GenerationResult,
    QueryExecutor, QueryGenerator, ResultStream, SchemaIntrospection, ServiceError,
};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

/// A recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListEndpoints,
    ListEntities { endpoint_url: String },
    ListFields { entity_name: String },
    Generate { endpoint_url: String, model: String, text: String },
    Execute { endpoint_url: String, query: String },
}

#[derive(Debug, Clone)]
struct Scripted<T> {
    outcome: Result<T, ServiceError>,
    delay: Duration,
}

impl<T: Clone> Scripted<T> {
    fn ok(value: T) -> Self {
        Self {
            outcome: Ok(value),
            delay: Duration::ZERO,
        }
    }

    fn err(err: ServiceError) -> Self {
        Self {
            outcome: Err(err),
            delay: Duration::ZERO,
        }
    }

    fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn play(&self) -> Result<T, ServiceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

#[derive(Debug, Default)]
pub struct MockServices {
    endpoints: Vec<Endpoint>,
    entities: HashMap<String, Scripted<Vec<EntityDescriptor>>>,
    fields: HashMap<String, Scripted<Vec<String>>>,
    generations: HashMap<String, Scripted<GenerationResult>>,
    results: HashMap<String, Scripted<Value>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small book catalogue: two endpoints, `Book` and `Author` entities,
    /// and scripted answers for a few requests.
    pub fn bookstore() -> Self {
        const BOOKS: &str = "https://books.example/graphql";
        Self::new()
            .with_endpoint(Endpoint::named("Bookstore", BOOKS))
            .with_endpoint(Endpoint::named(
                "Countries API",
                "https://countries.trevorblades.com/",
            ))
            .with_entities(
                BOOKS,
                ["https://schema.example/Book", "https://schema.example/Author"],
            )
            .with_fields(
                "Book",
                [
                    "https://schema.example/Book/title",
                    "https://schema.example/Book/author",
                    "https://schema.example/Book/year",
                ],
            )
            .with_fields(
                "Author",
                [
                    "https://schema.example/Author/name",
                    "https://schema.example/Author/books",
                ],
            )
            .with_generation(
                "list all books",
                GenerationResult::query("{ books { title } }"),
            )
            .with_result(
                "{ books { title } }",
                json!({ "books": [{ "title": "Dune" }, { "title": "Solaris" }] }),
            )
            .with_result(
                "{ authors { name } }",
                json!({ "authors": [{ "name": "Frank Herbert" }, { "name": "Stanisław Lem" }] }),
            )
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_entities<I, S>(mut self, endpoint_url: &str, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entities = uris.into_iter().map(EntityDescriptor::new).collect();
        self.entities
            .insert(endpoint_url.to_string(), Scripted::ok(entities));
        self
    }

    pub fn with_entities_failure(mut self, endpoint_url: &str, err: ServiceError) -> Self {
        self.entities
            .insert(endpoint_url.to_string(), Scripted::err(err));
        self
    }

    pub fn with_fields<I, S>(self, entity_name: &str, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_fields_after(entity_name, uris, Duration::ZERO)
    }

    /// Fields of `entity_name`, answered after `delay`.
    pub fn with_fields_after<I, S>(mut self, entity_name: &str, uris: I, delay: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = uris.into_iter().map(Into::into).collect();
        self.fields
            .insert(entity_name.to_string(), Scripted::ok(fields).after(delay));
        self
    }

    pub fn with_generation(self, text: &str, result: GenerationResult) -> Self {
        self.with_generation_after(text, result, Duration::ZERO)
    }

    /// Answer for request `text`, delivered after `delay`.
    pub fn with_generation_after(
        mut self,
        text: &str,
        result: GenerationResult,
        delay: Duration,
    ) -> Self {
        self.generations
            .insert(text.to_string(), Scripted::ok(result).after(delay));
        self
    }

    pub fn with_generation_failure(mut self, text: &str, err: ServiceError) -> Self {
        self.generations.insert(text.to_string(), Scripted::err(err));
        self
    }

    pub fn with_result(self, query: &str, data: Value) -> Self {
        self.with_result_after(query, data, Duration::ZERO)
    }

    pub fn with_result_after(mut self, query: &str, data: Value, delay: Duration) -> Self {
        self.results
            .insert(query.to_string(), Scripted::ok(data).after(delay));
        self
    }

    pub fn with_execution_failure(mut self, query: &str, err: ServiceError) -> Self {
        self.results.insert(query.to_string(), Scripted::err(err));
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn generate_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, MockCall::Generate { .. }))
            .count()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }

    /// Unscripted request: a naive query over the first known entity the
    /// text mentions, or a message when it mentions none.
    fn fallback_generation(&self, request: &GenerationRequest) -> GenerationResult {
        let words: Vec<String> = request
            .text
            .split_whitespace()
            .map(naming::normalize_case)
            .collect();
        let known = self
            .entities
            .get(&request.endpoint.url)
            .and_then(|s| s.outcome.as_ref().ok());
        let mentioned = known.into_iter().flatten().find_map(|entity| {
            let name = entity.short_name()?;
            let plural = format!("{name}s");
            words
                .iter()
                .any(|w| *w == name || *w == plural)
                .then_some(name)
        });

        let Some(entity) = mentioned else {
            return GenerationResult::message(format!(
                "No entity of {} matches \"{}\"",
                request.endpoint.label(),
                request.text
            ));
        };

        let selection = self
            .fields
            .get(&entity)
            .and_then(|s| s.outcome.as_ref().ok())
            .map(|uris| {
                uris.iter()
                    .filter_map(|u| naming::field_short_name(u))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "id".to_string());
        GenerationResult::query(format!(
            "{{ {}s {{ {} }} }}",
            entity.to_lowercase(),
            selection
        ))
    }
}

#[async_trait]
impl EndpointDirectory for MockServices {
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>, ServiceError> {
        self.record(MockCall::ListEndpoints);
        Ok(self.endpoints.clone())
    }
}

#[async_trait]
impl SchemaIntrospection for MockServices {
    async fn list_entities(
        &self,
        endpoint_url: &str,
    ) -> Result<Vec<EntityDescriptor>, ServiceError> {
        self.record(MockCall::ListEntities {
            endpoint_url: endpoint_url.to_string(),
        });
        match self.entities.get(endpoint_url) {
            Some(scripted) => scripted.play().await,
            None => Ok(Vec::new()),
        }
    }

    async fn list_fields(&self, entity_name: &str) -> Result<Vec<String>, ServiceError> {
        self.record(MockCall::ListFields {
            entity_name: entity_name.to_string(),
        });
        match self.fields.get(entity_name) {
            Some(scripted) => scripted.play().await,
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryGenerator for MockServices {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ServiceError> {
        self.record(MockCall::Generate {
            endpoint_url: request.endpoint.url.clone(),
            model: request.model.to_string(),
            text: request.text.clone(),
        });
        match self.generations.get(&request.text) {
            Some(scripted) => scripted.play().await,
            None => Ok(self.fallback_generation(request)),
        }
    }
}

impl QueryExecutor for MockServices {
    fn watch_query(&self, endpoint_url: &str, query: &str, _: Option<&Value>) -> ResultStream {
        self.record(MockCall::Execute {
            endpoint_url: endpoint_url.to_string(),
            query: query.to_string(),
        });
        let scripted = self.results.get(query).cloned().unwrap_or_else(|| {
            Scripted::err(ServiceError::GraphQl(vec![json!({
                "message": format!("Syntax Error: unexpected query {query:?}")
            })]))
        });
        futures::stream::once(async move { scripted.play().await }).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelChoice;

    fn request(text: &str) -> GenerationRequest {
        GenerationRequest {
            endpoint: Endpoint::new("https://books.example/graphql"),
            model: ModelChoice::Custom,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_scripted_generation_wins_over_fallback() {
        let mock = MockServices::bookstore();
        let result = mock.generate(&request("list all books")).await.unwrap();
        assert_eq!(result, GenerationResult::query("{ books { title } }"));
        assert_eq!(
            mock.calls(),
            vec![MockCall::Generate {
                endpoint_url: "https://books.example/graphql".to_string(),
                model: "Custom".to_string(),
                text: "list all books".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_fallback_generation_uses_schema() {
        let mock = MockServices::bookstore();
        let result = mock.generate(&request("show me every author")).await.unwrap();
        assert_eq!(result, GenerationResult::query("{ authors { name books } }"));

        let nothing = mock.generate(&request("what is the weather")).await.unwrap();
        assert!(nothing.query.is_none());
        assert!(nothing.message.unwrap().starts_with("No entity of https://books.example/graphql"));
    }

    #[tokio::test]
    async fn test_unknown_query_fails_like_a_graphql_server() {
        let mock = MockServices::bookstore();
        let mut results = mock.watch_query("https://books.example/graphql", "{ nope }", None);
        let first = results.next().await.unwrap();
        assert!(matches!(first, Err(ServiceError::GraphQl(errors)) if errors.len() == 1));
    }
}
