//! Integration tests for the complete composition flow
//!
//! These tests drive a session the way the tool screen does:
//! - activation → endpoint directory → default selection
//! - typing → suggestions → picking one
//! - generation → hand edit → execution → result pane
//!
//! Run with: cargo test --test integration_tests

use gait_compose::{
    ComposerConfig, ComposerEvent, ComposerSession, MockServices, ModelChoice, Services,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BOOKS: &str = "https://books.example/graphql";

fn bookstore_session() -> ComposerSession {
    let config = ComposerConfig::default();
    ComposerSession::new(
        Services::mock(Arc::new(MockServices::bookstore())),
        config.default_model,
    )
}

// ============================================================================
// Full session
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_compose_generate_edit_execute() {
    let session = bookstore_session();
    let mut state = session.subscribe();
    let mut suggestions = session.suggestions().expect("suggestions taken once");

    let selected = session.activate().await.expect("directory loads");
    assert_eq!(selected.expect("first endpoint").url, BOOKS);
    assert_eq!(session.snapshot().selected_model, ModelChoice::OpenAi);

    // Typing an entity name offers its fields
    session.set_natural_language("show every author");
    let offered = suggestions.recv().await.expect("suggestions delivered");
    assert_eq!(offered, vec!["name", "books"]);
    session.suggestion_selected(&offered[0]).expect("session open");
    assert_eq!(
        session.snapshot().natural_language_text.as_deref(),
        Some("show every author name")
    );

    // Unscripted request: the mock builds a query over the mentioned entity
    session.generate_query().expect("endpoint selected");
    let generated = state
        .wait_for(|s| !s.is_generating)
        .await
        .expect("session alive")
        .generated_query_text
        .clone();
    assert_eq!(generated, "{ authors { name books } }");

    // Hand edit, then run
    session
        .set_query_text("{ authors { name } }")
        .expect("session open");
    assert!(session.snapshot().can_execute());
    session.send_query().expect("endpoint selected");
    let result = state
        .wait_for(|s| !s.is_executing)
        .await
        .expect("session alive")
        .result_text
        .clone()
        .expect("result written");
    let data: Value = serde_json::from_str(&result).expect("pretty JSON");
    assert_eq!(data["authors"][0], json!({ "name": "Frank Herbert" }));

    session.close();
    assert!(session.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_query_shows_error_payload() {
    let session = bookstore_session();
    session.activate().await.expect("directory loads");
    let mut state = session.subscribe();

    session.set_query_text("{ nope }").expect("session open");
    session.send_query().expect("endpoint selected");
    let result = state
        .wait_for(|s| !s.is_executing)
        .await
        .expect("session alive")
        .result_text
        .clone()
        .expect("result written");
    let payload: Value = serde_json::from_str(&result).expect("pretty JSON");
    assert!(payload["error"][0]["message"]
        .as_str()
        .expect("graphql error message")
        .starts_with("Syntax Error"));
}

#[tokio::test(start_paused = true)]
async fn test_events_follow_the_session() {
    let session = bookstore_session();
    session.activate().await.expect("directory loads");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.on_event(Box::new(move |event| {
        if let Ok(mut events) = sink.lock() {
            events.push(event);
        }
    }));

    session.set_natural_language("list all books");
    let ticket = session
        .generate_query()
        .expect("endpoint selected")
        .expect("non-blank request");
    tokio::time::sleep(Duration::from_secs(1)).await;
    let id = session.id();
    drop(session);

    let events = seen.lock().expect("no poisoned lock");
    assert!(events.contains(&ComposerEvent::QueryGenerated {
        ticket,
        text: "{ books { title } }".to_string(),
    }));
    assert_eq!(events.last(), Some(&ComposerEvent::Closed { session_id: id }));
}
