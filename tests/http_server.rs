//! The HTTP surface exercised in-process with `oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use panacloud_agents::server::{router, AppState, SessionCreated};
use panacloud_agents::{AgentRegistry, ChatApp, ChatOptions, RunConfig, ScriptedProvider};

fn app(provider: ScriptedProvider) -> (Arc<AppState>, Router) {
    let registry = Arc::new(AgentRegistry::panacloud(Arc::new(provider)));
    let chat = ChatApp::new(registry, RunConfig::default(), ChatOptions::session());
    let state = Arc::new(AppState::new(chat));
    (state.clone(), router(state))
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn create_session(router: &Router) -> String {
    let response = router
        .clone()
        .oneshot(Request::post("/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: SessionCreated = serde_json::from_slice(&body_bytes(response).await).unwrap();
    created.session_id
}

fn post_message(id: &str, content: &str) -> Request<Body> {
    Request::post(format!("/sessions/{}/messages", id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "content": content }).to_string()))
        .unwrap()
}

/// JSON payloads of every `data:` line in an SSE body.
fn sse_events(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str(data.trim()).ok())
        .collect()
}

#[tokio::test]
async fn test_session_lifecycle_over_http() {
    let (state, router) = app(ScriptedProvider::new("scripted").with_message("Hello there"));

    let id = create_session(&router).await;
    assert_eq!(state.session_count().await, 1);

    let response = router.clone().oneshot(post_message(&id, "Hi")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let events = sse_events(&body_bytes(response).await);
    let kinds: Vec<&str> = events.iter().filter_map(|e| e["type"].as_str()).collect();
    assert_eq!(kinds.first(), Some(&"message_started"));
    assert_eq!(kinds.last(), Some(&"message_updated"));
    assert!(kinds.contains(&"token"));

    let tokens: String = events
        .iter()
        .filter(|e| e["type"] == "token")
        .filter_map(|e| e["token"].as_str())
        .collect();
    assert_eq!(tokens, "Hello there");
    assert_eq!(events.last().unwrap()["message"]["content"], "Hello there");

    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/sessions/{}/history", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history: Vec<Value> = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["content"], "Hi");
    assert_eq!(history[1]["content"], "Hello there");

    let response = router
        .clone()
        .oneshot(
            Request::delete(format!("/sessions/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(state.session_count().await, 0);

    let response = router.oneshot(post_message(&id, "Still there?")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_model_failure_is_reported_as_an_error_event() {
    let (_, router) = app(ScriptedProvider::new("scripted").with_error("upstream 503"));
    let id = create_session(&router).await;

    let response = router.clone().oneshot(post_message(&id, "Hi")).await.unwrap();
    let events = sse_events(&body_bytes(response).await);
    let last = events.last().unwrap();
    assert_eq!(last["type"], "error");
    assert!(last["error"].as_str().unwrap().contains("upstream 503"));

    let response = router
        .oneshot(
            Request::get(format!("/sessions/{}/history", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let history: Vec<Value> = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_blank_message_is_rejected() {
    let (_, router) = app(ScriptedProvider::new("scripted"));
    let id = create_session(&router).await;

    let response = router.oneshot(post_message(&id, "   ")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "content must not be empty");
}
