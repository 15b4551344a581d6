//! HTTP chat surface
//!
//! Exposes the chat handlers over HTTP. Each chat session lives in memory
//! behind its own lock, so a session answers one message at a time while
//! separate sessions run independently. Replies are streamed back as
//! server-sent events carrying [`UiEvent`] JSON. Sessions left idle longer
//! than the configured timeout are ended by a background sweep.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::chat::{ChatApp, ChatSession, ChatSurface, UiMessage};
use crate::error::{AgentsError, Result};
use crate::items::Message;

/// Event pushed to the client while a reply is produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    MessageStarted { message: UiMessage },
    Token { message_id: String, token: String },
    MessageUpdated { message: UiMessage },
    Error { error: String },
}

impl UiEvent {
    fn into_sse(self) -> Event {
        Event::default().json_data(&self).unwrap_or_else(|e| {
            Event::default()
                .data(json!({ "type": "error", "error": e.to_string() }).to_string())
        })
    }
}

/// Chat surface that forwards every call to an SSE stream.
#[derive(Debug, Clone)]
pub struct ChannelSurface {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelSurface {
    pub fn new(tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self { tx }
    }

    fn push(&self, event: UiEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| AgentsError::Other("client disconnected".to_string()))
    }
}

#[async_trait]
impl ChatSurface for ChannelSurface {
    async fn send(&self, message: &UiMessage) -> Result<()> {
        self.push(UiEvent::MessageStarted {
            message: message.clone(),
        })
    }

    async fn stream_token(&self, message: &UiMessage, token: &str) -> Result<()> {
        self.push(UiEvent::Token {
            message_id: message.id.clone(),
            token: token.to_string(),
        })
    }

    async fn update(&self, message: &UiMessage) -> Result<()> {
        self.push(UiEvent::MessageUpdated {
            message: message.clone(),
        })
    }
}

/// Default for [`AppState::with_idle_timeout`].
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// One chat session plus the time it was last touched.
#[derive(Debug)]
struct SessionSlot {
    chat: Mutex<ChatSession>,
    last_active: std::sync::Mutex<Instant>,
}

impl SessionSlot {
    fn new(chat: ChatSession) -> Self {
        Self {
            chat: Mutex::new(chat),
            last_active: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_active.lock() {
            *last = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

/// Shared server state.
#[derive(Debug)]
pub struct AppState {
    app: ChatApp,
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    idle_timeout: Duration,
}

impl AppState {
    pub fn new(app: ChatApp) -> Self {
        Self {
            app,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Ends every session idle for at least `max_idle`. Sessions with a
    /// reply in flight are skipped. Returns how many were removed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<(String, ChatSession)> = sessions
            .iter()
            .filter(|(_, slot)| slot.idle_for() >= max_idle)
            .filter_map(|(id, slot)| {
                let chat = slot.chat.try_lock().ok()?;
                Some((id.clone(), chat.clone()))
            })
            .collect();

        for (id, chat) in &expired {
            sessions.remove(id);
            info!(session = %id, "Evicting idle session");
            self.app.on_chat_end(chat.clone());
        }
        expired.len()
    }

    async fn session(&self, id: &str) -> std::result::Result<Arc<SessionSlot>, ApiError> {
        let slot = self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("unknown session '{}'", id)))?;
        slot.touch();
        Ok(slot)
    }
}

/// Error response body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PostMessage {
    pub content: String,
}

/// Builds the router with tracing and permissive CORS.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", delete(end_session))
        .route("/sessions/:id/messages", post(post_message))
        .route("/sessions/:id/history", get(history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serves `router` on `bind` until Ctrl-C.
pub async fn serve(state: Arc<AppState>, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "Panacloud chat server listening");
    let sweeper = tokio::spawn(sweep_idle_sessions(state.clone()));
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await;
    sweeper.abort();
    served?;
    Ok(())
}

async fn sweep_idle_sessions(state: Arc<AppState>) {
    let period = state
        .idle_timeout()
        .clamp(Duration::from_secs(1), Duration::from_secs(60));
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let evicted = state.evict_idle(state.idle_timeout()).await;
        if evicted > 0 {
            let remaining = state.session_count().await;
            debug!(evicted, remaining, "Idle sweep");
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionCreated>) {
    let session = state.app.on_chat_start();
    let session_id = session.id.clone();
    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), Arc::new(SessionSlot::new(session)));
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let slot = state
        .sessions
        .write()
        .await
        .remove(&id)
        .ok_or_else(|| ApiError::not_found(format!("unknown session '{}'", id)))?;
    // Wait for an in-flight reply to finish before dropping the history.
    let session = slot.chat.lock().await.clone();
    state.app.on_chat_end(session);
    Ok(StatusCode::NO_CONTENT)
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Vec<Message>>, ApiError> {
    let slot = state.session(&id).await?;
    let messages = slot.chat.lock().await.history.messages().to_vec();
    Ok(Json(messages))
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<PostMessage>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError>
{
    if body.content.trim().is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }
    let slot = state.session(&id).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let surface = ChannelSurface::new(tx);
        let mut session = slot.chat.lock().await;
        if let Err(e) = state
            .app
            .on_message(&mut session, &body.content, &surface)
            .await
        {
            warn!(session = %id, error = %e, "Reply failed");
            let _ = surface.push(UiEvent::Error {
                error: e.to_string(),
            });
        }
        drop(session);
        slot.touch();
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| Ok(event.into_sse()));
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatOptions;
    use crate::model::ScriptedProvider;
    use crate::registry::AgentRegistry;
    use crate::runner::RunConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let model = Arc::new(ScriptedProvider::new("scripted"));
        let registry = Arc::new(AgentRegistry::panacloud(model));
        let app = ChatApp::new(registry, RunConfig::default(), ChatOptions::session());
        Arc::new(AppState::new(app))
    }

    #[test]
    fn test_ui_event_wire_format() {
        let event = UiEvent::Token {
            message_id: "m1".to_string(),
            token: "Hi".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "token", "message_id": "m1", "token": "Hi"})
        );
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let response = router(state())
            .oneshot(
                Request::get("/sessions/nope/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "unknown session 'nope'");
    }

    #[tokio::test]
    async fn test_channel_surface_reports_disconnect() {
        let (tx, rx) = mpsc::unbounded_channel();
        let surface = ChannelSurface::new(tx);
        drop(rx);
        assert!(surface.send(&UiMessage::new("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let state = state();
        let router = router(state.clone());
        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(Request::post("/sessions").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }
        assert_eq!(state.session_count().await, 2);

        assert_eq!(state.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(state.session_count().await, 2);

        assert_eq!(state.evict_idle(Duration::ZERO).await, 2);
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_busy_session_survives_eviction() {
        let state = state();
        let session = state.app.on_chat_start();
        let id = session.id.clone();
        let slot = Arc::new(SessionSlot::new(session));
        state.sessions.write().await.insert(id.clone(), slot.clone());

        let guard = slot.chat.lock().await;
        assert_eq!(state.evict_idle(Duration::ZERO).await, 0);
        drop(guard);
        assert_eq!(state.evict_idle(Duration::ZERO).await, 1);
    }

    #[test]
    fn test_idle_timeout_builder() {
        let model = Arc::new(ScriptedProvider::new("scripted"));
        let app = ChatApp::new(
            Arc::new(AgentRegistry::panacloud(model)),
            RunConfig::default(),
            ChatOptions::session(),
        );
        assert_eq!(AppState::new(app.clone()).idle_timeout(), DEFAULT_IDLE_TIMEOUT);
        let state = AppState::new(app).with_idle_timeout(Duration::from_secs(5));
        assert_eq!(state.idle_timeout(), Duration::from_secs(5));
    }
}
