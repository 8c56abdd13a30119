//! Axum app: shared state and the route table.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use atlas::cache::CacheRegistry;
use atlas::memory::ConversationStore;
use atlas::service::AtlasService;

/// Shared server state.
///
/// `service` is `None` until bootstrap completes; chat endpoints answer 503
/// in that window.
pub struct AppState {
    pub service: Option<Arc<AtlasService>>,
    pub conversations: Arc<dyn ConversationStore>,
    pub registry: Arc<CacheRegistry>,
    pub request_timeout: Duration,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/threads",
            post(super::threads::create_thread).get(super::threads::list_threads),
        )
        .route("/threads/:id", delete(super::threads::delete_thread))
        .route("/threads/:id/messages", get(super::threads::thread_messages))
        .route("/chat", post(super::chat::chat))
        .route("/chat/stream", post(super::chat::chat_stream))
        .route("/debug/caches", get(cache_stats))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.registry.stats())
}
