//! Thread management endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use atlas::message::Message;

use crate::app::AppState;
use crate::response::ApiError;

pub(crate) const SESSION_HEADER: &str = "x-session-id";

pub(crate) fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

/// POST /threads: mint a new thread id.
pub(crate) async fn create_thread() -> Json<Value> {
    Json(json!({"thread_id": Uuid::new_v4().to_string()}))
}

/// GET /threads: list the calling session's conversations.
pub(crate) async fn list_threads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let Some(session) = session_id(&headers) else {
        return Err(ApiError::MissingHeader {
            header: "X-Session-Id",
        });
    };
    let rows = state.conversations.list_for_session(&session).await?;
    let listed: Vec<Value> = rows
        .into_iter()
        .map(|c| {
            json!({
                "thread_id": c.thread_id,
                "title": c.title,
                "created_at": c.created_at.to_rfc3339(),
                "updated_at": c.updated_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(Json(Value::Array(listed)))
}

/// DELETE /threads/{id}: idempotent; 204 either way.
pub(crate) async fn delete_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if let Some(service) = &state.service {
        service.delete_thread(&thread_id).await?;
    }
    state.conversations.delete(&thread_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /threads/{id}/messages: conversation history from the checkpoint.
pub(crate) async fn thread_messages(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let service = state.service.as_ref().ok_or(ApiError::ServiceUnavailable)?;
    let Some(snapshot) = service.thread_state(&thread_id).await? else {
        return Err(ApiError::NotFound);
    };

    let messages: Vec<Value> = snapshot
        .messages
        .iter()
        .filter_map(|m| match m {
            Message::Human { content } => Some(json!({"role": "human", "content": content})),
            Message::Assistant { content, tool_calls } if tool_calls.is_empty() => {
                (!content.is_empty()).then(|| json!({"role": "ai", "content": content}))
            }
            _ => None,
        })
        .collect();

    Ok(Json(json!({
        "messages": messages,
        "overrides": {
            "schema": snapshot.override_schema,
            "direction": snapshot.override_direction,
            "mode": snapshot.override_mode,
        },
        "turn_summaries": snapshot.turn_summaries,
    })))
}
