//! Chat endpoints: non-streaming JSON and SSE streaming.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::Utc;
use futures::stream::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use uuid::Uuid;

use atlas::memory::Conversation;
use atlas::service::{AtlasService, ChatOverrides};

use crate::app::AppState;
use crate::response::ApiError;
use crate::threads::session_id;

const TITLE_MAX_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatRequest {
    question: String,
    thread_id: Option<String>,
    override_schema: Option<String>,
    override_direction: Option<String>,
    override_mode: Option<String>,
}

fn parse_overrides(body: &ChatRequest) -> Result<ChatOverrides, ApiError> {
    let mut overrides = ChatOverrides::default();
    if let Some(raw) = &body.override_schema {
        overrides.schema = Some(raw.parse().map_err(|detail| ApiError::Validation {
            field: "override_schema",
            detail,
        })?);
    }
    if let Some(raw) = &body.override_direction {
        overrides.direction = Some(raw.parse().map_err(|detail| ApiError::Validation {
            field: "override_direction",
            detail,
        })?);
    }
    if let Some(raw) = &body.override_mode {
        overrides.mode = Some(raw.parse().map_err(|detail| ApiError::Validation {
            field: "override_mode",
            detail,
        })?);
    }
    Ok(overrides)
}

fn title_from_question(question: &str) -> String {
    let mut title: String = question.chars().take(TITLE_MAX_CHARS).collect();
    if question.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}

/// Registers the thread for later listing when the caller sent a session id.
/// Sessionless conversations proceed but are not indexed.
async fn register_conversation(
    state: &AppState,
    thread_id: &str,
    session: Option<&str>,
    question: &str,
) {
    let Some(session) = session else { return };
    let existing = state.conversations.get(thread_id).await.ok().flatten();
    let now = Utc::now();
    let row = match existing {
        Some(mut row) => {
            row.updated_at = now;
            row
        }
        None => Conversation {
            thread_id: thread_id.to_string(),
            session_id: session.to_string(),
            title: title_from_question(question),
            created_at: now,
            updated_at: now,
        },
    };
    if let Err(e) = state.conversations.upsert(row).await {
        warn!(error = %e, "failed to register conversation");
    }
}

fn service_of(state: &AppState) -> Result<Arc<AtlasService>, ApiError> {
    state
        .service
        .as_ref()
        .cloned()
        .ok_or(ApiError::ServiceUnavailable)
}

/// POST /chat: run a full turn and return the aggregated answer.
pub(crate) async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let service = service_of(&state)?;
    let overrides = parse_overrides(&body)?;
    let thread_id = body
        .thread_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let session = session_id(&headers);

    register_conversation(&state, &thread_id, session.as_deref(), &body.question).await;

    let result = tokio::time::timeout(
        state.request_timeout,
        service.answer_question(&body.question, &thread_id, overrides, session),
    )
    .await
    .map_err(|_| ApiError::Timeout)??;

    Ok(Json(json!({
        "answer": result.answer,
        "thread_id": result.thread_id,
        "queries": result.queries.iter().map(|q| json!({
            "sql": q.sql,
            "columns": q.columns,
            "rows": q.rows,
            "row_count": q.row_count,
            "execution_time_ms": q.execution_time_ms,
            "tables": q.tables,
        })).collect::<Vec<_>>(),
        "resolved_products": result.resolved_products,
        "schemas_used": result.schemas_used,
        "total_rows": result.total_rows,
        "total_execution_time_ms": result.total_execution_time_ms,
        "atlas_links": result.atlas_links,
    })))
}

/// POST /chat/stream: SSE stream of typed events.
///
/// Service-unavailable and validation failures return their status before
/// the stream begins. The stream itself is bounded by the request timeout;
/// a disconnecting client cancels the run at the next step boundary.
pub(crate) async fn chat_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let service = service_of(&state)?;
    let overrides = parse_overrides(&body)?;
    let thread_id = body
        .thread_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let session = session_id(&headers);

    register_conversation(&state, &thread_id, session.as_deref(), &body.question).await;

    let rx = service.answer_question_stream(body.question, thread_id, overrides, session);
    let deadline = Box::pin(tokio::time::sleep(state.request_timeout));
    let stream = ReceiverStream::new(rx)
        .take_until(deadline)
        .map(|event| {
            let data = serde_json::to_string(&event.data()).unwrap_or_else(|_| "{}".to_string());
            Ok(Event::default().event(event.name()).data(data))
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
