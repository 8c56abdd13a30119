//! HTTP server for the atlas agent (axum).
//!
//! JSON endpoints for health, thread management, and non-streaming chat;
//! SSE for streaming chat. See [`app::router`] for the route table.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`AppState`],
//! [`bootstrap::build_services`].

mod app;
pub mod bootstrap;
mod chat;
mod response;
mod threads;

pub use app::{router, AppState};

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

/// Runs the server on an existing listener. Tests bind to 127.0.0.1:0 and
/// pass the listener in.
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("atlas server listening on http://{addr}");
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Binds `addr` and serves until the process exits.
pub async fn run_serve(
    addr: &str,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state).await
}
