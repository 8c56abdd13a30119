//! Server binary: load env, build the service stack, serve.

use tracing_subscriber::EnvFilter;

use atlas::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config::load_and_apply(None)?;
    let app_config = AppConfig::from_env();

    let handles = serve::bootstrap::build_services(&app_config).await?;
    let state = serve::bootstrap::app_state(handles, &app_config);
    serve::run_serve(&app_config.listen_addr, state).await
}
