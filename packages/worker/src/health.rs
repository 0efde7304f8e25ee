//! A bare liveness endpoint, mirroring the frontend's `/health` route so
//! both binaries expose the same probe shape. The worker has no database or
//! HTTP-facing dependency to ping; reaching the handler at all is the signal.

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;

/// Default port the worker's health endpoint binds to, overridable with the
/// `WORKER_HEALTH_PORT` environment variable. Not part of `AppConfig` — this
/// is ambient process plumbing, not application configuration.
pub const DEFAULT_PORT: u16 = 8081;

pub fn port() -> u16 {
    std::env::var("WORKER_HEALTH_PORT").ok().and_then(|value| value.parse().ok()).unwrap_or(DEFAULT_PORT)
}

pub async fn serve(port: u16) -> std::io::Result<()> {
    let router = Router::new().route("/health", get(health));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(%port, "health endpoint listening");
    axum::serve(listener, router).await
}

async fn health() -> StatusCode {
    StatusCode::OK
}
