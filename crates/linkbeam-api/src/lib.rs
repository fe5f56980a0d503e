pub mod handlers;

use std::future::Future;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// The full `/api` router over `state`.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/device/info", get(handlers::handle_device_info))
        .route("/devices", get(handlers::handle_devices))
        .route("/status", get(handlers::handle_status))
        .route("/events", get(handlers::handle_events))
        .route("/files", get(handlers::handle_files))
        .route("/download/{filename}", get(handlers::handle_download))
        // Size limits are enforced by the receiver while streaming.
        .route(
            "/upload",
            post(handlers::handle_upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/send", post(handlers::handle_send))
        .route("/transfers", get(handlers::handle_transfers))
        .route(
            "/transfers/{id}",
            get(handlers::handle_transfer).delete(handlers::handle_abort),
        )
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Bind `bind_addr:port` and serve until `shutdown` resolves.
pub async fn serve(
    state: ApiState,
    bind_addr: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind((bind_addr, port))
        .await
        .with_context(|| format!("failed to bind API on {bind_addr}:{port}"))?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_on(
    listener: TcpListener,
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
