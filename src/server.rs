use axum::{routing::get, Router};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::handlers::{health_check, proxy, proxy_head, stream_events, system_stats, url_info};
use crate::middleware::add_stream_headers;
use crate::state::AppState;
use crate::utils::shutdown_signal;

/// build the relay router
pub fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    tracing::debug!("Building router with chunk size: {} bytes", config.chunk_size);

    // configure cors
    let origins = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect::<Vec<_>>();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };
    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::HEAD])
        .allow_origin(allow_origin)
        .allow_headers(Any);

    // no compression layer, it would hold back streamed bodies
    Router::new()
        // explicit head keeps HEAD from opening a full relay
        .route("/proxy", get(proxy).head(proxy_head))
        .route("/api/stream-events", get(stream_events))
        .route("/api/url-info", get(url_info))
        .route("/api/system-stats", get(system_stats))
        .route("/api/health", get(health_check))
        .layer(axum::middleware::from_fn(add_stream_headers))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// serve `app` until a shutdown signal arrives
pub async fn start_server(app: Router, state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    tracing::info!("Starting server...");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::debug!("Listener bound to {}", listener.local_addr()?);

    let shutdown = state.shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // end open subscriptions so graceful shutdown can finish
            shutdown.cancel();
        })
        .tcp_nodelay(true);

    tracing::info!("Server running and ready to accept connections");
    server.await
}

/// print startup banner with server info
pub fn print_startup_banner(config: &Config) {
    tracing::info!("Nexus relay starting...");
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("📡 RELAY: http://{}:{}/proxy?url=...", config.host, config.port);
    tracing::info!("📊 EVENTS: http://{}:{}/api/stream-events?url=...", config.host, config.port);
    tracing::info!(
        "📦 Chunk size: {} bytes, status kept {}s after completion",
        config.chunk_size,
        config.retire_after.as_secs()
    );
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
