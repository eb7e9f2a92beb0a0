//! agent-server
//!
//! Axum transport for the tool-loop agent.
//!
//! ```text
//! GET  /health       liveness
//! POST /chat         run to completion, JSON result
//! POST /chat/stream  run with server-sent events
//! ```

mod handlers;
mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{chat_handler, chat_stream_handler, health_check};
use crate::state::{AppState, ServerConfig};

/// Build the router
fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env();

    // Initialize tracing
    let default_filter = if config.verbose {
        "debug,tower_http=debug"
    } else {
        "info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("agent-server listening on http://{}", addr);
    tracing::info!(verbose = config.verbose, event_buffer = config.event_buffer, "Configuration");

    axum::serve(listener, app(AppState::new(config))).await?;

    Ok(())
}
