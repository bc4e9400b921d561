//! Ember Chat - local character chat backend
//!
//! Serves a small HTTP API over an in-memory chat session backed by a
//! locally hosted inference engine.

mod api;
mod character;
mod conversation;
mod engine;
mod lifecycle;
mod pipeline;
mod prompt;
mod runtime;
mod session;

use api::{create_router, AppState};
use engine::{find_model, EngineConfig, LocalEngineLoader, DEFAULT_MODEL_ID};
use runtime::ChatRuntime;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Preset from `EMBER_DEFAULT_MODEL`, falling back to the built-in default
fn default_model_from_env() -> &'static str {
    match std::env::var("EMBER_DEFAULT_MODEL") {
        Ok(id) => match find_model(&id) {
            Some(model) => model.id,
            None => {
                tracing::warn!(
                    model = %id,
                    default = %DEFAULT_MODEL_ID,
                    "Unknown EMBER_DEFAULT_MODEL, using default"
                );
                DEFAULT_MODEL_ID
            }
        },
        Err(_) => DEFAULT_MODEL_ID,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let port: u16 = std::env::var("EMBER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let default_model = default_model_from_env();

    let engine_config = EngineConfig::from_env();
    tracing::info!(
        engine = %engine_config.base_url,
        model = %default_model,
        "Using local inference engine"
    );
    let loader = Arc::new(LocalEngineLoader::new(&engine_config)?);

    let runtime = Arc::new(ChatRuntime::new(loader, default_model));
    let state = AppState::new(runtime);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Loopback only
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("Ember Chat listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
