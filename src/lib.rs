// src/lib.rs

pub mod chat;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod gemini;
pub mod handlers;
pub mod key_manager;
pub mod rate_limiter;
pub mod state;
pub mod storage;

use crate::handlers::{chat_handler, health_check, reset_keys_handler, status_handler};
use axum::{
    body::Body,
    http::{HeaderValue, Request as AxumRequest},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::{path::PathBuf, sync::Arc, time::Instant};
use tower_http::cors::CorsLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use state::AppState;

/// Builds the Axum router for the relay.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/chat", post(chat_handler))
        .route("/v1/status", get(status_handler))
        .route("/v1/keys/reset", post(reset_keys_handler))
        // The relay is called straight from a browser client.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Middleware adding a request ID and a tracing span around each request.
async fn trace_requests(
    mut req: AxumRequest<Body>,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %method,
        url.path = %path,
    );

    req.extensions_mut().insert(request_id);

    async move {
        let mut response = next.run(req).await;
        let elapsed = start_time.elapsed();

        response.headers_mut().insert(
            "X-Request-ID",
            HeaderValue::from_str(&request_id.to_string()).unwrap(),
        );

        info!(
            http.response.duration = ?elapsed,
            http.status_code = response.status().as_u16(),
            "Finished processing request"
        );

        response
    }
    .instrument(span)
    .await
}

/// Loads configuration, initializes the application state and returns the
/// ready-to-serve router.
pub async fn run(
    config_path_override: Option<PathBuf>,
) -> std::result::Result<(Router, AppConfig), AppError> {
    info!("Starting Gemini chat relay...");

    let app_config = setup_configuration(config_path_override)?;

    let app_state = AppState::new(&app_config).await.map_err(|e| {
        error!(error = ?e, "Failed to initialize application state. Exiting.");
        e
    })?;

    let app = create_router(Arc::new(app_state))
        .layer(axum::middleware::from_fn(trace_requests));

    Ok((app, app_config))
}

/// Loads, validates and logs the application configuration.
fn setup_configuration(config_path_override: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = config_path_override.unwrap_or_else(|| {
        std::env::var("GEMINI_RELAY_CONFIG")
            .map_or_else(|_| PathBuf::from("config.yaml"), PathBuf::from)
    });

    let config_path_display = config_path.display().to_string();
    if config_path.exists() {
        info!(config.path = %config_path_display, "Using configuration file");
    } else {
        info!(config.path = %config_path_display, "Optional configuration file not found. Using defaults and environment variables.");
    }

    let app_config = config::load_config(&config_path).map_err(|e| {
        error!(
            config.path = %config_path_display,
            error = ?e,
            "Failed to load or validate configuration. Exiting."
        );
        e
    })?;

    info!(
        config.total_keys = app_config.api_keys.len(),
        config.models = ?app_config.models,
        config.retry.max_attempts = app_config.retry.max_attempts,
        config.rate_limit.daily_cap = app_config.rate_limit.daily_cap,
        server.port = app_config.server.port,
        "Configuration loaded and validated successfully."
    );

    Ok(app_config)
}
