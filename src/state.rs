// src/state.rs

use crate::chat::ChatService;
use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, ServerConfig};
use crate::error::{AppError, Result};
use crate::storage::{InMemoryStore, JsonFileStore, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub config: AppConfig,
    pub chat: ChatService,
}

impl AppState {
    /// Wires up the storage backend, clock, outbound HTTP client and the
    /// chat service.
    pub async fn new(config: &AppConfig) -> Result<Self> {
        info!("Creating shared AppState...");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn StateStore> = match &config.state_path {
            Some(path) => {
                info!(path = %path.display(), "Persisting relay state to JSON file");
                Arc::new(JsonFileStore::new(path.clone()))
            }
            None => {
                info!("No state path configured. Relay state is in-memory only.");
                Arc::new(InMemoryStore::new())
            }
        };

        let http = build_http_client(&config.server)?;
        let chat = ChatService::new(config, store, clock, http).await?;

        info!("Application state initialized successfully.");
        Ok(Self {
            config: config.clone(),
            chat,
        })
    }
}

fn build_http_client(server: &ServerConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(server.connect_timeout_secs))
        .timeout(Duration::from_secs(server.request_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .build()
        .map_err(|e| AppError::HttpClientBuild { source: e })
}
