// src/storage/memory.rs

use crate::error::Result;
use crate::storage::{RotationState, StateStore, ThrottleState};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

/// In-memory implementation of [`StateStore`].
///
/// State lives for the lifetime of the process. Used when no state path is
/// configured, and for test isolation.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rotation: RwLock<Option<RotationState>>,
    throttle: RwLock<Option<ThrottleState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn load_rotation(&self) -> Result<Option<RotationState>> {
        Ok(self.rotation.read().await.clone())
    }

    async fn save_rotation(&self, state: &RotationState) -> Result<()> {
        trace!(cursor = state.cursor, failed = state.failed.len(), "Saving rotation state");
        *self.rotation.write().await = Some(state.clone());
        Ok(())
    }

    async fn load_throttle(&self) -> Result<Option<ThrottleState>> {
        Ok(self.throttle.read().await.clone())
    }

    async fn save_throttle(&self, state: &ThrottleState) -> Result<()> {
        trace!(count = state.request_count, "Saving throttle state");
        *self.throttle.write().await = Some(state.clone());
        Ok(())
    }
}
