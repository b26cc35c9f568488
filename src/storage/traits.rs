// src/storage/traits.rs

use crate::error::Result;
use crate::storage::{RotationState, ThrottleState};
use async_trait::async_trait;

/// Durable key-value persistence for rotation and throttle state.
///
/// Backends only store plain JSON-serializable scalars and arrays; all
/// interpretation (daily resets, cursor normalization) happens in the
/// components that own the state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the persisted rotation state, if any.
    async fn load_rotation(&self) -> Result<Option<RotationState>>;

    /// Persist the rotation state.
    async fn save_rotation(&self, state: &RotationState) -> Result<()>;

    /// Load the persisted throttle state, if any.
    async fn load_throttle(&self) -> Result<Option<ThrottleState>>;

    /// Persist the throttle state.
    async fn save_throttle(&self, state: &ThrottleState) -> Result<()>;
}
