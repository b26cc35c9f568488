// src/storage/mod.rs

mod file;
mod memory;
mod traits;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;
pub use traits::StateStore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Durable key-rotation state: the cursor, the set of indices that failed
/// today, and the calendar day those marks belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    pub cursor: usize,
    pub failed: BTreeSet<usize>,
    pub day: String,
}

impl RotationState {
    pub fn new(day: impl Into<String>) -> Self {
        Self {
            cursor: 0,
            failed: BTreeSet::new(),
            day: day.into(),
        }
    }
}

/// Durable throttle state: requests issued today and the scheduled dispatch
/// time of the most recent request, in unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleState {
    pub request_count: u32,
    pub day: String,
    pub last_dispatch_ms: i64,
}

impl ThrottleState {
    pub fn new(day: impl Into<String>) -> Self {
        Self {
            request_count: 0,
            day: day.into(),
            last_dispatch_ms: 0,
        }
    }
}
