// src/storage/file.rs

use crate::error::{AppError, Result};
use crate::storage::{RotationState, StateStore, ThrottleState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// On-disk document holding everything the relay persists.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StateDocument {
    rotation: Option<RotationState>,
    throttle: Option<ThrottleState>,
}

/// JSON-file implementation of [`StateStore`].
///
/// Writes go through a temp file in the same directory followed by an atomic
/// rename, so a crash mid-write never leaves a torn document. A corrupt
/// document is treated as absent rather than fatal: losing the counters is
/// recoverable, refusing to start is not.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_document(&self) -> Result<StateDocument> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted state file yet");
                return Ok(StateDocument::default());
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        match serde_json::from_str(&contents) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Persisted state file is corrupt. Starting from empty state."
                );
                Ok(StateDocument::default())
            }
        }
    }

    fn write_document(&self, document: &StateDocument) -> Result<()> {
        // A bare relative file name has an empty parent.
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), document)?;
        tmp.persist(&self.path)
            .map_err(|e| AppError::StatePersistence(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_rotation(&self) -> Result<Option<RotationState>> {
        Ok(self.read_document()?.rotation)
    }

    async fn save_rotation(&self, state: &RotationState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document()?;
        document.rotation = Some(state.clone());
        self.write_document(&document)
    }

    async fn load_throttle(&self) -> Result<Option<ThrottleState>> {
        Ok(self.read_document()?.throttle)
    }

    async fn save_throttle(&self, state: &ThrottleState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document()?;
        document.throttle = Some(state.clone());
        self.write_document(&document)
    }
}
