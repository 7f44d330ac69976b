//! Restart-baseline persistence for snapshots.
//!
//! One JSON file per source, overwritten wholesale after every cycle and read
//! back at the start of the next one. Only the fetchers touch these files.

use crate::error::AppError;
use crate::models::Snapshot;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;

/// JSON file holding the last snapshot of one source.
///
/// A store without a path is a no-op: loads find nothing and saves succeed.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    path: Option<PathBuf>,
}

impl SnapshotStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Read the persisted snapshot.
    ///
    /// Returns `Ok(None)` when no path is configured or the file does not exist yet.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<Snapshot<T>>, AppError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::persistence_at(
                    format!("Failed to read snapshot: {}", e),
                    path.display().to_string(),
                ))
            }
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            AppError::persistence_at(
                format!("Failed to parse snapshot: {}", e),
                path.display().to_string(),
            )
        })
    }

    /// Overwrite the persisted snapshot.
    ///
    /// Writes to a sibling temp file first and renames it into place so a
    /// crash never leaves a truncated baseline behind.
    pub async fn save<T: Serialize>(&self, snapshot: &Snapshot<T>) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = path.with_extension("json.tmp");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::persistence_at(e.to_string(), parent.display().to_string())
            })?;
        }
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| AppError::persistence_at(e.to_string(), tmp_path.display().to_string()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| AppError::persistence_at(e.to_string(), path.display().to_string()))?;

        Ok(())
    }
}
