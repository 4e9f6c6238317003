//! High-water mark for incremental polling.
//!
//! Persisted as `{"last_id": <integer>}`. The tracker stores whatever it is
//! given: it does not enforce monotonicity, callers only save larger values.
//! Single writer only.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct CursorFile {
    #[serde(default)]
    last_id: u64,
}

#[derive(Debug, Clone)]
pub struct CursorTracker {
    path: PathBuf,
}

impl CursorTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last saved value; 0 when the file is missing or unreadable.
    pub async fn load(&self) -> u64 {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                log::warn!("Cannot read cursor {}: {}. Using 0.", self.path.display(), e);
                return 0;
            }
        };

        match serde_json::from_slice::<CursorFile>(&bytes) {
            Ok(file) => file.last_id,
            Err(e) => {
                log::warn!("Corrupt cursor {}: {}. Using 0.", self.path.display(), e);
                0
            }
        }
    }

    /// Overwrite the stored value.
    pub async fn save(&self, last_id: u64) -> Result<()> {
        let context = self.path.display().to_string();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::storage(&context, e))?;
        }

        let bytes = serde_json::to_vec_pretty(&CursorFile { last_id })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| AppError::storage(&context, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AppError::storage(&context, e))?;

        log::info!("Cursor last_id={} saved to {}", last_id, context);
        Ok(())
    }

    /// Start over from 0.
    pub async fn reset(&self) -> Result<()> {
        self.save(0).await?;
        log::info!("Cursor reset to 0");
        Ok(())
    }
}
