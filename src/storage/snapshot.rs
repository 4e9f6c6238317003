//! Date-stamped snapshots on the local filesystem.
//!
//! ## Storage Layout
//!
//! ```text
//! {snapshots_dir}/
//! └── {source}/
//!     └── {resource}/
//!         ├── 20240101.json
//!         └── 20240102.json
//! ```
//!
//! One file per `(resource, date)`. Writes go to a temp file that is renamed
//! over the target, so readers never observe a partial snapshot and a second
//! write on the same date simply replaces the first.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{CollectedResource, SnapshotFile};

const DATE_FORMAT: &str = "%Y%m%d";

/// Persisted history of collected resources for one source.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store `collected` as the snapshot of `resource` on `date`, replacing
    /// any snapshot already there.
    async fn write(&self, resource: &str, date: NaiveDate, collected: &CollectedResource) -> Result<()>;

    /// Dates with a snapshot for `resource`, oldest first.
    async fn list_dates(&self, resource: &str) -> Result<Vec<NaiveDate>>;

    /// The snapshot for `date`, or the most recent one when `date` is `None`.
    async fn read(&self, resource: &str, date: Option<NaiveDate>) -> Result<CollectedResource>;
}

/// Parse `YYYYMMDD` or `YYYY-MM-DD`.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|_| AppError::validation(format!("invalid date '{value}', expected YYYYMMDD")))
}

/// Local filesystem snapshot backend.
#[derive(Debug, Clone)]
pub struct LocalSnapshotStore {
    root_dir: PathBuf,
}

impl LocalSnapshotStore {
    /// Store rooted directly at `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Store for one source under the shared snapshots directory.
    pub fn for_source(snapshots_dir: impl AsRef<Path>, source_id: &str) -> Self {
        Self::new(snapshots_dir.as_ref().join(source_id))
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    fn resource_dir(&self, resource: &str) -> PathBuf {
        self.root_dir.join(resource)
    }

    /// Path of a snapshot file.
    pub fn path(&self, resource: &str, date: NaiveDate) -> PathBuf {
        self.resource_dir(resource)
            .join(format!("{}.json", date.format(DATE_FORMAT)))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let context = path.display().to_string();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::storage(&context, e))?;
        }

        let tmp = path.with_extension("json.tmp");
        let write = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, path).await
        };

        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::storage(context, e));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for LocalSnapshotStore {
    async fn write(&self, resource: &str, date: NaiveDate, collected: &CollectedResource) -> Result<()> {
        let path = self.path(resource, date);
        let bytes = serde_json::to_vec_pretty(&SnapshotFile::from(collected))?;
        self.write_bytes(&path, &bytes).await?;
        log::info!(
            "Snapshot {}: {} records -> {}",
            resource,
            collected.record_count(),
            path.display()
        );
        Ok(())
    }

    async fn list_dates(&self, resource: &str) -> Result<Vec<NaiveDate>> {
        let dir = self.resource_dir(resource);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::storage(dir.display().to_string(), e)),
        };

        let mut dates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| NaiveDate::parse_from_str(stem, DATE_FORMAT).ok());
            match parsed {
                Some(date) => dates.push(date),
                None => log::debug!("Ignoring non-snapshot file {}", path.display()),
            }
        }
        dates.sort();
        Ok(dates)
    }

    async fn read(&self, resource: &str, date: Option<NaiveDate>) -> Result<CollectedResource> {
        let date = match date {
            Some(date) => date,
            None => self
                .list_dates(resource)
                .await?
                .pop()
                .ok_or_else(|| AppError::not_found(format!("no snapshot of {resource}")))?,
        };

        let path = self.path(resource, date);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::not_found(format!(
                    "snapshot of {} for {}",
                    resource,
                    date.format(DATE_FORMAT)
                )));
            }
            Err(e) => return Err(AppError::storage(path.display().to_string(), e)),
        };

        let file: SnapshotFile = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::storage(path.display().to_string(), e))?;
        Ok(file.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn collected(records: Vec<serde_json::Value>) -> CollectedResource {
        CollectedResource {
            resource: "x".into(),
            source: "florianopolis".into(),
            region: Some("SC".into()),
            collected_at: Utc::now(),
            duration_ms: 12,
            pages: 1,
            truncated: false,
            total_hint: None,
            records,
        }
    }

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[tokio::test]
    async fn test_second_write_replaces_first() {
        let dir = TempDir::new().unwrap();
        let store = LocalSnapshotStore::for_source(dir.path(), "florianopolis");

        store
            .write("x", day("20240101"), &collected(vec![json!({"v": 1})]))
            .await
            .unwrap();
        store
            .write("x", day("20240101"), &collected(vec![json!({"v": 2}), json!({"v": 3})]))
            .await
            .unwrap();

        let read = store.read("x", Some(day("20240101"))).await.unwrap();
        assert_eq!(read.records, vec![json!({"v": 2}), json!({"v": 3})]);
        assert_eq!(store.list_dates("x").await.unwrap(), vec![day("20240101")]);

        let files: Vec<_> = std::fs::read_dir(dir.path().join("florianopolis/x"))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_read_latest() {
        let dir = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(dir.path());

        for (date, v) in [("20240301", 3), ("20240101", 1), ("20240215", 2)] {
            store
                .write("pautas", day(date), &collected(vec![json!({"v": v})]))
                .await
                .unwrap();
        }

        assert_eq!(
            store.list_dates("pautas").await.unwrap(),
            vec![day("20240101"), day("20240215"), day("20240301")]
        );
        let latest = store.read("pautas", None).await.unwrap();
        assert_eq!(latest.records, vec![json!({"v": 3})]);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(dir.path());

        assert!(store.list_dates("x").await.unwrap().is_empty());
        assert!(matches!(store.read("x", None).await, Err(AppError::NotFound { .. })));

        store
            .write("x", day("20240101"), &collected(vec![]))
            .await
            .unwrap();
        assert!(matches!(
            store.read("x", Some(day("20240102"))).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stray_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(dir.path());
        store
            .write("x", day("20240101"), &collected(vec![]))
            .await
            .unwrap();

        std::fs::write(dir.path().join("x/notes.json"), "{}").unwrap();
        std::fs::write(dir.path().join("x/20240102.json.tmp"), "{").unwrap();

        assert_eq!(store.list_dates("x").await.unwrap(), vec![day("20240101")]);
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(dir.path());
        let mut original = collected(vec![json!({"id": 1})]);
        original.truncated = true;
        original.pages = 50;

        store.write("x", day("20240101"), &original).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path("x", day("20240101"))).unwrap()).unwrap();
        assert_eq!(raw["metadata"]["record_count"], 1);
        assert_eq!(raw["metadata"]["truncated"], true);

        let read = store.read("x", None).await.unwrap();
        assert!(read.truncated);
        assert_eq!(read.pages, 50);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("20240131").unwrap(), parse_date("2024-01-31").unwrap());
        assert!(parse_date("31/01/2024").is_err());
    }
}
