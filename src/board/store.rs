use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use crate::errors::{with_retry, FleetError, RetryConfig};
use super::mission::Mission;

pub const DOCUMENT_VERSION: u32 = 1;
pub const DEFAULT_COLLECTIVE_GOAL: &str = "Build an exciting village before nightfall.";

/// The full persisted board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDocument {
    pub version: u32,
    pub collective_goal: String,
    pub missions: Vec<Mission>,
    pub viewer_missions: Vec<Mission>,
    pub updated_at: DateTime<Utc>,
}

impl BoardDocument {
    pub fn empty(collective_goal: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            collective_goal: collective_goal.unwrap_or(DEFAULT_COLLECTIVE_GOAL).to_string(),
            missions: Vec::new(),
            viewer_missions: Vec::new(),
            updated_at: now,
        }
    }

    pub fn all_missions(&self) -> impl Iterator<Item = &Mission> {
        self.missions.iter().chain(self.viewer_missions.iter())
    }

    pub fn all_missions_mut(&mut self) -> impl Iterator<Item = &mut Mission> {
        self.missions.iter_mut().chain(self.viewer_missions.iter_mut())
    }

    pub fn find(&self, mission_id: &str) -> Option<&Mission> {
        self.all_missions().find(|m| m.id == mission_id)
    }

    pub fn find_mut(&mut self, mission_id: &str) -> Option<&mut Mission> {
        self.all_missions_mut().find(|m| m.id == mission_id)
    }
}

/// A document as read from disk. Missions stay untyped so a single malformed
/// entry can be dropped without discarding the rest.
#[derive(Debug, Clone, Default)]
pub struct StoredDocument {
    pub version: Option<u32>,
    pub collective_goal: Option<String>,
    pub missions: Vec<Value>,
    pub viewer_missions: Vec<Value>,
}

impl StoredDocument {
    /// Pull each field out on its own. A field that is missing, `null` or of
    /// the wrong type falls back to empty instead of discarding the document.
    pub fn from_value(value: &Value) -> Self {
        let list = |key: &str| value.get(key).and_then(Value::as_array).cloned().unwrap_or_default();
        let version = value.get("version").and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        Self {
            version: version.and_then(|v| u32::try_from(v).ok()),
            collective_goal: value.get("collective_goal").and_then(Value::as_str).map(str::to_string),
            missions: list("missions"),
            viewer_missions: list("viewer_missions"),
        }
    }
}

/// Reads and atomically replaces the board's JSON document.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    retry: RetryConfig,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), retry: RetryConfig::default() }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<path>.tmp`, next to the canonical file so the rename stays on one filesystem.
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load the stored document. A missing file and an unparseable file both
    /// yield `None`; any other read failure is an error.
    pub async fn load(&self) -> Result<Option<StoredDocument>, FleetError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No mission board state on disk");
                return Ok(None);
            }
            Err(e) => {
                return Err(FleetError::Persistence(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) if value.is_object() => Ok(Some(StoredDocument::from_value(&value))),
            Ok(_) => {
                warn!(path = %self.path.display(), "Mission board state is not a JSON object, starting fresh");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Mission board state is corrupt, starting fresh");
                Ok(None)
            }
        }
    }

    /// Write the document to the temp path, flush it, then rename it over the
    /// canonical path.
    pub async fn save(&self, document: &BoardDocument) -> Result<(), FleetError> {
        let json = serde_json::to_string_pretty(document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn save_with_retry(&self, document: &BoardDocument) -> Result<(), FleetError> {
        with_retry("mission_board.persist", &self.retry, || self.save(document)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::mission::{normalize_mission, MissionDraft, MissionSource};
    use tempfile::TempDir;

    fn document_with_one_mission() -> BoardDocument {
        let now = Utc::now();
        let mut doc = BoardDocument::empty(None, now);
        doc.missions.push(normalize_mission(MissionDraft::new("mine 10 iron"), MissionSource::System, now).unwrap());
        doc
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let store = StateStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_null_and_mistyped_fields_keep_the_rest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let raw = r#"{
            "version": "1",
            "collective_goal": "Keep me",
            "missions": [{"id": "m1", "task": "mine iron"}],
            "viewer_missions": null,
            "updated_at": 17
        }"#;
        tokio::fs::write(&path, raw).await.unwrap();

        let loaded = StateStore::new(&path).load().await.unwrap().unwrap();
        assert_eq!(loaded.version, Some(1));
        assert_eq!(loaded.collective_goal.as_deref(), Some("Keep me"));
        assert_eq!(loaded.missions.len(), 1);
        assert_eq!(loaded.missions[0]["id"], "m1");
        assert!(loaded.viewer_missions.is_empty());
    }

    #[tokio::test]
    async fn test_non_object_document_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "[1, 2, 3]").await.unwrap();
        assert!(StateStore::new(&path).load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_path_is_error() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        assert!(matches!(store.load().await, Err(FleetError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("nested/board/state.json"));
        let doc = document_with_one_mission();

        store.save(&doc).await.unwrap();

        assert!(store.path().exists());
        assert!(!store.temp_path().exists());
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.missions.len(), 1);
        assert_eq!(loaded.missions[0]["task"], "mine 10 iron");
        assert_eq!(loaded.collective_goal.as_deref(), Some(DEFAULT_COLLECTIVE_GOAL));
    }

    #[tokio::test]
    async fn test_stale_temp_file_does_not_affect_canonical() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.save(&document_with_one_mission()).await.unwrap();

        // A crash mid-write leaves a partial temp file behind.
        tokio::fs::write(store.temp_path(), "{\"missions\": [").await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.missions.len(), 1);
    }

    #[test]
    fn test_temp_path_appends_suffix() {
        let store = StateStore::new("/var/lib/board/state.runtime.json");
        assert_eq!(store.temp_path(), PathBuf::from("/var/lib/board/state.runtime.json.tmp"));
    }
}
