use std::io::Write;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{RankError, Result};
use crate::models::PopularitySnapshot;

/// Bumped whenever the popularity formula changes so older artifacts are recomputed.
pub const SNAPSHOT_VERSION: u32 = 1;

pub trait SnapshotRepository {
    /// Returns `None` when nothing usable has been persisted.
    fn load(&self) -> Result<Option<PopularitySnapshot>>;

    fn save(&self, snapshot: &PopularitySnapshot) -> Result<()>;
}

/// Snapshot persisted as a pretty-printed JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotRepository for JsonFileCache {
    fn load(&self) -> Result<Option<PopularitySnapshot>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let snapshot: PopularitySnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(path = %self.path.display(), "ignoring unreadable snapshot: {err}");
                return Ok(None);
            }
        };

        if snapshot.version != SNAPSHOT_VERSION {
            debug!(
                found = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "ignoring snapshot from another scoring version"
            );
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &PopularitySnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        // Readers only ever see the old file or the complete new one.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, snapshot)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|err| RankError::Cache(format!("{}: {}", self.path.display(), err.error)))?;
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Mutex<Option<PopularitySnapshot>>,
}

#[cfg(test)]
impl MemoryCache {
    pub fn with_snapshot(snapshot: PopularitySnapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
        }
    }
}

#[cfg(test)]
impl SnapshotRepository for MemoryCache {
    fn load(&self) -> Result<Option<PopularitySnapshot>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| RankError::Cache("snapshot lock poisoned".into()))?;
        Ok(slot.clone())
    }

    fn save(&self, snapshot: &PopularitySnapshot) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| RankError::Cache("snapshot lock poisoned".into()))?;
        *slot = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::{CandidateRecord, NoteType, ScoredRecord};

    fn snapshot() -> PopularitySnapshot {
        PopularitySnapshot {
            version: SNAPSHOT_VERSION,
            computed_at: Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap(),
            items: vec![ScoredRecord {
                record: CandidateRecord {
                    id: 7,
                    title: "Lineer Cebir Final".to_string(),
                    description: "Özet".to_string(),
                    course: "MAT201".to_string(),
                    note_type: NoteType::Pdf,
                    downloads: 12,
                    avg_rating: Some(4.5),
                    views: 40,
                    created_at: Utc.with_ymd_and_hms(2026, 9, 20, 10, 0, 0).unwrap(),
                    uploader: Some("Ayşe Yılmaz".to_string()),
                },
                score: 1.25,
            }],
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(tmp.path().join("popular_daily.json"));
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn saved_snapshot_is_loaded_back() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(tmp.path().join("nested/popular_daily.json"));
        cache.save(&snapshot()).unwrap();
        assert_eq!(cache.load().unwrap(), Some(snapshot()));
    }

    #[test]
    fn artifact_uses_documented_field_names() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("popular_daily.json");
        JsonFileCache::new(&path).save(&snapshot()).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["computedAt"], "2026-10-01T08:00:00Z");
        let item = &value["items"][0];
        assert_eq!(item["type"], "pdf");
        assert_eq!(item["avgRating"], 4.5);
        assert_eq!(item["uploaderRef"], "Ayşe Yılmaz");
        assert_eq!(item["score"], 1.25);
    }

    #[test]
    fn corrupt_or_outdated_artifact_counts_as_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("popular_daily.json");
        let cache = JsonFileCache::new(&path);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(cache.load().unwrap().is_none());

        let mut old = snapshot();
        old.version = SNAPSHOT_VERSION + 1;
        cache.save(&old).unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn missing_views_default_to_zero() {
        let raw = r#"{
            "version": 1,
            "computedAt": "2026-10-01T08:00:00Z",
            "items": [{
                "id": 3, "score": 0.5, "title": "t", "description": "", "course": "c",
                "type": "doc", "downloads": 1, "avgRating": null,
                "createdAt": "2026-09-01T00:00:00Z", "uploaderRef": null
            }]
        }"#;
        let snapshot: PopularitySnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.items[0].record.views, 0);
        assert_eq!(snapshot.items[0].record.rating_or_zero(), 0.0);
    }
}
