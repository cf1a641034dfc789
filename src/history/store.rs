//! Loading and saving the directory history file.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::HistoryMap;

/// Reads and writes the history JSON file.
pub struct HistoryStore {
    /// Full path of the history file, e.g. `~/.local/share/recent-dirs/history.json`.
    path: PathBuf,
}

impl HistoryStore {
    /// Create a store backed by the given file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the history from disk.
    ///
    /// Any failure (missing file, unreadable file, malformed JSON) yields an
    /// empty history: the daemon rebuilds its record over time rather than
    /// refusing to start.
    pub fn load(&self) -> HistoryMap {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %self.path.display(), %err, "no readable history file, starting empty");
                return HistoryMap::new();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(map) => map,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "history file is malformed, starting empty");
                HistoryMap::new()
            }
        }
    }

    /// Write the full history to disk.
    ///
    /// The file is written to a temporary sibling and renamed into place, so
    /// readers never observe a partially written snapshot.
    pub fn save(&self, history: &HistoryMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(history).context("Failed to serialize history")?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write history file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| {
            format!("Failed to move history file into place: {}", self.path.display())
        })?;

        debug!(path = %self.path.display(), entries = history.len(), "saved history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::DirUsage;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample_history() -> HistoryMap {
        let mut map = HistoryMap::new();
        for (path, ts) in [
            ("/home/user/projects/alpha", 1_700_000_000),
            ("/home/user/projects/beta", 1_700_000_100),
            ("/tmp/scratch", 1_700_000_200),
        ] {
            let path = PathBuf::from(path);
            map.insert(
                path.clone(),
                DirUsage {
                    path,
                    last_access: Utc.timestamp_opt(ts, 0).unwrap(),
                },
            );
        }
        map
    }

    #[test]
    fn test_load_missing_file_returns_empty() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("history.json"));

        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("history.json"));
        let history = sample_history();

        store.save(&history).unwrap();
        let loaded = store.load();

        assert_eq!(loaded, history);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("nested/dirs/history.json"));

        store.save(&sample_history()).unwrap();

        assert!(store.path().exists());
    }

    #[test]
    fn test_load_corrupt_file_returns_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let store = HistoryStore::new(path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_wrong_shape_returns_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.json");
        std::fs::write(&path, r#"["a", "b"]"#).unwrap();

        let store = HistoryStore::new(path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("history.json"));

        store.save(&sample_history()).unwrap();

        assert!(!temp.path().join("history.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("history.json"));

        store.save(&sample_history()).unwrap();

        let mut smaller = HistoryMap::new();
        let path = PathBuf::from("/only/one");
        smaller.insert(path.clone(), DirUsage::now(path));
        store.save(&smaller).unwrap();

        assert_eq!(store.load().len(), 1);
    }
}
