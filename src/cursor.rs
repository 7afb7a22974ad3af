//! Persistence of the poll cursor between runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the last-successful-poll timestamp lives between runs.
pub trait CursorStore: Send + Sync {
    /// `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<DateTime<Utc>>>;
    fn save(&mut self, cursor: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorFile {
    last_update: DateTime<Utc>,
}

/// Keeps the cursor in a one-line TOML file.
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> Result<Option<DateTime<Utc>>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read cursor file: {}", self.path.display())
                })
            }
        };
        let file: CursorFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse cursor file: {}", self.path.display()))?;
        Ok(Some(file.last_update))
    }

    fn save(&mut self, cursor: DateTime<Utc>) -> Result<()> {
        let content = toml::to_string(&CursorFile { last_update: cursor })
            .context("Failed to serialize cursor")?;
        // Write-then-rename so a crash never leaves a truncated file behind
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write cursor file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cursor file: {}", self.path.display()))?;
        Ok(())
    }
}

/// In-process store, for tests and for running without persistence.
#[derive(Debug, Default, Clone)]
pub struct MemoryCursorStore {
    cursor: Option<DateTime<Utc>>,
    saves: usize,
}

impl MemoryCursorStore {
    pub fn new(cursor: Option<DateTime<Utc>>) -> Self {
        Self { cursor, saves: 0 }
    }

    /// Number of successful `save` calls.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.cursor)
    }

    fn save(&mut self, cursor: DateTime<Utc>) -> Result<()> {
        self.cursor = Some(cursor);
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, FileCursorStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCursorStore::new(temp_dir.path().join("state.toml"));
        (temp_dir, store)
    }

    #[test]
    fn test_missing_file_loads_none() {
        let (_dir, store) = setup_store();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, mut store) = setup_store();
        let ts = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

        store.save(ts).unwrap();
        assert_eq!(FileCursorStore::new(store.path()).load().unwrap(), Some(ts));

        let later = ts + chrono::Duration::hours(1);
        store.save(later).unwrap();
        assert_eq!(store.load().unwrap(), Some(later));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let (_dir, store) = setup_store();
        std::fs::write(store.path(), "last_update = 12").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_save_into_missing_directory_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = FileCursorStore::new(temp_dir.path().join("nope").join("state.toml"));
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(store.save(ts).is_err());
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let mut store = MemoryCursorStore::default();
        assert_eq!(store.load().unwrap(), None);
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.save(ts).unwrap();
        assert_eq!(store.load().unwrap(), Some(ts));
        assert_eq!(store.saves(), 1);
    }
}
