//! Local cache of daily logs keyed by date.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::DailyLog;

/// Key under which the whole blob is stored.
pub const STORAGE_KEY: &str = "fitnessLogs";

/// A date-keyed store of [`DailyLog`] records.
///
/// Reads never fail: missing or unreadable data is the empty record.
pub trait LogCache {
    fn get(&self, date: &str) -> DailyLog;
    fn set(&self, date: &str, log: &DailyLog) -> Result<()>;
    fn delete(&self, date: &str) -> Result<bool>;
    fn all(&self) -> BTreeMap<String, DailyLog>;
}

impl<T: LogCache + ?Sized> LogCache for &T {
    fn get(&self, date: &str) -> DailyLog {
        (**self).get(date)
    }

    fn set(&self, date: &str, log: &DailyLog) -> Result<()> {
        (**self).set(date, log)
    }

    fn delete(&self, date: &str) -> Result<bool> {
        (**self).delete(date)
    }

    fn all(&self) -> BTreeMap<String, DailyLog> {
        (**self).all()
    }
}

// --- JSON blob file ---

#[derive(Debug, Default, Serialize, Deserialize)]
struct Blob {
    #[serde(rename = "fitnessLogs", default)]
    logs: BTreeMap<String, DailyLog>,
}

/// A single JSON file holding every date's record under [`STORAGE_KEY`].
///
/// Each `set` is a read-modify-write of the whole file. Two processes writing
/// at once race and the last rename wins.
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_blob(&self) -> Blob {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Blob::default(),
            Err(err) => {
                warn!(path = %self.path.display(), "failed to read log cache: {err}");
                return Blob::default();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!(path = %self.path.display(), "log cache is malformed, treating as empty: {err}");
            Blob::default()
        })
    }

    fn write_blob(&self, blob: &Blob) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let payload = serde_json::to_vec_pretty(blob)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, payload)
            .with_context(|| format!("Failed to write log cache: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace log cache: {}", self.path.display()))?;
        Ok(())
    }
}

impl LogCache for FileCache {
    fn get(&self, date: &str) -> DailyLog {
        self.read_blob().logs.remove(date).unwrap_or_default()
    }

    fn set(&self, date: &str, log: &DailyLog) -> Result<()> {
        let mut blob = self.read_blob();
        blob.logs.insert(date.to_string(), log.clone());
        self.write_blob(&blob)
    }

    fn delete(&self, date: &str) -> Result<bool> {
        let mut blob = self.read_blob();
        if blob.logs.remove(date).is_none() {
            return Ok(false);
        }
        self.write_blob(&blob)?;
        Ok(true)
    }

    fn all(&self) -> BTreeMap<String, DailyLog> {
        self.read_blob().logs
    }
}

// --- Embedded SQLite ---

/// One row per date in an embedded database.
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cache database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS log_cache (
                date TEXT PRIMARY KEY NOT NULL,
                record TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }

    fn read(&self, date: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT record FROM log_cache WHERE date = ?1",
                params![date],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn read_all(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, record FROM log_cache ORDER BY date")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl LogCache for SqliteCache {
    fn get(&self, date: &str) -> DailyLog {
        match self.read(date) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(date, "cached record is malformed, treating as empty: {err}");
                DailyLog::default()
            }),
            Ok(None) => DailyLog::default(),
            Err(err) => {
                warn!(date, "failed to read cached record: {err:#}");
                DailyLog::default()
            }
        }
    }

    fn set(&self, date: &str, log: &DailyLog) -> Result<()> {
        let record = serde_json::to_string(log)?;
        self.conn.execute(
            "INSERT INTO log_cache (date, record) VALUES (?1, ?2)
             ON CONFLICT(date) DO UPDATE SET record = excluded.record",
            params![date, record],
        )?;
        Ok(())
    }

    fn delete(&self, date: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM log_cache WHERE date = ?1", params![date])?;
        Ok(n > 0)
    }

    fn all(&self) -> BTreeMap<String, DailyLog> {
        let rows = self.read_all().unwrap_or_else(|err| {
            warn!("failed to read log cache: {err:#}");
            Vec::new()
        });
        rows.into_iter()
            .filter_map(|(date, raw)| serde_json::from_str(&raw).ok().map(|log| (date, log)))
            .collect()
    }
}

// --- In memory ---

#[derive(Default)]
pub struct MemoryCache {
    logs: Mutex<HashMap<String, DailyLog>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogCache for MemoryCache {
    fn get(&self, date: &str) -> DailyLog {
        self.logs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(date)
            .cloned()
            .unwrap_or_default()
    }

    fn set(&self, date: &str, log: &DailyLog) -> Result<()> {
        self.logs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(date.to_string(), log.clone());
        Ok(())
    }

    fn delete(&self, date: &str) -> Result<bool> {
        Ok(self
            .logs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(date)
            .is_some())
    }

    fn all(&self) -> BTreeMap<String, DailyLog> {
        self.logs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Exercise, Meal};

    fn sample_log() -> DailyLog {
        DailyLog {
            exercises: vec![Exercise {
                id: "1".to_string(),
                name: "Squat".to_string(),
                sets: "3".to_string(),
                reps: "10".to_string(),
                ..Exercise::default()
            }],
            meals: vec![Meal {
                id: "2".to_string(),
                name: "Oats".to_string(),
                calories: "350".to_string(),
                ..Meal::default()
            }],
            ..DailyLog::default()
        }
    }

    fn exercise_contract(cache: &dyn LogCache) {
        assert_eq!(cache.get("2025-03-01"), DailyLog::default());

        cache.set("2025-03-01", &sample_log()).unwrap();
        assert_eq!(cache.get("2025-03-01"), sample_log());
        assert_eq!(cache.get("2025-03-02"), DailyLog::default());

        let mut updated = sample_log();
        updated.exercises.clear();
        cache.set("2025-03-01", &updated).unwrap();
        assert!(cache.get("2025-03-01").exercises.is_empty());

        cache.set("2025-03-02", &sample_log()).unwrap();
        let all = cache.all();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("2025-03-02"));

        assert!(cache.delete("2025-03-02").unwrap());
        assert!(!cache.delete("2025-03-02").unwrap());
        assert_eq!(cache.all().len(), 1);
    }

    #[test]
    fn test_file_cache_contract() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("logs.json"));
        exercise_contract(&cache);
    }

    #[test]
    fn test_sqlite_cache_contract() {
        let cache = SqliteCache::open_in_memory().unwrap();
        exercise_contract(&cache);
    }

    #[test]
    fn test_memory_cache_contract() {
        exercise_contract(&MemoryCache::new());
    }

    #[test]
    fn test_file_cache_blob_layout() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("logs.json");
        let cache = FileCache::new(&path);
        cache.set("2025-03-01", &sample_log()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let day = &raw[STORAGE_KEY]["2025-03-01"];
        assert_eq!(day["exercises"][0]["name"], "Squat");
        assert_eq!(day["meals"][0]["calories"], "350");
    }

    #[test]
    fn test_file_cache_malformed_blob_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("logs.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let cache = FileCache::new(&path);

        assert_eq!(cache.get("2025-03-01"), DailyLog::default());
        assert!(cache.all().is_empty());

        // A write replaces the corrupt blob.
        cache.set("2025-03-01", &sample_log()).unwrap();
        assert_eq!(cache.get("2025-03-01"), sample_log());
    }

    #[test]
    fn test_file_cache_reads_legacy_records() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("logs.json");
        std::fs::write(
            &path,
            r#"{"fitnessLogs":{"2025-01-05":{"exercises":[{"id":"9","name":"Run","sets":"","reps":"","notes":"5k"}],"meals":[]}}}"#,
        )
        .unwrap();
        let cache = FileCache::new(&path);
        let log = cache.get("2025-01-05");
        assert_eq!(log.exercises[0].notes, "5k");
    }

    #[test]
    fn test_sqlite_cache_persists_across_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cache.db");
        {
            let cache = SqliteCache::open(&path).unwrap();
            cache.set("2025-03-01", &sample_log()).unwrap();
        }
        let cache = SqliteCache::open(&path).unwrap();
        assert_eq!(cache.get("2025-03-01"), sample_log());
    }
}
