//! Contract for the hosted datastore that mirrors the local cache.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::decode::{decode_exercises, decode_meals};
use crate::models::{Exercise, Meal, StructuredLog};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("remote store returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("not authorized by the remote store")]
    Unauthorized,
    #[error("backend error: {0}")]
    Backend(String),
    #[error("could not decode remote response: {0}")]
    Decode(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend(format!("{err:#}"))
    }
}

/// The two entity tables of the legacy schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTable {
    Workout,
    Diet,
}

impl LogTable {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogTable::Workout => "workout",
            LogTable::Diet => "diet",
        }
    }
}

impl fmt::Display for LogTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogTable {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "workout" | "workout_logs" => Ok(LogTable::Workout),
            "diet" | "diet_logs" => Ok(LogTable::Diet),
            _ => bail!("Unknown log table '{s}'. Use 'workout' or 'diet'"),
        }
    }
}

/// Normalized result of a point lookup for one (user, date).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLog {
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub meals: Vec<Meal>,
}

impl RemoteLog {
    /// Build from raw stored payloads; absent rows are `None`.
    #[must_use]
    pub fn from_payloads(exercises: Option<&Value>, meals: Option<&Value>) -> Self {
        Self {
            exercises: exercises.map(decode_exercises).unwrap_or_default(),
            meals: meals.map(decode_meals).unwrap_or_default(),
        }
    }
}

/// Which tables a save actually wrote. A table is skipped when its list is
/// empty, so an emptied list leaves the previously stored row in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub workout_saved: bool,
    pub diet_saved: bool,
}

/// One date's raw payloads from a bulk fetch. Either side is `Null` when the
/// corresponding row does not exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub date: String,
    #[serde(default)]
    pub exercises: Value,
    #[serde(default)]
    pub meals: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyRow {
    pub date: String,
    #[serde(flatten)]
    pub log: StructuredLog,
}

/// A datastore holding workout and diet logs per (user, date).
///
/// Implementations report failures as [`StoreError`] values; callers decide
/// whether to fall back.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    async fn fetch(&self, user_id: &str, date: &str) -> Result<RemoteLog, StoreError>;

    async fn save(
        &self,
        user_id: &str,
        date: &str,
        exercises: &[Exercise],
        meals: &[Meal],
    ) -> Result<SaveOutcome, StoreError>;

    /// Remove one table's row for the date. Returns whether a row existed.
    async fn clear(&self, user_id: &str, date: &str, table: LogTable)
    -> Result<bool, StoreError>;

    async fn fetch_all(&self, user_id: &str) -> Result<Vec<LogRow>, StoreError>;

    async fn fetch_daily(
        &self,
        user_id: &str,
        date: &str,
    ) -> Result<Option<StructuredLog>, StoreError>;

    async fn save_daily(
        &self,
        user_id: &str,
        date: &str,
        log: &StructuredLog,
    ) -> Result<(), StoreError>;

    async fn fetch_all_daily(&self, user_id: &str) -> Result<Vec<DailyRow>, StoreError>;
}

impl<T: RemoteStore> RemoteStore for &T {
    async fn fetch(&self, user_id: &str, date: &str) -> Result<RemoteLog, StoreError> {
        (**self).fetch(user_id, date).await
    }

    async fn save(
        &self,
        user_id: &str,
        date: &str,
        exercises: &[Exercise],
        meals: &[Meal],
    ) -> Result<SaveOutcome, StoreError> {
        (**self).save(user_id, date, exercises, meals).await
    }

    async fn clear(
        &self,
        user_id: &str,
        date: &str,
        table: LogTable,
    ) -> Result<bool, StoreError> {
        (**self).clear(user_id, date, table).await
    }

    async fn fetch_all(&self, user_id: &str) -> Result<Vec<LogRow>, StoreError> {
        (**self).fetch_all(user_id).await
    }

    async fn fetch_daily(
        &self,
        user_id: &str,
        date: &str,
    ) -> Result<Option<StructuredLog>, StoreError> {
        (**self).fetch_daily(user_id, date).await
    }

    async fn save_daily(
        &self,
        user_id: &str,
        date: &str,
        log: &StructuredLog,
    ) -> Result<(), StoreError> {
        (**self).save_daily(user_id, date, log).await
    }

    async fn fetch_all_daily(&self, user_id: &str) -> Result<Vec<DailyRow>, StoreError> {
        (**self).fetch_all_daily(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_table_parse() {
        assert_eq!("workout".parse::<LogTable>().unwrap(), LogTable::Workout);
        assert_eq!("diet_logs".parse::<LogTable>().unwrap(), LogTable::Diet);
        assert!("meals".parse::<LogTable>().is_err());
    }

    #[test]
    fn test_remote_log_from_payloads() {
        let ex = json!([{"id": "1", "name": "Squat"}]);
        let log = RemoteLog::from_payloads(Some(&ex), None);
        assert_eq!(log.exercises.len(), 1);
        assert!(log.meals.is_empty());

        let junk = json!("corrupt");
        let log = RemoteLog::from_payloads(Some(&junk), Some(&junk));
        assert_eq!(log, RemoteLog::default());
    }

    #[test]
    fn test_store_error_from_anyhow_keeps_chain() {
        let err: StoreError = anyhow::anyhow!("disk full")
            .context("failed to upsert workout log")
            .into();
        let msg = err.to_string();
        assert!(msg.contains("failed to upsert workout log"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_daily_row_flattens() {
        let row = DailyRow {
            date: "2025-03-01".to_string(),
            log: StructuredLog {
                steps: Some(5000),
                ..StructuredLog::default()
            },
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["date"], "2025-03-01");
        assert_eq!(value["steps"], 5000);
    }
}
