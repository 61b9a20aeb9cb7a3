use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Exercise, Macros, Meal, StructuredLog, WorkoutRow};
use crate::remote::{DailyRow, LogRow, LogTable, RemoteLog, RemoteStore, SaveOutcome, StoreError};

/// The hosted datastore: legacy `workout_logs` / `diet_logs` tables plus the
/// structured `daily_logs` / `workouts` schema, all keyed by (user, date).
pub struct Backend {
    conn: Connection,
}

impl Backend {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Backend { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Backend { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS workout_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    exercises TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (user_id, date)
                );

                CREATE TABLE IF NOT EXISTS diet_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    meals TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (user_id, date)
                );

                CREATE INDEX IF NOT EXISTS idx_workout_logs_user ON workout_logs(user_id);
                CREATE INDEX IF NOT EXISTS idx_diet_logs_user ON diet_logs(user_id);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS daily_logs (
                    id TEXT PRIMARY KEY NOT NULL,
                    user_id TEXT NOT NULL,
                    log_date TEXT NOT NULL,
                    goals TEXT NOT NULL DEFAULT '[]',
                    water_intake REAL,
                    steps INTEGER,
                    weight REAL,
                    breakfast TEXT NOT NULL DEFAULT '',
                    lunch TEXT NOT NULL DEFAULT '',
                    dinner TEXT NOT NULL DEFAULT '',
                    snacks TEXT NOT NULL DEFAULT '',
                    macros_calories REAL,
                    macros_protein REAL,
                    macros_carbs REAL,
                    macros_fat REAL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (user_id, log_date)
                );

                CREATE TABLE IF NOT EXISTS workouts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    daily_log_id TEXT NOT NULL REFERENCES daily_logs(id) ON DELETE CASCADE,
                    muscle_group TEXT NOT NULL DEFAULT '',
                    sets TEXT NOT NULL DEFAULT '',
                    reps TEXT NOT NULL DEFAULT '',
                    exercise_name TEXT NOT NULL DEFAULT '',
                    weight TEXT NOT NULL DEFAULT ''
                );

                CREATE INDEX IF NOT EXISTS idx_workouts_daily_log ON workouts(daily_log_id);

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Legacy per-table logs ---

    pub fn get_log_payload(&self, user_id: &str, date: &str, table: LogTable) -> Result<Option<Value>> {
        let sql = match table {
            LogTable::Workout => "SELECT exercises FROM workout_logs WHERE user_id = ?1 AND date = ?2",
            LogTable::Diet => "SELECT meals FROM diet_logs WHERE user_id = ?1 AND date = ?2",
        };
        let raw: Option<String> = self
            .conn
            .query_row(sql, params![user_id, date], |row| row.get(0))
            .optional()?;
        Ok(raw.map(|raw| parse_payload(&raw)))
    }

    pub fn get_log(&self, user_id: &str, date: &str) -> Result<RemoteLog> {
        let exercises = self.get_log_payload(user_id, date, LogTable::Workout)?;
        let meals = self.get_log_payload(user_id, date, LogTable::Diet)?;
        Ok(RemoteLog::from_payloads(exercises.as_ref(), meals.as_ref()))
    }

    pub fn upsert_workout_log(&self, user_id: &str, date: &str, exercises: &[Exercise]) -> Result<()> {
        let payload = serde_json::to_string(exercises)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO workout_logs (user_id, date, exercises, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, date) DO UPDATE SET
                    exercises = excluded.exercises,
                    updated_at = excluded.updated_at",
                params![user_id, date, payload, now],
            )
            .context("failed to upsert workout log")?;
        Ok(())
    }

    pub fn upsert_diet_log(&self, user_id: &str, date: &str, meals: &[Meal]) -> Result<()> {
        let payload = serde_json::to_string(meals)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO diet_logs (user_id, date, meals, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, date) DO UPDATE SET
                    meals = excluded.meals,
                    updated_at = excluded.updated_at",
                params![user_id, date, payload, now],
            )
            .context("failed to upsert diet log")?;
        Ok(())
    }

    /// Upsert each non-empty list. An empty list leaves its table untouched.
    pub fn save_log(
        &self,
        user_id: &str,
        date: &str,
        exercises: &[Exercise],
        meals: &[Meal],
    ) -> Result<SaveOutcome> {
        let mut outcome = SaveOutcome::default();
        if !exercises.is_empty() {
            self.upsert_workout_log(user_id, date, exercises)?;
            outcome.workout_saved = true;
        }
        if !meals.is_empty() {
            self.upsert_diet_log(user_id, date, meals)?;
            outcome.diet_saved = true;
        }
        debug!(user_id, date, ?outcome, "saved legacy log");
        Ok(outcome)
    }

    pub fn delete_log(&self, user_id: &str, date: &str, table: LogTable) -> Result<bool> {
        let sql = match table {
            LogTable::Workout => "DELETE FROM workout_logs WHERE user_id = ?1 AND date = ?2",
            LogTable::Diet => "DELETE FROM diet_logs WHERE user_id = ?1 AND date = ?2",
        };
        let n = self.conn.execute(sql, params![user_id, date])?;
        Ok(n > 0)
    }

    /// Every date with a workout or diet row, ascending.
    pub fn list_log_rows(&self, user_id: &str) -> Result<Vec<LogRow>> {
        let mut by_date: BTreeMap<String, LogRow> = BTreeMap::new();

        let mut stmt = self
            .conn
            .prepare("SELECT date, exercises FROM workout_logs WHERE user_id = ?1")?;
        let workouts = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (date, raw) in workouts {
            let entry = by_date.entry(date.clone()).or_insert_with(|| LogRow {
                date,
                ..LogRow::default()
            });
            entry.exercises = parse_payload(&raw);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT date, meals FROM diet_logs WHERE user_id = ?1")?;
        let diets = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (date, raw) in diets {
            let entry = by_date.entry(date.clone()).or_insert_with(|| LogRow {
                date,
                ..LogRow::default()
            });
            entry.meals = parse_payload(&raw);
        }

        Ok(by_date.into_values().collect())
    }

    // --- Structured daily logs ---

    // Expects columns:
    // 0: id, 1: goals, 2: water_intake, 3: steps, 4: weight,
    // 5: breakfast, 6: lunch, 7: dinner, 8: snacks,
    // 9: macros_calories, 10: macros_protein, 11: macros_carbs, 12: macros_fat
    fn daily_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<(String, StructuredLog)> {
        let goals_raw: String = row.get(1)?;
        let goals = serde_json::from_str::<Vec<String>>(&goals_raw).unwrap_or_default();
        Ok((
            row.get(0)?,
            StructuredLog {
                goals,
                water_intake: row.get(2)?,
                steps: row.get(3)?,
                weight: row.get(4)?,
                breakfast: row.get(5)?,
                lunch: row.get(6)?,
                dinner: row.get(7)?,
                snacks: row.get(8)?,
                macros: Macros {
                    calories: row.get(9)?,
                    protein: row.get(10)?,
                    carbs: row.get(11)?,
                    fat: row.get(12)?,
                },
                workouts: Vec::new(),
                muscle_groups: Vec::new(),
            },
        ))
    }

    fn get_workouts(&self, daily_log_id: &str) -> Result<Vec<WorkoutRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT muscle_group, exercise_name, sets, reps, weight
             FROM workouts WHERE daily_log_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![daily_log_id], |row| {
                Ok(WorkoutRow {
                    muscle_group: row.get(0)?,
                    exercise_name: row.get(1)?,
                    sets: row.get(2)?,
                    reps: row.get(3)?,
                    weight: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn with_workouts(&self, id: &str, mut log: StructuredLog) -> Result<StructuredLog> {
        log.workouts = self.get_workouts(id)?;
        log.muscle_groups = StructuredLog::derive_muscle_groups(&log.workouts);
        Ok(log)
    }

    pub fn get_daily_log(&self, user_id: &str, date: &str) -> Result<Option<StructuredLog>> {
        let found = self
            .conn
            .query_row(
                "SELECT id, goals, water_intake, steps, weight, breakfast, lunch, dinner, snacks,
                        macros_calories, macros_protein, macros_carbs, macros_fat
                 FROM daily_logs WHERE user_id = ?1 AND log_date = ?2",
                params![user_id, date],
                Self::daily_log_from_row,
            )
            .optional()?;
        match found {
            Some((id, log)) => Ok(Some(self.with_workouts(&id, log)?)),
            None => Ok(None),
        }
    }

    /// Upsert the daily row and replace its workout children.
    pub fn upsert_daily_log(&self, user_id: &str, date: &str, log: &StructuredLog) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();
        let goals = serde_json::to_string(&log.goals)?;
        tx.execute(
            "INSERT INTO daily_logs (id, user_id, log_date, goals, water_intake, steps, weight,
                                     breakfast, lunch, dinner, snacks, macros_calories,
                                     macros_protein, macros_carbs, macros_fat, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(user_id, log_date) DO UPDATE SET
                goals = excluded.goals,
                water_intake = excluded.water_intake,
                steps = excluded.steps,
                weight = excluded.weight,
                breakfast = excluded.breakfast,
                lunch = excluded.lunch,
                dinner = excluded.dinner,
                snacks = excluded.snacks,
                macros_calories = excluded.macros_calories,
                macros_protein = excluded.macros_protein,
                macros_carbs = excluded.macros_carbs,
                macros_fat = excluded.macros_fat,
                updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                date,
                goals,
                log.water_intake,
                log.steps,
                log.weight,
                log.breakfast,
                log.lunch,
                log.dinner,
                log.snacks,
                log.macros.calories,
                log.macros.protein,
                log.macros.carbs,
                log.macros.fat,
                now,
            ],
        )
        .context("failed to upsert daily log")?;

        let id: String = tx.query_row(
            "SELECT id FROM daily_logs WHERE user_id = ?1 AND log_date = ?2",
            params![user_id, date],
            |row| row.get(0),
        )?;
        tx.execute("DELETE FROM workouts WHERE daily_log_id = ?1", params![id])?;
        for w in &log.workouts {
            tx.execute(
                "INSERT INTO workouts (daily_log_id, muscle_group, sets, reps, exercise_name, weight)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, w.muscle_group, w.sets, w.reps, w.exercise_name, w.weight],
            )?;
        }
        tx.commit()?;
        debug!(user_id, date, workouts = log.workouts.len(), "saved daily log");
        Ok(())
    }

    pub fn list_daily_logs(&self, user_id: &str) -> Result<Vec<DailyRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, goals, water_intake, steps, weight, breakfast, lunch, dinner, snacks,
                    macros_calories, macros_protein, macros_carbs, macros_fat, log_date
             FROM daily_logs WHERE user_id = ?1 ORDER BY log_date",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                let (id, log) = Self::daily_log_from_row(row)?;
                let date: String = row.get(13)?;
                Ok((id, date, log))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, date, log)| {
                Ok(DailyRow {
                    date,
                    log: self.with_workouts(&id, log)?,
                })
            })
            .collect()
    }
}

fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!("stored log payload is not valid JSON: {err}");
        Value::Null
    })
}

impl RemoteStore for Backend {
    async fn fetch(&self, user_id: &str, date: &str) -> Result<RemoteLog, StoreError> {
        Ok(self.get_log(user_id, date)?)
    }

    async fn save(
        &self,
        user_id: &str,
        date: &str,
        exercises: &[Exercise],
        meals: &[Meal],
    ) -> Result<SaveOutcome, StoreError> {
        Ok(self.save_log(user_id, date, exercises, meals)?)
    }

    async fn clear(
        &self,
        user_id: &str,
        date: &str,
        table: LogTable,
    ) -> Result<bool, StoreError> {
        Ok(self.delete_log(user_id, date, table)?)
    }

    async fn fetch_all(&self, user_id: &str) -> Result<Vec<LogRow>, StoreError> {
        Ok(self.list_log_rows(user_id)?)
    }

    async fn fetch_daily(
        &self,
        user_id: &str,
        date: &str,
    ) -> Result<Option<StructuredLog>, StoreError> {
        Ok(self.get_daily_log(user_id, date)?)
    }

    async fn save_daily(
        &self,
        user_id: &str,
        date: &str,
        log: &StructuredLog,
    ) -> Result<(), StoreError> {
        Ok(self.upsert_daily_log(user_id, date, log)?)
    }

    async fn fetch_all_daily(&self, user_id: &str) -> Result<Vec<DailyRow>, StoreError> {
        Ok(self.list_daily_logs(user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squat() -> Exercise {
        Exercise {
            id: "1".to_string(),
            name: "Squat".to_string(),
            sets: "3".to_string(),
            reps: "10".to_string(),
            ..Exercise::default()
        }
    }

    fn oats() -> Meal {
        Meal {
            id: "2".to_string(),
            name: "Oats".to_string(),
            calories: "350".to_string(),
            protein: "12".to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_get_log_missing_is_empty() {
        let db = Backend::open_in_memory().unwrap();
        let log = db.get_log("u1", "2025-03-01").unwrap();
        assert_eq!(log, RemoteLog::default());
    }

    #[test]
    fn test_save_and_get_log_roundtrip() {
        let db = Backend::open_in_memory().unwrap();
        let outcome = db
            .save_log("u1", "2025-03-01", &[squat()], &[oats()])
            .unwrap();
        assert!(outcome.workout_saved);
        assert!(outcome.diet_saved);

        let log = db.get_log("u1", "2025-03-01").unwrap();
        assert_eq!(log.exercises, vec![squat()]);
        assert_eq!(log.meals, vec![oats()]);
    }

    #[test]
    fn test_logs_are_scoped_by_user() {
        let db = Backend::open_in_memory().unwrap();
        db.save_log("u1", "2025-03-01", &[squat()], &[]).unwrap();
        let other = db.get_log("u2", "2025-03-01").unwrap();
        assert!(other.exercises.is_empty());
    }

    #[test]
    fn test_upsert_replaces_row() {
        let db = Backend::open_in_memory().unwrap();
        db.save_log("u1", "2025-03-01", &[squat()], &[]).unwrap();
        let mut bench = squat();
        bench.id = "5".to_string();
        bench.name = "Bench".to_string();
        db.save_log("u1", "2025-03-01", &[bench.clone()], &[])
            .unwrap();

        let log = db.get_log("u1", "2025-03-01").unwrap();
        assert_eq!(log.exercises, vec![bench]);

        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM workout_logs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_empty_list_skips_upsert() {
        let db = Backend::open_in_memory().unwrap();
        db.save_log("u1", "2025-03-01", &[squat()], &[oats()])
            .unwrap();

        let outcome = db.save_log("u1", "2025-03-01", &[], &[oats()]).unwrap();
        assert!(!outcome.workout_saved);
        assert!(outcome.diet_saved);

        // The earlier workout row is still there.
        let log = db.get_log("u1", "2025-03-01").unwrap();
        assert_eq!(log.exercises, vec![squat()]);
    }

    #[test]
    fn test_delete_log() {
        let db = Backend::open_in_memory().unwrap();
        db.save_log("u1", "2025-03-01", &[squat()], &[]).unwrap();
        assert!(db.delete_log("u1", "2025-03-01", LogTable::Workout).unwrap());
        assert!(!db.delete_log("u1", "2025-03-01", LogTable::Workout).unwrap());
        assert!(db.get_log("u1", "2025-03-01").unwrap().exercises.is_empty());
    }

    #[test]
    fn test_corrupt_payload_decodes_empty() {
        let db = Backend::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO workout_logs (user_id, date, exercises, updated_at)
                 VALUES ('u1', '2025-03-01', '\"just a string\"', 'now')",
                [],
            )
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO diet_logs (user_id, date, meals, updated_at)
                 VALUES ('u1', '2025-03-01', '{broken', 'now')",
                [],
            )
            .unwrap();
        let log = db.get_log("u1", "2025-03-01").unwrap();
        assert_eq!(log, RemoteLog::default());
    }

    #[test]
    fn test_list_log_rows_merges_tables() {
        let db = Backend::open_in_memory().unwrap();
        db.save_log("u1", "2025-03-02", &[squat()], &[]).unwrap();
        db.save_log("u1", "2025-03-01", &[], &[oats()]).unwrap();
        db.save_log("u1", "2025-03-03", &[squat()], &[oats()])
            .unwrap();
        db.save_log("u2", "2025-03-04", &[squat()], &[]).unwrap();

        let rows = db.list_log_rows("u1").unwrap();
        let dates: Vec<&str> = rows.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-03-01", "2025-03-02", "2025-03-03"]);
        assert!(rows[0].exercises.is_null());
        assert!(rows[0].meals.is_array());
        assert!(rows[1].meals.is_null());
        assert!(rows[2].exercises.is_array() && rows[2].meals.is_array());
    }

    #[test]
    fn test_daily_log_roundtrip_with_workouts() {
        let db = Backend::open_in_memory().unwrap();
        assert!(db.get_daily_log("u1", "2025-03-01").unwrap().is_none());

        let log = StructuredLog {
            goals: vec!["10k steps".to_string()],
            water_intake: Some(2.0),
            steps: Some(10_500),
            weight: Some(81.2),
            lunch: "chicken wrap".to_string(),
            macros: Macros {
                calories: Some(2200.0),
                protein: Some(160.0),
                carbs: None,
                fat: None,
            },
            workouts: vec![
                WorkoutRow {
                    muscle_group: "Legs".to_string(),
                    exercise_name: "Squat".to_string(),
                    sets: "5".to_string(),
                    reps: "5".to_string(),
                    weight: "120".to_string(),
                },
                WorkoutRow {
                    muscle_group: "Core".to_string(),
                    exercise_name: "Plank".to_string(),
                    ..WorkoutRow::default()
                },
            ],
            ..StructuredLog::default()
        };
        db.upsert_daily_log("u1", "2025-03-01", &log).unwrap();

        let stored = db.get_daily_log("u1", "2025-03-01").unwrap().unwrap();
        assert_eq!(stored.goals, log.goals);
        assert_eq!(stored.steps, Some(10_500));
        assert_eq!(stored.lunch, "chicken wrap");
        assert_eq!(stored.macros.calories, Some(2200.0));
        assert_eq!(stored.workouts, log.workouts);
        assert_eq!(stored.muscle_groups, vec!["Legs", "Core"]);
    }

    #[test]
    fn test_daily_log_upsert_replaces_workouts() {
        let db = Backend::open_in_memory().unwrap();
        let mut log = StructuredLog {
            workouts: vec![WorkoutRow {
                exercise_name: "Squat".to_string(),
                ..WorkoutRow::default()
            }],
            ..StructuredLog::default()
        };
        db.upsert_daily_log("u1", "2025-03-01", &log).unwrap();
        log.workouts.clear();
        log.steps = Some(42);
        db.upsert_daily_log("u1", "2025-03-01", &log).unwrap();

        let stored = db.get_daily_log("u1", "2025-03-01").unwrap().unwrap();
        assert!(stored.workouts.is_empty());
        assert_eq!(stored.steps, Some(42));

        let children: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM workouts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(children, 0);
    }

    #[test]
    fn test_list_daily_logs() {
        let db = Backend::open_in_memory().unwrap();
        let log = StructuredLog {
            workouts: vec![WorkoutRow {
                muscle_group: "Back".to_string(),
                exercise_name: "Row".to_string(),
                ..WorkoutRow::default()
            }],
            ..StructuredLog::default()
        };
        db.upsert_daily_log("u1", "2025-03-05", &log).unwrap();
        db.upsert_daily_log("u1", "2025-03-01", &StructuredLog::default())
            .unwrap();

        let rows = db.list_daily_logs("u1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2025-03-01");
        assert_eq!(rows[1].log.muscle_groups, vec!["Back"]);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("backend.db");
        {
            let db = Backend::open(&path).unwrap();
            db.save_log("u1", "2025-03-01", &[squat()], &[]).unwrap();
        }
        let db = Backend::open(&path).unwrap();
        assert_eq!(db.get_log("u1", "2025-03-01").unwrap().exercises.len(), 1);
    }
}
