//! Reads and writes daily logs across the local cache and the remote store.
//!
//! Reads go to the remote store when a user is signed in and fall back to the
//! cache on error. Writes always land in the cache first, then in the remote
//! store if signed in; a failed remote write never undoes the local one.
//! There is no conflict detection: whichever write lands last wins.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::cache::LogCache;
use crate::calendar::{aggregate_local, aggregate_remote};
use crate::models::{
    DailyLog, DayFlag, Exercise, Macros, Meal, MealSlot, NewExercise, NewMeal, clean_goals,
    parse_date_key, unique_entry_id, validate_entry_name,
};
use crate::remote::{DailyRow, LogRow, LogTable, RemoteStore, SaveOutcome, StoreError};

/// A remote store bound to the signed-in user.
pub struct Remote<R> {
    pub store: R,
    pub user_id: String,
}

impl<R> Remote<R> {
    pub fn new(store: R, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Remove a table's remote row when its list is saved empty. Off by
    /// default: an empty list skips the upsert and the old row stays.
    pub clear_remote_on_empty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Remote,
    Local,
    LocalFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// A dismissable, non-fatal message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn warning(message: String) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message,
        }
    }

    fn error(message: String) -> Self {
        Self {
            level: NoticeLevel::Error,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub log: DailyLog,
    pub source: Source,
    pub notice: Option<Notice>,
    /// The remote store holds a daily-fields row for this date.
    pub daily_row: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteSave {
    Skipped,
    Saved(SaveOutcome),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveReport {
    pub local_saved: bool,
    pub remote: RemoteSave,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarView {
    pub days: BTreeMap<String, DayFlag>,
    pub source: Source,
    pub notice: Option<Notice>,
}

pub struct Reconciler<C, R> {
    cache: C,
    remote: Option<Remote<R>>,
    policy: ReconcilePolicy,
}

impl<C: LogCache, R: RemoteStore> Reconciler<C, R> {
    pub fn new(cache: C, remote: Option<Remote<R>>) -> Self {
        Self {
            cache,
            remote,
            policy: ReconcilePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.remote.as_ref().map(|r| r.user_id.as_str())
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn session(&self, mode: SaveMode) -> DailyLogSession<'_, C, R> {
        DailyLogSession::new(self, mode)
    }

    pub async fn fetch(&self, date: &str) -> Fetched {
        let Some(remote) = &self.remote else {
            return Fetched {
                log: self.cache.get(date),
                source: Source::Local,
                notice: None,
                daily_row: false,
            };
        };

        match Self::fetch_remote(remote, date).await {
            Ok((log, daily_row)) => Fetched {
                log,
                source: Source::Remote,
                notice: None,
                daily_row,
            },
            Err(err) => {
                warn!(date, user_id = %remote.user_id, "remote fetch failed, using local cache: {err}");
                Fetched {
                    log: self.cache.get(date),
                    source: Source::LocalFallback,
                    notice: Some(Notice::warning(format!(
                        "Could not load {date} from the server ({err}); showing local data"
                    ))),
                    daily_row: false,
                }
            }
        }
    }

    async fn fetch_remote(remote: &Remote<R>, date: &str) -> Result<(DailyLog, bool), StoreError> {
        let fetched = remote.store.fetch(&remote.user_id, date).await?;
        let structured = remote.store.fetch_daily(&remote.user_id, date).await?;
        let mut log = DailyLog {
            exercises: fetched.exercises,
            meals: fetched.meals,
            ..DailyLog::default()
        };
        let daily_row = structured.is_some();
        if let Some(structured) = structured {
            log.apply_structured(structured);
        }
        Ok((log, daily_row))
    }

    /// Save `log` locally, then remotely when signed in. The daily-fields
    /// row is written only when the record carries daily fields or
    /// exercises.
    pub async fn save(&self, date: &str, log: &DailyLog) -> SaveReport {
        self.save_tracked(date, log, false).await
    }

    /// Like [`Reconciler::save`], but `daily_row` forces the daily-fields
    /// row to be written, so fields cleared since the last save reach the
    /// remote store instead of coming back on the next fetch.
    pub async fn save_tracked(&self, date: &str, log: &DailyLog, daily_row: bool) -> SaveReport {
        let local_saved = match self.cache.set(date, log) {
            Ok(()) => true,
            Err(err) => {
                error!(date, "failed to write local cache: {err:#}");
                false
            }
        };

        let Some(remote) = &self.remote else {
            return SaveReport {
                local_saved,
                remote: RemoteSave::Skipped,
                notice: None,
            };
        };

        match self.save_remote(remote, date, log, daily_row).await {
            Ok(outcome) => {
                debug!(date, ?outcome, "remote save complete");
                SaveReport {
                    local_saved,
                    remote: RemoteSave::Saved(outcome),
                    notice: None,
                }
            }
            Err(err) => {
                warn!(date, user_id = %remote.user_id, "remote save failed: {err}");
                SaveReport {
                    local_saved,
                    remote: RemoteSave::Failed,
                    notice: Some(Notice::error(format!(
                        "Saved {date} locally, but the server save failed: {err}"
                    ))),
                }
            }
        }
    }

    async fn save_remote(
        &self,
        remote: &Remote<R>,
        date: &str,
        log: &DailyLog,
        daily_row: bool,
    ) -> Result<SaveOutcome, StoreError> {
        let user_id = remote.user_id.as_str();
        let outcome = remote
            .store
            .save(user_id, date, &log.exercises, &log.meals)
            .await?;

        let clear = self.policy.clear_remote_on_empty;
        if clear && log.exercises.is_empty() {
            remote.store.clear(user_id, date, LogTable::Workout).await?;
        }
        if clear && log.meals.is_empty() {
            remote.store.clear(user_id, date, LogTable::Diet).await?;
        }

        if daily_row || clear || log.has_structured_fields() || !log.exercises.is_empty() {
            remote
                .store
                .save_daily(user_id, date, &log.to_structured())
                .await?;
        }
        Ok(outcome)
    }

    /// Day flags for every date with activity, from the remote history when
    /// signed in and from the cache otherwise.
    pub async fn calendar(&self) -> CalendarView {
        let Some(remote) = &self.remote else {
            return CalendarView {
                days: aggregate_local(&self.cache.all()),
                source: Source::Local,
                notice: None,
            };
        };

        match Self::fetch_history(remote).await {
            Ok((rows, daily)) => CalendarView {
                days: aggregate_remote(&rows, &daily),
                source: Source::Remote,
                notice: None,
            },
            Err(err) => {
                warn!(user_id = %remote.user_id, "remote history fetch failed, using local cache: {err}");
                CalendarView {
                    days: aggregate_local(&self.cache.all()),
                    source: Source::LocalFallback,
                    notice: Some(Notice::warning(format!(
                        "Could not load history from the server ({err}); showing local data"
                    ))),
                }
            }
        }
    }

    async fn fetch_history(remote: &Remote<R>) -> Result<(Vec<LogRow>, Vec<DailyRow>), StoreError> {
        let rows = remote.store.fetch_all(&remote.user_id).await?;
        let daily = remote.store.fetch_all_daily(&remote.user_id).await?;
        Ok((rows, daily))
    }
}

// --- Session ---

/// When mutations reach storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveMode {
    /// Every mutation saves the whole record.
    #[default]
    Immediate,
    /// Adds and edits wait for [`DailyLogSession::save`]; deletes still save
    /// right away.
    Batched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Saving,
}

/// Editing state for one open date.
pub struct DailyLogSession<'r, C, R> {
    reconciler: &'r Reconciler<C, R>,
    mode: SaveMode,
    phase: Phase,
    date: Option<String>,
    source: Option<Source>,
    log: DailyLog,
    daily_row: bool,
    dirty: bool,
    last_save: Option<SaveReport>,
    notices: Vec<Notice>,
}

impl<'r, C: LogCache, R: RemoteStore> DailyLogSession<'r, C, R> {
    fn new(reconciler: &'r Reconciler<C, R>, mode: SaveMode) -> Self {
        Self {
            reconciler,
            mode,
            phase: Phase::Idle,
            date: None,
            source: None,
            log: DailyLog::default(),
            daily_row: false,
            dirty: false,
            last_save: None,
            notices: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn source(&self) -> Option<Source> {
        self.source
    }

    pub fn log(&self) -> &DailyLog {
        &self.log
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_save(&self) -> Option<&SaveReport> {
        self.last_save.as_ref()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub async fn open(&mut self, date: &str) -> Result<Source> {
        parse_date_key(date)?;
        self.phase = Phase::Loading;
        let fetched = self.reconciler.fetch(date).await;
        self.date = Some(date.to_string());
        self.source = Some(fetched.source);
        self.log = fetched.log;
        self.daily_row = fetched.daily_row;
        self.dirty = false;
        self.last_save = None;
        self.notices.extend(fetched.notice);
        self.phase = Phase::Ready;
        Ok(fetched.source)
    }

    /// Drop the in-memory record without writing anything.
    pub fn close(&mut self) {
        self.phase = Phase::Idle;
        self.date = None;
        self.source = None;
        self.log = DailyLog::default();
        self.daily_row = false;
        self.dirty = false;
        self.last_save = None;
        self.notices.clear();
    }

    pub async fn save(&mut self) -> Result<SaveReport> {
        let date = self.open_date()?;
        self.phase = Phase::Saving;
        let report = self
            .reconciler
            .save_tracked(&date, &self.log, self.daily_row)
            .await;
        self.phase = Phase::Ready;
        self.dirty = false;
        self.notices.extend(report.notice.clone());
        self.last_save = Some(report.clone());
        Ok(report)
    }

    fn open_date(&self) -> Result<String> {
        match (&self.date, self.phase) {
            (Some(date), Phase::Ready) => Ok(date.clone()),
            _ => bail!("No daily log is open"),
        }
    }

    async fn changed(&mut self, force_save: bool) -> Result<()> {
        if force_save || self.mode == SaveMode::Immediate {
            self.save().await?;
        } else {
            self.dirty = true;
        }
        Ok(())
    }

    // --- Exercises ---

    /// Returns `None` without touching anything when the name is blank.
    pub async fn add_exercise(&mut self, new: NewExercise) -> Result<Option<Exercise>> {
        self.open_date()?;
        let Ok(name) = validate_entry_name(&new.name) else {
            debug!("ignoring exercise with empty name");
            return Ok(None);
        };
        let id = unique_entry_id(self.log.exercises.iter().map(|e| e.id.as_str()));
        let exercise = NewExercise { name, ..new }.into_exercise(id);
        self.log.exercises.push(exercise.clone());
        self.changed(false).await?;
        Ok(Some(exercise))
    }

    /// Replace the exercise with `id`. `None` for a blank name or unknown id.
    pub async fn update_exercise(&mut self, id: &str, new: NewExercise) -> Result<Option<Exercise>> {
        self.open_date()?;
        let Ok(name) = validate_entry_name(&new.name) else {
            return Ok(None);
        };
        let Some(slot) = self.log.exercises.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        *slot = NewExercise { name, ..new }.into_exercise(id.to_string());
        let updated = slot.clone();
        self.changed(false).await?;
        Ok(Some(updated))
    }

    pub async fn delete_exercise(&mut self, id: &str) -> Result<bool> {
        self.open_date()?;
        let before = self.log.exercises.len();
        self.log.exercises.retain(|e| e.id != id);
        if self.log.exercises.len() == before {
            return Ok(false);
        }
        self.changed(true).await?;
        Ok(true)
    }

    // --- Meals ---

    pub async fn add_meal(&mut self, new: NewMeal) -> Result<Option<Meal>> {
        self.open_date()?;
        let Ok(name) = validate_entry_name(&new.name) else {
            debug!("ignoring meal with empty name");
            return Ok(None);
        };
        let id = unique_entry_id(self.log.meals.iter().map(|m| m.id.as_str()));
        let meal = NewMeal { name, ..new }.into_meal(id);
        self.log.meals.push(meal.clone());
        self.changed(false).await?;
        Ok(Some(meal))
    }

    pub async fn update_meal(&mut self, id: &str, new: NewMeal) -> Result<Option<Meal>> {
        self.open_date()?;
        let Ok(name) = validate_entry_name(&new.name) else {
            return Ok(None);
        };
        let Some(slot) = self.log.meals.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        *slot = NewMeal { name, ..new }.into_meal(id.to_string());
        let updated = slot.clone();
        self.changed(false).await?;
        Ok(Some(updated))
    }

    pub async fn delete_meal(&mut self, id: &str) -> Result<bool> {
        self.open_date()?;
        let before = self.log.meals.len();
        self.log.meals.retain(|m| m.id != id);
        if self.log.meals.len() == before {
            return Ok(false);
        }
        self.changed(true).await?;
        Ok(true)
    }

    // --- Daily fields ---

    /// Apply `edit` to the structured fields of the open record.
    pub async fn edit_daily(&mut self, edit: impl FnOnce(&mut DailyLog)) -> Result<()> {
        self.open_date()?;
        edit(&mut self.log);
        self.daily_row = true;
        self.changed(false).await
    }

    pub async fn set_goals(&mut self, goals: Vec<String>) -> Result<()> {
        let goals = clean_goals(goals);
        self.edit_daily(|log| log.goals = goals).await
    }

    pub async fn set_water_intake(&mut self, liters: Option<f64>) -> Result<()> {
        self.edit_daily(|log| log.water_intake = liters).await
    }

    pub async fn set_steps(&mut self, steps: Option<i64>) -> Result<()> {
        self.edit_daily(|log| log.steps = steps).await
    }

    pub async fn set_weight(&mut self, weight: Option<f64>) -> Result<()> {
        self.edit_daily(|log| log.weight = weight).await
    }

    pub async fn set_meal_note(&mut self, slot: MealSlot, note: String) -> Result<()> {
        self.edit_daily(|log| log.meal_notes.set(slot, note)).await
    }

    pub async fn set_macros(&mut self, macros: Macros) -> Result<()> {
        self.edit_daily(|log| log.macros = macros).await
    }
}
