//! Per-day activity flags for rendering a month.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDate};
use serde_json::Value;

use crate::decode::{decode_exercises, entry_count, has_entries};
use crate::models::{DailyLog, DayFlag};
use crate::remote::{DailyRow, LogRow};

/// Flags from a bulk remote fetch.
///
/// `workout` is set iff the exercises payload has entries, `diet` likewise for
/// meals. Payloads may be arrays or legacy id-keyed objects. Muscle groups come
/// from the structured rows and from any exercise carrying one.
#[must_use]
pub fn aggregate_remote(rows: &[LogRow], daily: &[DailyRow]) -> BTreeMap<String, DayFlag> {
    let mut flags: BTreeMap<String, DayFlag> = BTreeMap::new();

    for row in rows {
        let flag = flags.entry(row.date.clone()).or_default();
        flag.workout |= has_entries(&row.exercises);
        flag.diet |= has_entries(&row.meals);
        flag.exercise_count += entry_count(&row.exercises);
        let groups = exercise_muscle_groups(&row.exercises);
        merge_groups(&mut flag.muscle_groups, groups);
    }

    // Structured rows only contribute muscle groups; activity comes from
    // the payloads.
    for row in daily {
        if row.log.muscle_groups.is_empty() {
            continue;
        }
        let flag = flags.entry(row.date.clone()).or_default();
        merge_groups(&mut flag.muscle_groups, row.log.muscle_groups.iter().cloned());
    }

    flags
}

/// Flags from the local cache blob. Dates with an empty record are omitted.
#[must_use]
pub fn aggregate_local(logs: &BTreeMap<String, DailyLog>) -> BTreeMap<String, DayFlag> {
    logs.iter()
        .filter(|(_, log)| !log.exercises.is_empty() || !log.meals.is_empty())
        .map(|(date, log)| {
            let mut muscle_groups = Vec::new();
            merge_groups(
                &mut muscle_groups,
                log.exercises.iter().map(|e| e.muscle_group.clone()),
            );
            (
                date.clone(),
                DayFlag {
                    workout: !log.exercises.is_empty(),
                    diet: !log.meals.is_empty(),
                    muscle_groups,
                    exercise_count: log.exercises.len(),
                },
            )
        })
        .collect()
}

fn exercise_muscle_groups(payload: &Value) -> Vec<String> {
    decode_exercises(payload)
        .into_iter()
        .map(|e| e.muscle_group)
        .collect()
}

fn merge_groups(into: &mut Vec<String>, groups: impl IntoIterator<Item = String>) {
    let mut seen: HashSet<String> = into.iter().map(|g| g.to_lowercase()).collect();
    for group in groups {
        let group = group.trim();
        if !group.is_empty() && seen.insert(group.to_lowercase()) {
            into.push(group.to_string());
        }
    }
}

/// Monday-first weeks covering `month`; cells outside the month are `None`.
/// Returns an empty grid for an invalid year/month.
#[must_use]
pub fn month_grid(year: i32, month: u32) -> Vec<[Option<NaiveDate>; 7]> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };

    let mut weeks = Vec::new();
    let mut week = [None; 7];
    let mut day = first;
    while day.month() == month {
        let col = day.weekday().num_days_from_monday() as usize;
        week[col] = Some(day);
        if col == 6 {
            weeks.push(week);
            week = [None; 7];
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    if week.iter().any(Option::is_some) {
        weeks.push(week);
    }
    weeks
}
