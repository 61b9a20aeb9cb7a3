use anyhow::{Context, Result, bail};
use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fitlog_core::models::{Exercise, Meal, date_key};
use fitlog_core::reconciler::{Notice, NoticeLevel};

/// Resolve a date argument to a `YYYY-MM-DD` key. Defaults to today.
pub(crate) fn parse_date(date_str: Option<String>) -> Result<String> {
    let today = Local::now().date_naive();
    let date = match date_str.as_deref() {
        None | Some("today") => today,
        Some("yesterday") => today - chrono::Duration::days(1),
        Some("tomorrow") => today + chrono::Duration::days(1),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| {
            format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
        })?,
    };
    Ok(date_key(date))
}

/// Parse `YYYY-MM`, defaulting to the current month.
pub(crate) fn parse_month(month: Option<&str>) -> Result<(i32, u32)> {
    let Some(s) = month else {
        let today = Local::now().date_naive();
        return Ok((today.year(), today.month()));
    };
    let first = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{s}'. Use YYYY-MM"))?;
    Ok((first.year(), first.month()))
}

/// Print notices to stderr. They never fail the command.
pub(crate) fn print_notices(notices: Vec<Notice>) {
    for notice in notices {
        match notice.level {
            NoticeLevel::Warning => eprintln!("Warning: {}", notice.message),
            NoticeLevel::Error => eprintln!("Error: {}", notice.message),
        }
    }
}

pub(crate) fn print_exercise_table(exercises: &[Exercise]) {
    #[derive(Tabled)]
    struct ExerciseRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Exercise")]
        name: String,
        #[tabled(rename = "Sets")]
        sets: String,
        #[tabled(rename = "Reps")]
        reps: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "Muscle group")]
        muscle_group: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<ExerciseRow> = exercises
        .iter()
        .map(|e| ExerciseRow {
            id: e.id.clone(),
            name: truncate(&e.name, 30),
            sets: dash_if_empty(&e.sets),
            reps: dash_if_empty(&e.reps),
            weight: dash_if_empty(&e.weight),
            muscle_group: dash_if_empty(&e.muscle_group),
            notes: truncate(&e.notes, 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_meal_table(meals: &[Meal]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Meal")]
        name: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            id: m.id.clone(),
            name: truncate(&m.name, 30),
            calories: dash_if_empty(&m.calories),
            protein: dash_if_empty(&m.protein),
            notes: truncate(&m.notes, 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Report a missing entry on the channel matching the output mode.
pub(crate) fn report_not_found(kind: &str, id: &str, json: bool) {
    let message = format!("{kind} {id} not found");
    if json {
        println!("{}", json_error(&message));
    } else {
        eprintln!("{message}");
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

fn dash_if_empty(s: &str) -> String {
    if s.trim().is_empty() {
        "-".to_string()
    } else {
        s.to_string()
    }
}

pub(crate) fn require_non_empty(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{what} must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), date_key(today));
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), date_key(today));
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            date_key(today - chrono::Duration::days(1))
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            date_key(today + chrono::Duration::days(1))
        );
    }

    #[test]
    fn test_parse_date_iso() {
        assert_eq!(
            parse_date(Some("2025-03-01".to_string())).unwrap(),
            "2025-03-01"
        );
        assert!(parse_date(Some("03/01/2025".to_string())).is_err());
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month(Some("2025-03")).unwrap(), (2025, 3));
        assert!(parse_month(Some("2025-13")).is_err());
        assert!(parse_month(Some("March")).is_err());
        let today = Local::now().date_naive();
        assert_eq!(parse_month(None).unwrap(), (today.year(), today.month()));
    }

    #[test]
    fn test_json_error_escapes() {
        let json: serde_json::Value =
            serde_json::from_str(&json_error("bad \"input\"")).unwrap();
        assert_eq!(json["error"], "bad \"input\"");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Squat", 10), "Squat");
        assert_eq!(truncate("Romanian deadlift", 10), "Romania...");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }

    #[test]
    fn test_dash_if_empty() {
        assert_eq!(dash_if_empty(""), "-");
        assert_eq!(dash_if_empty("  "), "-");
        assert_eq!(dash_if_empty("3"), "3");
    }
}
