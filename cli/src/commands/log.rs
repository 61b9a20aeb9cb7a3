use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use fitlog_core::models::{DailyLog, MealSlot};
use fitlog_core::reconciler::Source;

use super::helpers::{parse_date, print_exercise_table, print_meal_table};
use super::{build_reconciler, open_session};

#[derive(Serialize)]
pub(super) struct LogView<'a> {
    pub(super) date: &'a str,
    pub(super) source: Option<Source>,
    pub(super) log: &'a DailyLog,
}

pub(crate) async fn cmd_log_show(config: &Config, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let reconciler = build_reconciler(config)?;
    let session = open_session(&reconciler, config, &date).await?;
    let log = session.log();

    if json {
        let view = LogView {
            date: &date,
            source: session.source(),
            log,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("=== {date} ===\n");
    if log.is_empty() {
        println!("  Nothing logged.");
        return Ok(());
    }

    if !log.exercises.is_empty() {
        println!("  EXERCISES");
        print_exercise_table(&log.exercises);
        println!();
    }
    if !log.meals.is_empty() {
        println!("  MEALS");
        print_meal_table(&log.meals);
        println!();
    }
    if log.has_structured_fields() {
        print_daily_fields(log);
    }
    Ok(())
}

pub(super) fn print_daily_fields(log: &DailyLog) {
    println!("  DAILY");
    if !log.goals.is_empty() {
        println!("    Goals: {}", log.goals.join(", "));
    }
    if let Some(water) = log.water_intake {
        println!("    Water: {water} L");
    }
    if let Some(steps) = log.steps {
        println!("    Steps: {steps}");
    }
    if let Some(weight) = log.weight {
        println!("    Weight: {weight}");
    }
    for slot in MealSlot::ALL {
        let note = log.meal_notes.get(slot);
        if !note.is_empty() {
            let label = slot.as_str();
            println!("    {label}: {note}");
        }
    }
    let m = &log.macros;
    if !m.is_empty() {
        let fmt = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{v:.0}"));
        println!(
            "    Macros: {} kcal | P:{}g C:{}g F:{}g",
            fmt(m.calories),
            fmt(m.protein),
            fmt(m.carbs),
            fmt(m.fat)
        );
    }
}
