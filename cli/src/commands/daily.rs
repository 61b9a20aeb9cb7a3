use anyhow::{Context, Result, bail};
use clap::Args;

use crate::config::Config;
use fitlog_core::models::{DailyLog, Macros, MealSlot, clean_goals, validate_meal_slot};

use super::helpers::parse_date;
use super::log::{LogView, print_daily_fields};
use super::{build_reconciler, finish_session, open_session};

#[derive(Args, Debug, Default)]
pub(crate) struct DailyFields {
    /// Add a goal for the day (repeatable)
    #[arg(long = "goal", value_name = "TEXT")]
    pub(crate) goals: Vec<String>,
    /// Remove existing goals before adding new ones
    #[arg(long)]
    pub(crate) clear_goals: bool,
    /// Water intake in liters
    #[arg(long)]
    pub(crate) water: Option<f64>,
    /// Step count
    #[arg(long)]
    pub(crate) steps: Option<i64>,
    /// Body weight
    #[arg(long)]
    pub(crate) weight: Option<f64>,
    /// Meal note as SLOT:TEXT, slot is breakfast, lunch, dinner or snacks (repeatable)
    #[arg(long = "note", value_name = "SLOT:TEXT")]
    pub(crate) notes: Vec<String>,
    /// Calorie total for the day
    #[arg(long)]
    pub(crate) calories: Option<f64>,
    /// Protein total in grams
    #[arg(long)]
    pub(crate) protein: Option<f64>,
    /// Carbohydrate total in grams
    #[arg(long)]
    pub(crate) carbs: Option<f64>,
    /// Fat total in grams
    #[arg(long)]
    pub(crate) fat: Option<f64>,
}

impl DailyFields {
    fn is_empty(&self) -> bool {
        self.goals.is_empty()
            && !self.clear_goals
            && self.water.is_none()
            && self.steps.is_none()
            && self.weight.is_none()
            && self.notes.is_empty()
            && self.calories.is_none()
            && self.protein.is_none()
            && self.carbs.is_none()
            && self.fat.is_none()
    }

    /// Write every given field into `log` in one pass.
    fn apply(&self, log: &mut DailyLog, notes: Vec<(MealSlot, String)>) {
        if self.clear_goals {
            log.goals.clear();
        }
        log.goals.extend(self.goals.iter().cloned());
        log.goals = clean_goals(std::mem::take(&mut log.goals));
        if self.water.is_some() {
            log.water_intake = self.water;
        }
        if self.steps.is_some() {
            log.steps = self.steps;
        }
        if self.weight.is_some() {
            log.weight = self.weight;
        }
        for (slot, text) in notes {
            log.meal_notes.set(slot, text);
        }
        log.macros = self.macros_over(log.macros);
    }

    fn macros_over(&self, base: Macros) -> Macros {
        Macros {
            calories: self.calories.or(base.calories),
            protein: self.protein.or(base.protein),
            carbs: self.carbs.or(base.carbs),
            fat: self.fat.or(base.fat),
        }
    }
}

fn parse_note(raw: &str) -> Result<(MealSlot, String)> {
    let (slot, text) = raw
        .split_once(':')
        .with_context(|| format!("Invalid note '{raw}'. Use SLOT:TEXT (e.g. 'lunch:salad')"))?;
    Ok((validate_meal_slot(slot)?, text.trim().to_string()))
}

fn check_non_negative(name: &str, value: Option<f64>) -> Result<()> {
    if value.is_some_and(|v| v < 0.0 || !v.is_finite()) {
        bail!("{name} must be a non-negative number");
    }
    Ok(())
}

pub(crate) async fn cmd_daily_set(
    config: &Config,
    fields: DailyFields,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    if fields.is_empty() {
        bail!("Nothing to set. Provide at least one of --goal, --water, --steps, --weight, --note or a macro");
    }
    check_non_negative("--water", fields.water)?;
    check_non_negative("--weight", fields.weight)?;
    if fields.steps.is_some_and(|s| s < 0) {
        bail!("--steps must be a non-negative number");
    }
    let notes = fields
        .notes
        .iter()
        .map(|n| parse_note(n))
        .collect::<Result<Vec<_>>>()?;

    let date = parse_date(date)?;
    let reconciler = build_reconciler(config)?;
    let mut session = open_session(&reconciler, config, &date).await?;

    session.edit_daily(|log| fields.apply(log, notes)).await?;
    finish_session(&mut session).await?;

    if json {
        let view = LogView {
            date: &date,
            source: session.source(),
            log: session.log(),
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("Updated {date}");
        print_daily_fields(session.log());
    }
    Ok(())
}

pub(crate) async fn cmd_daily_show(config: &Config, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let reconciler = build_reconciler(config)?;
    let session = open_session(&reconciler, config, &date).await?;
    let log = session.log();

    if json {
        let daily = log.to_structured();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "date": date, "daily": daily }))?
        );
        return Ok(());
    }

    println!("=== {date} ===\n");
    if log.has_structured_fields() {
        print_daily_fields(log);
    } else {
        println!("  No daily fields set.");
    }
    Ok(())
}
