use std::process;

use anyhow::Result;
use clap::Args;

use crate::config::Config;
use fitlog_core::models::{Meal, NewMeal};

use super::helpers::{parse_date, report_not_found};
use super::{build_reconciler, finish_session, open_session};

#[derive(Args, Debug, Default)]
pub(crate) struct MealFields {
    /// Calories (free text, e.g. "450")
    #[arg(long)]
    pub(crate) calories: Option<String>,
    /// Protein in grams (free text)
    #[arg(long)]
    pub(crate) protein: Option<String>,
    /// Free-form notes
    #[arg(long)]
    pub(crate) notes: Option<String>,
}

impl MealFields {
    fn apply(self, name: String, base: &Meal) -> NewMeal {
        NewMeal {
            name,
            calories: self.calories.unwrap_or_else(|| base.calories.clone()),
            protein: self.protein.unwrap_or_else(|| base.protein.clone()),
            notes: self.notes.unwrap_or_else(|| base.notes.clone()),
        }
    }
}

fn describe(m: &Meal) -> String {
    if m.calories.is_empty() {
        m.name.clone()
    } else {
        format!("{} ({} kcal)", m.name, m.calories)
    }
}

pub(crate) async fn cmd_meal_add(
    config: &Config,
    name: String,
    fields: MealFields,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let reconciler = build_reconciler(config)?;
    let mut session = open_session(&reconciler, config, &date).await?;

    let added = session
        .add_meal(fields.apply(name, &Meal::default()))
        .await?;
    finish_session(&mut session).await?;

    let Some(meal) = added else {
        return Ok(());
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        let id = &meal.id;
        println!("Logged {} on {date} [{id}]", describe(&meal));
    }
    Ok(())
}

pub(crate) async fn cmd_meal_update(
    config: &Config,
    id: &str,
    name: Option<String>,
    fields: MealFields,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let reconciler = build_reconciler(config)?;
    let mut session = open_session(&reconciler, config, &date).await?;

    let Some(existing) = session.log().meals.iter().find(|m| m.id == id).cloned() else {
        report_not_found("Meal", id, json);
        process::exit(2);
    };
    let name = name.unwrap_or_else(|| existing.name.clone());
    let updated = session.update_meal(id, fields.apply(name, &existing)).await?;
    finish_session(&mut session).await?;

    let Some(meal) = updated else {
        return Ok(());
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!("Updated meal {id}: {}", describe(&meal));
    }
    Ok(())
}

pub(crate) async fn cmd_meal_delete(
    config: &Config,
    id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let reconciler = build_reconciler(config)?;
    let mut session = open_session(&reconciler, config, &date).await?;

    let deleted = session.delete_meal(id).await?;
    finish_session(&mut session).await?;

    if !deleted {
        report_not_found("Meal", id, json);
        process::exit(2);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id, "date": date }));
    } else {
        println!("Deleted meal {id} from {date}");
    }
    Ok(())
}
