use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Datelike;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::config::Config;
use fitlog_core::calendar::month_grid;
use fitlog_core::models::{DayFlag, date_key};
use fitlog_core::reconciler::Source;

use super::build_reconciler;
use super::helpers::{parse_month, print_notices};

#[derive(Tabled)]
struct WeekRow {
    #[tabled(rename = "Mon")]
    mon: String,
    #[tabled(rename = "Tue")]
    tue: String,
    #[tabled(rename = "Wed")]
    wed: String,
    #[tabled(rename = "Thu")]
    thu: String,
    #[tabled(rename = "Fri")]
    fri: String,
    #[tabled(rename = "Sat")]
    sat: String,
    #[tabled(rename = "Sun")]
    sun: String,
}

#[derive(Serialize)]
struct MonthView<'a> {
    month: String,
    source: Source,
    days: BTreeMap<&'a str, &'a DayFlag>,
}

/// Day number followed by `W` for a workout and `D` for a diet entry.
fn cell(day: u32, flag: Option<&DayFlag>) -> String {
    let mut out = day.to_string();
    if let Some(flag) = flag {
        if flag.workout || flag.diet {
            out.push(' ');
        }
        if flag.workout {
            out.push('W');
        }
        if flag.diet {
            out.push('D');
        }
    }
    out
}

fn render_month(year: i32, month: u32, days: &BTreeMap<String, DayFlag>) -> Vec<WeekRow> {
    month_grid(year, month)
        .into_iter()
        .map(|week| {
            let [mon, tue, wed, thu, fri, sat, sun] = week.map(|slot| {
                slot.map(|d| cell(d.day(), days.get(&date_key(d))))
                    .unwrap_or_default()
            });
            WeekRow {
                mon,
                tue,
                wed,
                thu,
                fri,
                sat,
                sun,
            }
        })
        .collect()
}

pub(crate) async fn cmd_calendar(config: &Config, month: Option<&str>, json: bool) -> Result<()> {
    let (year, month) = parse_month(month)?;
    let reconciler = build_reconciler(config)?;
    let view = reconciler.calendar().await;
    print_notices(view.notice.into_iter().collect());

    let prefix = format!("{year:04}-{month:02}-");
    let in_month: BTreeMap<&str, &DayFlag> = view
        .days
        .iter()
        .filter(|(date, _)| date.starts_with(&prefix))
        .map(|(date, flag)| (date.as_str(), flag))
        .collect();

    if json {
        let out = MonthView {
            month: format!("{year:04}-{month:02}"),
            source: view.source,
            days: in_month,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let rows = render_month(year, month, &view.days);
    println!("=== {year:04}-{month:02} ===");
    println!("{}", Table::new(&rows).with(Style::rounded()));

    let workouts = in_month.values().filter(|f| f.workout).count();
    let diets = in_month.values().filter(|f| f.diet).count();
    println!("  {workouts} workout days, {diets} diet days (W = workout, D = diet)");

    let mut groups: Vec<&str> = in_month
        .values()
        .flat_map(|f| f.muscle_groups.iter().map(String::as_str))
        .collect();
    groups.sort_unstable();
    groups.dedup();
    if !groups.is_empty() {
        println!("  Muscle groups: {}", groups.join(", "));
    }
    Ok(())
}
