use std::process;

use anyhow::Result;
use clap::Args;

use crate::config::Config;
use fitlog_core::models::{Exercise, NewExercise};

use super::helpers::{parse_date, report_not_found};
use super::{build_reconciler, finish_session, open_session};

#[derive(Args, Debug, Default)]
pub(crate) struct ExerciseFields {
    /// Number of sets (free text, e.g. "3")
    #[arg(long)]
    pub(crate) sets: Option<String>,
    /// Reps per set (free text, e.g. "8-10")
    #[arg(long)]
    pub(crate) reps: Option<String>,
    /// Load used (free text, e.g. "60kg")
    #[arg(long)]
    pub(crate) weight: Option<String>,
    /// Muscle group worked (e.g. legs, back)
    #[arg(long)]
    pub(crate) muscle_group: Option<String>,
    /// Free-form notes
    #[arg(long)]
    pub(crate) notes: Option<String>,
}

impl ExerciseFields {
    /// Overlay the given fields on `base`, keeping `base` where unset.
    fn apply(self, name: String, base: &Exercise) -> NewExercise {
        NewExercise {
            name,
            sets: self.sets.unwrap_or_else(|| base.sets.clone()),
            reps: self.reps.unwrap_or_else(|| base.reps.clone()),
            notes: self.notes.unwrap_or_else(|| base.notes.clone()),
            muscle_group: self.muscle_group.unwrap_or_else(|| base.muscle_group.clone()),
            weight: self.weight.unwrap_or_else(|| base.weight.clone()),
        }
    }
}

fn describe(e: &Exercise) -> String {
    match (e.sets.as_str(), e.reps.as_str()) {
        ("", "") => e.name.clone(),
        (sets, "") => format!("{} {sets} sets", e.name),
        ("", reps) => format!("{} {reps} reps", e.name),
        (sets, reps) => format!("{} {sets}x{reps}", e.name),
    }
}

pub(crate) async fn cmd_exercise_add(
    config: &Config,
    name: String,
    fields: ExerciseFields,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let reconciler = build_reconciler(config)?;
    let mut session = open_session(&reconciler, config, &date).await?;

    let new = fields.apply(name, &Exercise::default());
    let added = session.add_exercise(new).await?;
    finish_session(&mut session).await?;

    // A blank name adds nothing and prints nothing.
    let Some(exercise) = added else {
        return Ok(());
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&exercise)?);
    } else {
        let id = &exercise.id;
        println!("Logged {} on {date} [{id}]", describe(&exercise));
    }
    Ok(())
}

pub(crate) async fn cmd_exercise_update(
    config: &Config,
    id: &str,
    name: Option<String>,
    fields: ExerciseFields,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let reconciler = build_reconciler(config)?;
    let mut session = open_session(&reconciler, config, &date).await?;

    let Some(existing) = session.log().exercises.iter().find(|e| e.id == id).cloned() else {
        report_not_found("Exercise", id, json);
        process::exit(2);
    };
    let name = name.unwrap_or_else(|| existing.name.clone());
    let updated = session
        .update_exercise(id, fields.apply(name, &existing))
        .await?;
    finish_session(&mut session).await?;

    let Some(exercise) = updated else {
        return Ok(());
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&exercise)?);
    } else {
        println!("Updated exercise {id}: {}", describe(&exercise));
    }
    Ok(())
}

pub(crate) async fn cmd_exercise_delete(
    config: &Config,
    id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let reconciler = build_reconciler(config)?;
    let mut session = open_session(&reconciler, config, &date).await?;

    let deleted = session.delete_exercise(id).await?;
    finish_session(&mut session).await?;

    if !deleted {
        report_not_found("Exercise", id, json);
        process::exit(2);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id, "date": date }));
    } else {
        println!("Deleted exercise {id} from {date}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_unset_fields() {
        let base = Exercise {
            id: "1".to_string(),
            name: "Squat".to_string(),
            sets: "3".to_string(),
            reps: "10".to_string(),
            weight: "60kg".to_string(),
            ..Exercise::default()
        };
        let fields = ExerciseFields {
            reps: Some("8".to_string()),
            ..ExerciseFields::default()
        };
        let new = fields.apply("Squat".to_string(), &base);
        assert_eq!(new.sets, "3");
        assert_eq!(new.reps, "8");
        assert_eq!(new.weight, "60kg");
    }

    #[test]
    fn test_describe() {
        let mut e = Exercise {
            name: "Squat".to_string(),
            ..Exercise::default()
        };
        assert_eq!(describe(&e), "Squat");
        e.sets = "3".to_string();
        e.reps = "10".to_string();
        assert_eq!(describe(&e), "Squat 3x10");
    }
}
