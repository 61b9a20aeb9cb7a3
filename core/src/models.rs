use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sets: String,
    #[serde(default)]
    pub reps: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub muscle_group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub weight: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub calories: String,
    #[serde(default)]
    pub protein: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewExercise {
    pub name: String,
    pub sets: String,
    pub reps: String,
    pub notes: String,
    pub muscle_group: String,
    pub weight: String,
}

impl NewExercise {
    #[must_use]
    pub fn into_exercise(self, id: String) -> Exercise {
        Exercise {
            id,
            name: self.name,
            sets: self.sets,
            reps: self.reps,
            notes: self.notes,
            muscle_group: self.muscle_group,
            weight: self.weight,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewMeal {
    pub name: String,
    pub calories: String,
    pub protein: String,
    pub notes: String,
}

impl NewMeal {
    #[must_use]
    pub fn into_meal(self, id: String) -> Meal {
        Meal {
            id,
            name: self.name,
            calories: self.calories,
            protein: self.protein,
            notes: self.notes,
        }
    }
}

/// Free-text notes per meal slot of the structured daily record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealNotes {
    #[serde(default)]
    pub breakfast: String,
    #[serde(default)]
    pub lunch: String,
    #[serde(default)]
    pub dinner: String,
    #[serde(default)]
    pub snacks: String,
}

impl MealNotes {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakfast.is_empty()
            && self.lunch.is_empty()
            && self.dinner.is_empty()
            && self.snacks.is_empty()
    }

    #[must_use]
    pub fn get(&self, slot: MealSlot) -> &str {
        match slot {
            MealSlot::Breakfast => &self.breakfast,
            MealSlot::Lunch => &self.lunch,
            MealSlot::Dinner => &self.dinner,
            MealSlot::Snacks => &self.snacks,
        }
    }

    pub fn set(&mut self, slot: MealSlot, note: String) {
        match slot {
            MealSlot::Breakfast => self.breakfast = note,
            MealSlot::Lunch => self.lunch = note,
            MealSlot::Dinner => self.dinner = note,
            MealSlot::Snacks => self.snacks = note,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snacks,
}

impl MealSlot {
    pub const ALL: [MealSlot; 4] = [
        MealSlot::Breakfast,
        MealSlot::Lunch,
        MealSlot::Dinner,
        MealSlot::Snacks,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Dinner => "dinner",
            MealSlot::Snacks => "snacks",
        }
    }
}

pub fn validate_meal_slot(slot: &str) -> Result<MealSlot> {
    match slot.trim().to_lowercase().as_str() {
        "breakfast" => Ok(MealSlot::Breakfast),
        "lunch" => Ok(MealSlot::Lunch),
        "dinner" => Ok(MealSlot::Dinner),
        "snack" | "snacks" => Ok(MealSlot::Snacks),
        _ => bail!("Invalid meal slot '{slot}'. Must be one of: breakfast, lunch, dinner, snacks"),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
}

impl Macros {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calories.is_none() && self.protein.is_none() && self.carbs.is_none() && self.fat.is_none()
    }
}

/// The canonical record for one (user, date) pair.
///
/// The legacy `{exercises, meals}` blob deserializes into this type unchanged,
/// and a record holding only lists serializes back to that same shape. The
/// structured daily fields travel alongside and are converted to and from the
/// `daily_logs` schema with [`DailyLog::to_structured`] and
/// [`DailyLog::apply_structured`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub meals: Vec<Meal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_intake: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "MealNotes::is_empty")]
    pub meal_notes: MealNotes,
    #[serde(default, skip_serializing_if = "Macros::is_empty")]
    pub macros: Macros,
}

impl DailyLog {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty() && self.meals.is_empty() && !self.has_structured_fields()
    }

    /// True when any field beyond the two entry lists carries data.
    #[must_use]
    pub fn has_structured_fields(&self) -> bool {
        !self.goals.is_empty()
            || self.water_intake.is_some()
            || self.steps.is_some()
            || self.weight.is_some()
            || !self.meal_notes.is_empty()
            || !self.macros.is_empty()
    }

    #[must_use]
    pub fn to_structured(&self) -> StructuredLog {
        let workouts: Vec<WorkoutRow> = self
            .exercises
            .iter()
            .map(|e| WorkoutRow {
                muscle_group: e.muscle_group.clone(),
                exercise_name: e.name.clone(),
                sets: e.sets.clone(),
                reps: e.reps.clone(),
                weight: e.weight.clone(),
            })
            .collect();
        let muscle_groups = StructuredLog::derive_muscle_groups(&workouts);
        StructuredLog {
            goals: self.goals.clone(),
            water_intake: self.water_intake,
            steps: self.steps,
            weight: self.weight,
            breakfast: self.meal_notes.breakfast.clone(),
            lunch: self.meal_notes.lunch.clone(),
            dinner: self.meal_notes.dinner.clone(),
            snacks: self.meal_notes.snacks.clone(),
            macros: self.macros,
            workouts,
            muscle_groups,
        }
    }

    /// Merge a structured record into this one.
    ///
    /// Scalar fields are taken from `structured`. Workout rows only become
    /// exercises when this record has none, so a record that lives in both
    /// schemas never lists an exercise twice.
    pub fn apply_structured(&mut self, structured: StructuredLog) {
        self.goals = structured.goals;
        self.water_intake = structured.water_intake;
        self.steps = structured.steps;
        self.weight = structured.weight;
        self.meal_notes = MealNotes {
            breakfast: structured.breakfast,
            lunch: structured.lunch,
            dinner: structured.dinner,
            snacks: structured.snacks,
        };
        self.macros = structured.macros;

        if self.exercises.is_empty() {
            self.exercises = structured
                .workouts
                .into_iter()
                .enumerate()
                .map(|(i, w)| Exercise {
                    id: format!("w{}", i + 1),
                    name: w.exercise_name,
                    sets: w.sets,
                    reps: w.reps,
                    notes: String::new(),
                    muscle_group: w.muscle_group,
                    weight: w.weight,
                })
                .collect();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutRow {
    #[serde(default)]
    pub muscle_group: String,
    #[serde(default)]
    pub exercise_name: String,
    #[serde(default)]
    pub sets: String,
    #[serde(default)]
    pub reps: String,
    #[serde(default)]
    pub weight: String,
}

/// The newer `daily_logs` + `workouts` schema shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredLog {
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub water_intake: Option<f64>,
    #[serde(default)]
    pub steps: Option<i64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub breakfast: String,
    #[serde(default)]
    pub lunch: String,
    #[serde(default)]
    pub dinner: String,
    #[serde(default)]
    pub snacks: String,
    #[serde(default)]
    pub macros: Macros,
    #[serde(default)]
    pub workouts: Vec<WorkoutRow>,
    #[serde(default)]
    pub muscle_groups: Vec<String>,
}

impl StructuredLog {
    /// Distinct non-empty muscle groups in first-seen order.
    #[must_use]
    pub fn derive_muscle_groups(workouts: &[WorkoutRow]) -> Vec<String> {
        let mut seen = HashSet::new();
        workouts
            .iter()
            .map(|w| w.muscle_group.trim())
            .filter(|g| !g.is_empty())
            .filter(|g| seen.insert(g.to_lowercase()))
            .map(str::to_string)
            .collect()
    }
}

/// Per-day summary for the calendar. Derived on every fetch, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayFlag {
    pub workout: bool,
    pub diet: bool,
    pub muscle_groups: Vec<String>,
    pub exercise_count: usize,
}

/// Client-generated entry id: milliseconds since the Unix epoch.
#[must_use]
pub fn generate_entry_id() -> String {
    current_millis().to_string()
}

/// A timestamp id that does not collide with any id in `existing`.
#[must_use]
pub fn unique_entry_id<'a>(existing: impl IntoIterator<Item = &'a str>) -> String {
    let taken: HashSet<&str> = existing.into_iter().collect();
    let mut candidate = current_millis();
    loop {
        let id = candidate.to_string();
        if !taken.contains(id.as_str()) {
            return id;
        }
        candidate += 1;
    }
}

fn current_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

pub fn validate_entry_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Name must not be empty");
    }
    Ok(trimmed.to_string())
}

/// Trimmed goals with blanks dropped.
#[must_use]
pub fn clean_goals(goals: impl IntoIterator<Item = String>) -> Vec<String> {
    goals
        .into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect()
}

pub fn parse_date_key(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .with_context(|| format!("Invalid date '{date}'. Use YYYY-MM-DD"))
}

#[must_use]
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
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
            muscle_group: "Legs".to_string(),
            weight: "100kg".to_string(),
            ..Exercise::default()
        }
    }

    #[test]
    fn test_legacy_blob_deserializes() {
        let raw = r#"{"exercises":[{"id":"1","name":"Squat","sets":"3","reps":"10","notes":""}],"meals":[]}"#;
        let log: DailyLog = serde_json::from_str(raw).unwrap();
        assert_eq!(log.exercises.len(), 1);
        assert!(log.meals.is_empty());
        assert!(!log.has_structured_fields());
    }

    #[test]
    fn test_list_only_log_serializes_to_legacy_shape() {
        let log = DailyLog {
            exercises: vec![squat()],
            ..DailyLog::default()
        };
        let value = serde_json::to_value(&log).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["exercises", "meals"]);
    }

    #[test]
    fn test_empty_log() {
        let mut log = DailyLog::default();
        assert!(log.is_empty());
        log.steps = Some(1200);
        assert!(!log.is_empty());
    }

    #[test]
    fn test_to_structured_derives_workouts() {
        let mut bench = squat();
        bench.id = "2".to_string();
        bench.name = "Bench".to_string();
        bench.muscle_group = "Chest".to_string();
        let mut lunge = squat();
        lunge.id = "3".to_string();
        lunge.name = "Lunge".to_string();
        lunge.muscle_group = "legs".to_string();

        let log = DailyLog {
            exercises: vec![squat(), bench, lunge],
            goals: vec!["hit protein".to_string()],
            steps: Some(8000),
            ..DailyLog::default()
        };
        let s = log.to_structured();
        assert_eq!(s.workouts.len(), 3);
        assert_eq!(s.workouts[0].exercise_name, "Squat");
        assert_eq!(s.workouts[0].weight, "100kg");
        assert_eq!(s.muscle_groups, vec!["Legs", "Chest"]);
        assert_eq!(s.steps, Some(8000));
        assert_eq!(s.goals, vec!["hit protein"]);
    }

    #[test]
    fn test_apply_structured_keeps_existing_exercises() {
        let mut log = DailyLog {
            exercises: vec![squat()],
            ..DailyLog::default()
        };
        let structured = StructuredLog {
            water_intake: Some(2.5),
            lunch: "salad".to_string(),
            workouts: vec![WorkoutRow {
                exercise_name: "Row".to_string(),
                ..WorkoutRow::default()
            }],
            ..StructuredLog::default()
        };
        log.apply_structured(structured);
        assert_eq!(log.exercises.len(), 1);
        assert_eq!(log.exercises[0].name, "Squat");
        assert_eq!(log.water_intake, Some(2.5));
        assert_eq!(log.meal_notes.lunch, "salad");
    }

    #[test]
    fn test_apply_structured_migrates_workouts() {
        let mut log = DailyLog::default();
        let structured = StructuredLog {
            workouts: vec![
                WorkoutRow {
                    muscle_group: "Back".to_string(),
                    exercise_name: "Row".to_string(),
                    sets: "4".to_string(),
                    reps: "8".to_string(),
                    weight: "60".to_string(),
                },
                WorkoutRow {
                    exercise_name: "Pull-up".to_string(),
                    ..WorkoutRow::default()
                },
            ],
            ..StructuredLog::default()
        };
        log.apply_structured(structured);
        assert_eq!(log.exercises.len(), 2);
        assert_eq!(log.exercises[0].id, "w1");
        assert_eq!(log.exercises[1].id, "w2");
        assert_eq!(log.exercises[0].muscle_group, "Back");
    }

    #[test]
    fn test_unique_entry_id_skips_taken() {
        let first = unique_entry_id(std::iter::empty::<&str>());
        let second = unique_entry_id([first.as_str()]);
        assert_ne!(first, second);
        assert!(second.parse::<u128>().is_ok());
    }

    #[test]
    fn test_validate_entry_name() {
        assert_eq!(validate_entry_name("  Squat ").unwrap(), "Squat");
        assert!(validate_entry_name("").is_err());
        assert!(validate_entry_name("   ").is_err());
    }

    #[test]
    fn test_clean_goals() {
        let goals = clean_goals(vec![" stretch ".to_string(), "  ".to_string(), "sleep".to_string()]);
        assert_eq!(goals, vec!["stretch", "sleep"]);
    }

    #[test]
    fn test_validate_meal_slot() {
        assert_eq!(validate_meal_slot("Lunch").unwrap(), MealSlot::Lunch);
        assert_eq!(validate_meal_slot("snack").unwrap(), MealSlot::Snacks);
        assert!(validate_meal_slot("brunch").is_err());
    }

    #[test]
    fn test_meal_notes_get_set() {
        let mut notes = MealNotes::default();
        assert!(notes.is_empty());
        notes.set(MealSlot::Dinner, "pasta".to_string());
        assert_eq!(notes.get(MealSlot::Dinner), "pasta");
        assert!(!notes.is_empty());
    }

    #[test]
    fn test_parse_date_key() {
        let d = parse_date_key("2025-03-01").unwrap();
        assert_eq!(date_key(d), "2025-03-01");
        assert!(parse_date_key("03/01/2025").is_err());
    }
}
