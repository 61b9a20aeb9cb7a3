//! Lenient conversion of stored JSON payloads into typed entries.
//!
//! Rows in the remote tables hold whatever JSON a client last wrote. Nothing
//! here returns an error: a payload that is not an array decodes to an empty
//! list, non-object elements are dropped, and each field is coerced to a
//! string with missing values becoming `""`.

use serde_json::{Map, Value};

use crate::models::{Exercise, Meal};

#[must_use]
pub fn decode_exercises(payload: &Value) -> Vec<Exercise> {
    objects(payload)
        .map(|obj| Exercise {
            id: field(obj, "id"),
            name: field(obj, "name"),
            sets: field(obj, "sets"),
            reps: field(obj, "reps"),
            notes: field(obj, "notes"),
            muscle_group: field(obj, "muscle_group"),
            weight: field(obj, "weight"),
        })
        .collect()
}

#[must_use]
pub fn decode_meals(payload: &Value) -> Vec<Meal> {
    objects(payload)
        .map(|obj| Meal {
            id: field(obj, "id"),
            name: field(obj, "name"),
            calories: field(obj, "calories"),
            protein: field(obj, "protein"),
            notes: field(obj, "notes"),
        })
        .collect()
}

/// True for a non-empty array, or a non-empty object (older clients stored
/// entries keyed by id instead of as a list).
#[must_use]
pub fn has_entries(payload: &Value) -> bool {
    entry_count(payload) > 0
}

#[must_use]
pub fn entry_count(payload: &Value) -> usize {
    match payload {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 0,
    }
}

fn objects(payload: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    payload
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
