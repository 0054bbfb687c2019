//! Structural repairs of stored focus areas.
//!
//! Both passes work on raw JSON so absent and falsy fields are visible, never
//! fail, and leave anything they do not recognise untouched.

use serde_json::{Map, Value};

use crate::model::{FocusStatus, PriorityLevel};

const PRIORITY_LEVEL: &str = "priorityLevel";
const RANK: &str = "rank";
const ALLOCATION: &str = "allocation";
const STATUS: &str = "status";
const LAST_UPDATED: &str = "lastUpdated";

/// True when any area lacks a truthy `priorityLevel`.
pub fn needs_rank_migration(areas: &[Value]) -> bool {
    areas
        .iter()
        .filter_map(Value::as_object)
        .any(|area| !is_truthy(area.get(PRIORITY_LEVEL)))
}

/// Derives `priorityLevel` from `rank` for the areas missing one.
pub fn migrate_rank_priority(areas: Vec<Value>) -> Vec<Value> {
    areas
        .into_iter()
        .map(|mut area| {
            if let Some(fields) = area.as_object_mut() {
                if !is_truthy(fields.get(PRIORITY_LEVEL)) {
                    let level = rank_level(fields);
                    fields.insert(PRIORITY_LEVEL.to_owned(), Value::String(level.to_string()));
                }
            }
            area
        })
        .collect()
}

/// True when any area still carries an allocation or a rank-derived level.
pub fn needs_priority_scheme_migration(areas: &[Value]) -> bool {
    areas.iter().filter_map(Value::as_object).any(|area| {
        area.contains_key(ALLOCATION)
            || stored_level(area).is_some_and(PriorityLevel::is_legacy)
    })
}

/// Moves areas onto the essential/important/supplemental scheme.
///
/// `now` stamps `lastUpdated` on areas that have none.
pub fn migrate_priority_scheme(areas: Vec<Value>, now: &str) -> Vec<Value> {
    areas
        .into_iter()
        .map(|mut area| {
            let Some(fields) = area.as_object_mut() else {
                return area;
            };
            let level = match fields.get(PRIORITY_LEVEL) {
                Some(Value::String(raw)) => match raw.parse::<PriorityLevel>() {
                    Ok(level) => level.modern(),
                    Err(_) => PriorityLevel::Important,
                },
                _ => PriorityLevel::Important,
            };
            fields.insert(PRIORITY_LEVEL.to_owned(), Value::String(level.to_string()));
            fields.remove(ALLOCATION);
            if !is_truthy(fields.get(LAST_UPDATED)) {
                fields.insert(LAST_UPDATED.to_owned(), Value::String(now.to_owned()));
            }
            if !is_truthy(fields.get(STATUS)) {
                fields.insert(
                    STATUS.to_owned(),
                    Value::String(FocusStatus::Active.to_string()),
                );
            }
            area
        })
        .collect()
}

fn rank_level(area: &Map<String, Value>) -> PriorityLevel {
    match area.get(RANK).and_then(Value::as_f64) {
        Some(rank) => PriorityLevel::from_rank(rank),
        None => PriorityLevel::Tertiary,
    }
}

fn stored_level(area: &Map<String, Value>) -> Option<PriorityLevel> {
    area.get(PRIORITY_LEVEL)
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
