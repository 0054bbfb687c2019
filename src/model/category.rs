use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{require_non_empty, ValidationError};

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid colour pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
    #[serde(default)]
    pub is_default: bool,
}

impl Category {
    pub fn new(name: impl Into<String>, color: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            name: name.into(),
            color: color.into(),
            icon: icon.into(),
            is_default: false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("id", &self.id)?;
        require_non_empty("name", &self.name)?;
        validate_color(&self.color)
    }
}

pub(crate) fn validate_color(color: &str) -> Result<(), ValidationError> {
    if HEX_COLOR.is_match(color) {
        Ok(())
    } else {
        Err(ValidationError::InvalidColor(color.to_owned()))
    }
}

const DEFAULT_CATEGORIES: [(&str, &str, &str, &str); 10] = [
    ("health", "Health", "#EF4444", "heart"),
    ("career", "Career", "#3B82F6", "briefcase"),
    ("relationships", "Relationships", "#EC4899", "people"),
    ("family", "Family", "#F59E0B", "home"),
    ("growth", "Personal Growth", "#10B981", "leaf"),
    ("finance", "Finance", "#84CC16", "wallet"),
    ("travel", "Travel", "#06B6D4", "airplane"),
    ("creativity", "Creativity", "#8B5CF6", "color-palette"),
    ("learning", "Learning", "#6366F1", "book"),
    ("spirituality", "Spirituality", "#A855F7", "sparkles"),
];

/// The category set seeded on first run.
pub fn default_categories() -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(id, name, color, icon)| Category {
            id: (*id).to_owned(),
            name: (*name).to_owned(),
            color: (*color).to_owned(),
            icon: (*icon).to_owned(),
            is_default: true,
        })
        .collect()
}
