use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::{serde_as, skip_serializing_none, DefaultOnNull};
use strum::{Display, EnumString};

use super::{require_non_empty, validate_date, validate_emoji, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ContentKind {
    Goal,
    Memory,
    Lesson,
    Reflection,
    Planning,
    Season,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

/// Fields layered on top of the common record, discriminated by `type`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentDetails {
    #[serde(rename_all = "camelCase")]
    Goal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        focus_area_id: Option<String>,
        #[serde(default)]
        completed: bool,
        #[serde(default, deserialize_with = "lenient_progress")]
        progress: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deadline: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        milestones: Option<Vec<Milestone>>,
    },
    #[serde(rename_all = "camelCase")]
    Memory {
        #[serde(default)]
        #[serde_as(as = "DefaultOnNull")]
        media_uris: Vec<String>,
    },
    Lesson,
    Reflection,
    Planning,
    Season,
}

impl ContentDetails {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentDetails::Goal { .. } => ContentKind::Goal,
            ContentDetails::Memory { .. } => ContentKind::Memory,
            ContentDetails::Lesson => ContentKind::Lesson,
            ContentDetails::Reflection => ContentKind::Reflection,
            ContentDetails::Planning => ContentKind::Planning,
            ContentDetails::Season => ContentKind::Season,
        }
    }

    pub fn goal() -> Self {
        ContentDetails::Goal {
            focus_area_id: None,
            completed: false,
            progress: 0,
            deadline: None,
            milestones: None,
        }
    }
}

/// One timeline entry: a goal, memory, lesson, reflection, planning note or season marker.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub date: String,
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull")]
    pub notes: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub category_ids: Option<Vec<String>>,
    #[serde(flatten)]
    pub details: ContentDetails,
}

impl ContentItem {
    pub fn new(title: impl Into<String>, date: impl Into<String>, details: ContentDetails) -> Self {
        Self {
            id: super::new_id(),
            title: title.into(),
            date: date.into(),
            notes: String::new(),
            emoji: None,
            category_ids: None,
            details,
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.details.kind()
    }

    pub fn is_completed_goal(&self) -> bool {
        matches!(self.details, ContentDetails::Goal { completed: true, .. })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("id", &self.id)?;
        require_non_empty("title", &self.title)?;
        validate_date("date", &self.date)?;
        validate_emoji(self.emoji.as_deref())?;
        if let ContentDetails::Goal {
            progress,
            deadline,
            milestones,
            ..
        } = &self.details
        {
            if *progress > 100 {
                return Err(ValidationError::ProgressOutOfRange(*progress));
            }
            if let Some(deadline) = deadline {
                validate_date("deadline", deadline)?;
            }
            for milestone in milestones.iter().flatten() {
                require_non_empty("milestone title", &milestone.title)?;
            }
        }
        Ok(())
    }
}

/// Reads goal progress from any number or numeric string, rounded and saturated
/// to the `u8` range so out-of-range values still fail validation. Anything else reads as 0.
fn lenient_progress<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let number = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number
        .filter(|value| value.is_finite())
        .map_or(0, |value| value.round().clamp(0.0, f64::from(u8::MAX)) as u8))
}
