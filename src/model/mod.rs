//! Domain records held by the state container and persisted one blob per kind.

use thiserror::Error;

pub mod category;
pub mod content;
pub mod focus;
pub mod season;
pub mod settings;
pub mod user;

pub use category::{default_categories, Category};
pub use content::{ContentDetails, ContentItem, ContentKind, Milestone};
pub use focus::{FocusArea, FocusStatus, PriorityLevel};
pub use season::Season;
pub use settings::{NotificationSettings, PatchError, SettingsPatch, UserSettings};
pub use user::{ThemeMode, UserData};

/// Form-level problems with a record, reported before it is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
    #[error("{field} is not an ISO date: {value:?}")]
    InvalidDate { field: &'static str, value: String },
    #[error("goal progress must be between 0 and 100, got {0}")]
    ProgressOutOfRange(u8),
    #[error("emoji must be a single character, got {0:?}")]
    InvalidEmoji(String),
    #[error("colour must be a #RRGGBB hex value, got {0:?}")]
    InvalidColor(String),
    #[error("season ends ({end}) before it starts ({start})")]
    SeasonEndsBeforeStart { start: String, end: String },
}

/// Generates a fresh record identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(())
}

pub(crate) fn validate_emoji(emoji: Option<&str>) -> Result<(), ValidationError> {
    use unicode_segmentation::UnicodeSegmentation;

    match emoji {
        Some(value) if value.graphemes(true).count() != 1 => {
            Err(ValidationError::InvalidEmoji(value.to_owned()))
        }
        _ => Ok(()),
    }
}

pub(crate) fn validate_date(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if crate::timeline::parse_iso_date(value).is_none() {
        return Err(ValidationError::InvalidDate {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}
