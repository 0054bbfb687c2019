use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LIFE_EXPECTANCY: u16 = 83;
pub const MAX_LIFE_EXPECTANCY: u16 = 130;

static REFLECTION_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").expect("valid reflection time pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub daily_reflection: bool,
    pub goal_reminders: bool,
    pub milestone_alerts: bool,
    pub monthly_review: bool,
    pub memory_prompts: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            daily_reflection: true,
            goal_reminders: true,
            milestone_alerts: true,
            monthly_review: true,
            memory_prompts: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub life_expectancy: u16,
    pub notifications_enabled: bool,
    pub notifications: NotificationSettings,
    pub daily_reflection_time: String,
    pub show_completed_goals: bool,
    pub show_season_markers: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            life_expectancy: DEFAULT_LIFE_EXPECTANCY,
            notifications_enabled: true,
            notifications: NotificationSettings::default(),
            daily_reflection_time: "20:00".to_owned(),
            show_completed_goals: true,
            show_season_markers: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("decoding settings patch: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("life expectancy must be between 1 and {MAX_LIFE_EXPECTANCY}, got {0}")]
    LifeExpectancyOutOfRange(u16),
    #[error("daily reflection time must be HH:MM, got {0:?}")]
    InvalidReflectionTime(String),
}

/// A shallow patch over [`UserSettings`]: every present field replaces the stored one.
///
/// `notifications` is replaced as a whole, never merged key by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub life_expectancy: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_reflection_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_completed_goals: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_season_markers: Option<bool>,
}

impl SettingsPatch {
    pub fn from_json(raw: &str) -> Result<Self, PatchError> {
        let patch: SettingsPatch = serde_json::from_str(raw)?;
        patch.validate()?;
        Ok(patch)
    }

    pub fn life_expectancy(years: u16) -> Self {
        Self {
            life_expectancy: Some(years),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), PatchError> {
        if let Some(years) = self.life_expectancy {
            if years == 0 || years > MAX_LIFE_EXPECTANCY {
                return Err(PatchError::LifeExpectancyOutOfRange(years));
            }
        }
        if let Some(time) = &self.daily_reflection_time {
            if !REFLECTION_TIME.is_match(time) {
                return Err(PatchError::InvalidReflectionTime(time.clone()));
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, base: &UserSettings) -> UserSettings {
        let mut merged = base.clone();
        if let Some(years) = self.life_expectancy {
            merged.life_expectancy = years;
        }
        if let Some(enabled) = self.notifications_enabled {
            merged.notifications_enabled = enabled;
        }
        if let Some(notifications) = &self.notifications {
            merged.notifications = notifications.clone();
        }
        if let Some(time) = &self.daily_reflection_time {
            merged.daily_reflection_time = time.clone();
        }
        if let Some(show) = self.show_completed_goals {
            merged.show_completed_goals = show;
        }
        if let Some(show) = self.show_season_markers {
            merged.show_season_markers = show;
        }
        merged
    }
}
