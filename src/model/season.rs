use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use super::{require_non_empty, validate_date, validate_emoji, ValidationError};
use crate::timeline::parse_iso_date;

/// A named span of life that memories are bucketed into.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub id: String,
    pub name: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
}

impl Season {
    pub fn new(name: impl Into<String>, start_date: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            name: name.into(),
            start_date: start_date.into(),
            end_date: None,
            notes: None,
            emoji: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }

    /// Whether `date` falls inside the season; open seasons extend indefinitely.
    pub fn contains(&self, date: &str) -> bool {
        let (Some(start), Some(date)) = (parse_iso_date(&self.start_date), parse_iso_date(date))
        else {
            return false;
        };
        if date < start {
            return false;
        }
        match self.end_date.as_deref().and_then(parse_iso_date) {
            Some(end) => date <= end,
            None => true,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("id", &self.id)?;
        require_non_empty("name", &self.name)?;
        validate_date("startDate", &self.start_date)?;
        validate_emoji(self.emoji.as_deref())?;
        if let Some(end) = &self.end_date {
            validate_date("endDate", end)?;
            if parse_iso_date(end) < parse_iso_date(&self.start_date) {
                return Err(ValidationError::SeasonEndsBeforeStart {
                    start: self.start_date.clone(),
                    end: end.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_season_contains_later_dates() {
        let season = Season::new("University", "2010-09-01");
        assert!(season.is_open());
        assert!(season.contains("2030-01-01"));
        assert!(!season.contains("2010-08-31"));
    }

    #[test]
    fn closed_season_is_inclusive() {
        let mut season = Season::new("Berlin", "2015-03-01");
        season.end_date = Some("2017-03-01".into());
        assert!(season.contains("2017-03-01"));
        assert!(!season.contains("2017-03-02"));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut season = Season::new("Backwards", "2020-01-01");
        season.end_date = Some("2019-01-01".into());
        assert!(matches!(
            season.validate(),
            Err(ValidationError::SeasonEndsBeforeStart { .. })
        ));
    }
}
