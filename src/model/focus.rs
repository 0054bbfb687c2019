use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none, DefaultOnError, DisplayFromStr, PickFirst};
use strum::{Display, EnumString};

use super::{require_non_empty, ValidationError};

/// Priority classification of a focus area.
///
/// `Primary`/`Secondary`/`Tertiary` are derived from rank; `Essential`/`Important`/
/// `Supplemental` belong to the newer scheme that replaced allocations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PriorityLevel {
    Primary,
    Secondary,
    Tertiary,
    Essential,
    Important,
    Supplemental,
}

impl PriorityLevel {
    pub fn from_rank(rank: f64) -> Self {
        if rank == 1.0 {
            PriorityLevel::Primary
        } else if rank == 2.0 || rank == 3.0 {
            PriorityLevel::Secondary
        } else {
            PriorityLevel::Tertiary
        }
    }

    pub fn is_legacy(self) -> bool {
        matches!(
            self,
            PriorityLevel::Primary | PriorityLevel::Secondary | PriorityLevel::Tertiary
        )
    }

    /// Maps a rank-derived level onto the newer scheme; newer levels map to themselves.
    pub fn modern(self) -> Self {
        match self {
            PriorityLevel::Primary => PriorityLevel::Essential,
            PriorityLevel::Secondary => PriorityLevel::Important,
            PriorityLevel::Tertiary => PriorityLevel::Supplemental,
            other => other,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FocusStatus {
    #[default]
    Active,
    Paused,
    Archived,
}

#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusArea {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Numbers and numeric strings are accepted; anything else reads as 0.
    #[serde(default)]
    #[serde_as(as = "DefaultOnError<PickFirst<(_, DisplayFromStr)>>")]
    pub rank: f64,
    pub priority_level: PriorityLevel,
    /// Share of attention under the rank-derived scheme; dropped by the newer one.
    #[serde(default)]
    pub allocation: Option<f64>,
    #[serde(default)]
    pub status: Option<FocusStatus>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl FocusArea {
    pub fn new(name: impl Into<String>, rank: u32) -> Self {
        Self {
            id: super::new_id(),
            name: name.into(),
            description: None,
            color: None,
            rank: f64::from(rank),
            priority_level: PriorityLevel::from_rank(f64::from(rank)),
            allocation: None,
            status: None,
            last_updated: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("id", &self.id)?;
        require_non_empty("name", &self.name)?;
        if let Some(color) = &self.color {
            super::category::validate_color(color)?;
        }
        Ok(())
    }
}
