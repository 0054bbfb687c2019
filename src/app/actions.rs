use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::IntoStaticStr;

use super::state::{DisplayMode, LoadedData, ViewMode, ViewState};
use crate::model::{
    Category, ContentItem, FocusArea, Season, SettingsPatch, ThemeMode, ValidationError,
};

/// Every state transition the container understands.
///
/// On the wire an action is `{"type": "ADD_SEASON", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    SetLoading(bool),
    #[serde(alias = "SET_BIRTH_DATE")]
    SetUserBirthDate(Option<String>),
    SetAccentColor(String),
    SetViewMode(ViewMode),
    SetViewState(ViewState),
    SetDisplayMode(DisplayMode),
    SelectYear(Option<i32>),
    SelectMonth(Option<u8>),
    SelectWeek(Option<u8>),
    SelectCell(Option<u32>),
    AddContentItem(ContentItem),
    UpdateContentItem(ContentItem),
    DeleteContentItem(String),
    AddSeason(Season),
    UpdateSeason(Season),
    DeleteSeason(String),
    AddFocusArea(FocusArea),
    UpdateFocusArea(FocusArea),
    DeleteFocusArea(String),
    ReorderFocusAreas(Vec<String>),
    AddCategory(Category),
    UpdateCategory(Category),
    DeleteCategory(String),
    /// Installs the default set when the payload is empty.
    LoadCategories(Vec<Category>),
    SetCategories(Vec<Category>),
    UpdateUserSettings(SettingsPatch),
    SetTheme(ThemeMode),
    UpdateTimelineColumn(u32),
    LoadData(LoadedData),
    InitializeApp(LoadedData),
    /// A `type` this build does not know, or a payload that did not decode.
    /// Reduces to a no-op.
    #[serde(skip)]
    Unrecognized(String),
}

impl Action {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Parses a wire action. Only text that is not JSON is an error; anything
    /// else that does not decode becomes [`Action::Unrecognized`].
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        match serde_json::from_value(value) {
            Ok(action) => action,
            Err(err) => {
                tracing::warn!(%err, action = %kind, "ignoring action that does not decode");
                Self::Unrecognized(kind)
            }
        }
    }

    /// Form-level checks on the record an action carries. The reducer never
    /// calls this; callers that accept untrusted input do.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::AddContentItem(item) | Self::UpdateContentItem(item) => item.validate(),
            Self::AddSeason(season) | Self::UpdateSeason(season) => season.validate(),
            Self::AddFocusArea(area) | Self::UpdateFocusArea(area) => area.validate(),
            Self::AddCategory(category) | Self::UpdateCategory(category) => category.validate(),
            Self::SetCategories(categories) | Self::LoadCategories(categories) => {
                categories.iter().try_for_each(Category::validate)
            }
            _ => Ok(()),
        }
    }

    /// True for actions that only touch transient view state.
    pub fn is_view_only(&self) -> bool {
        matches!(
            self,
            Self::SetViewMode(_)
                | Self::SetViewState(_)
                | Self::SetDisplayMode(_)
                | Self::SelectYear(_)
                | Self::SelectMonth(_)
                | Self::SelectWeek(_)
                | Self::SelectCell(_)
                | Self::UpdateTimelineColumn(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_wire_actions() -> anyhow::Result<()> {
        let action = Action::parse(r#"{"type":"SET_THEME","payload":"light"}"#)?;
        assert_eq!(action, Action::SetTheme(ThemeMode::Light));

        let action = Action::parse(r#"{"type":"REORDER_FOCUS_AREAS","payload":["b","a"]}"#)?;
        assert_eq!(
            action,
            Action::ReorderFocusAreas(vec!["b".into(), "a".into()])
        );
        Ok(())
    }

    #[test]
    fn birth_date_accepts_both_names() -> anyhow::Result<()> {
        let long = Action::parse(r#"{"type":"SET_USER_BIRTH_DATE","payload":"1990-05-17"}"#)?;
        let short = Action::parse(r#"{"type":"SET_BIRTH_DATE","payload":"1990-05-17"}"#)?;
        assert_eq!(long, short);
        assert_eq!(long.name(), "SET_USER_BIRTH_DATE");
        Ok(())
    }

    #[test]
    fn unknown_and_malformed_actions_are_unrecognized() -> anyhow::Result<()> {
        assert_matches!(
            Action::parse(r#"{"type":"SHUFFLE_EVERYTHING","payload":1}"#)?,
            Action::Unrecognized(kind) if kind == "SHUFFLE_EVERYTHING"
        );
        assert_matches!(
            Action::parse(r#"{"type":"SET_THEME","payload":"neon"}"#)?,
            Action::Unrecognized(kind) if kind == "SET_THEME"
        );
        assert_matches!(
            Action::parse(r#"{"type":"UPDATE_USER_SETTINGS","payload":{"fontSize":12}}"#)?,
            Action::Unrecognized(_)
        );
        assert!(Action::parse("not json").is_err());
        Ok(())
    }

    #[test]
    fn settings_payload_decodes_as_patch() -> anyhow::Result<()> {
        let action =
            Action::parse(r#"{"type":"UPDATE_USER_SETTINGS","payload":{"lifeExpectancy":90}}"#)?;
        assert_eq!(
            action,
            Action::UpdateUserSettings(SettingsPatch::life_expectancy(90))
        );
        Ok(())
    }

    #[test]
    fn carried_records_are_validated() -> anyhow::Result<()> {
        let action = Action::parse(
            r#"{"type":"ADD_SEASON","payload":{"id":"s1","name":"Berlin","startDate":"2015-01-01","endDate":"2014-01-01"}}"#,
        )?;
        assert_matches!(
            action.validate(),
            Err(ValidationError::SeasonEndsBeforeStart { .. })
        );
        assert!(Action::SetTheme(ThemeMode::Light).validate().is_ok());
        Ok(())
    }

    #[test]
    fn view_actions_are_classified() {
        assert!(Action::UpdateTimelineColumn(4).is_view_only());
        assert!(!Action::SetTheme(ThemeMode::Dark).is_view_only());
    }
}
