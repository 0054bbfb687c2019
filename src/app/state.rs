use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::model::{
    default_categories, Category, ContentItem, ContentKind, FocusArea, Season, ThemeMode,
    UserData, UserSettings,
};
use crate::timeline::LifeGrid;

/// Zoom level of the life grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ViewMode {
    Year,
    #[default]
    Month,
    Week,
}

/// Which collection the main screen is showing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ViewState {
    #[default]
    Timeline,
    Goals,
    Memories,
    Lessons,
    Reflections,
    Focus,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Grid,
    List,
}

/// Transient selection owned by the container; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSelection {
    pub view_mode: ViewMode,
    pub view_state: ViewState,
    pub display_mode: DisplayMode,
    pub selected_year: Option<i32>,
    pub selected_month: Option<u8>,
    pub selected_week: Option<u8>,
    pub selected_cell: Option<u32>,
    pub timeline_column: u32,
}

/// Bulk payload of `LOAD_DATA` / `INITIALIZE_APP`: every present slice replaces
/// the one in state, absent slices are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadedData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_items: Option<Vec<ContentItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasons: Option<Vec<Season>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_areas: Option<Vec<FocusArea>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_settings: Option<UserSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeMode>,
}

/// Defaults used for slices that are absent from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDefaults {
    pub life_expectancy: u16,
    pub theme: ThemeMode,
    pub accent_color: Option<String>,
}

impl Default for StateDefaults {
    fn default() -> Self {
        Self {
            life_expectancy: crate::model::settings::DEFAULT_LIFE_EXPECTANCY,
            theme: ThemeMode::Dark,
            accent_color: None,
        }
    }
}

impl StateDefaults {
    pub fn settings(&self) -> UserSettings {
        UserSettings {
            life_expectancy: self.life_expectancy,
            ..UserSettings::default()
        }
    }

    pub fn user(&self) -> UserData {
        UserData {
            accent_color: self.accent_color.clone(),
            ..UserData::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub is_loading: bool,
    pub birth_date: Option<String>,
    pub user: UserData,
    pub content_items: Vec<ContentItem>,
    pub seasons: Vec<Season>,
    pub focus_areas: Vec<FocusArea>,
    pub categories: Vec<Category>,
    pub settings: UserSettings,
    pub theme: ThemeMode,
    pub view: ViewSelection,
}

impl AppState {
    /// The state a store starts in before the boot load completes.
    pub fn loading(defaults: &StateDefaults) -> Self {
        Self {
            is_loading: true,
            birth_date: None,
            user: defaults.user(),
            content_items: Vec::new(),
            seasons: Vec::new(),
            focus_areas: Vec::new(),
            categories: Vec::new(),
            settings: defaults.settings(),
            theme: defaults.theme,
            view: ViewSelection::default(),
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.is_loading
    }

    pub fn content_item(&self, id: &str) -> Option<&ContentItem> {
        self.content_items.iter().find(|item| item.id == id)
    }

    pub fn items_of_kind(&self, kind: ContentKind) -> impl Iterator<Item = &ContentItem> {
        self.content_items
            .iter()
            .filter(move |item| item.kind() == kind)
    }

    /// Goals honouring the `showCompletedGoals` display toggle.
    pub fn visible_goals(&self) -> impl Iterator<Item = &ContentItem> {
        let show_completed = self.settings.show_completed_goals;
        self.items_of_kind(ContentKind::Goal)
            .filter(move |item| show_completed || !item.is_completed_goal())
    }

    pub fn focus_area(&self, id: &str) -> Option<&FocusArea> {
        self.focus_areas.iter().find(|area| area.id == id)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn season(&self, id: &str) -> Option<&Season> {
        self.seasons.iter().find(|season| season.id == id)
    }

    /// Memories whose date falls inside the given season.
    pub fn season_memories<'a>(
        &'a self,
        season: &'a Season,
    ) -> impl Iterator<Item = &'a ContentItem> + 'a {
        self.items_of_kind(ContentKind::Memory)
            .filter(move |item| season.contains(&item.date))
    }

    pub fn life_grid(&self) -> Option<LifeGrid> {
        self.birth_date
            .as_deref()
            .and_then(|birth| LifeGrid::from_iso(birth, self.settings.life_expectancy))
    }
}

/// Categories to install when a load finds none.
pub(crate) fn seeded_categories(categories: Vec<Category>) -> Vec<Category> {
    if categories.is_empty() {
        default_categories()
    } else {
        categories
    }
}
