//! Pure state transitions. Total over [`Action`]: nothing here fails or performs I/O.

use indexmap::IndexMap;

use super::actions::Action;
use super::state::{seeded_categories, AppState, LoadedData};
use crate::model::{Category, ContentItem, FocusArea, Season};

pub fn reduce(state: &AppState, action: Action) -> AppState {
    let mut next = state.clone();
    match action {
        Action::SetLoading(loading) => next.is_loading = loading,
        Action::SetUserBirthDate(birth_date) => {
            next.birth_date = birth_date.filter(|date| !date.trim().is_empty());
        }
        Action::SetAccentColor(color) => next.user.accent_color = Some(color),
        Action::SetViewMode(mode) => next.view.view_mode = mode,
        Action::SetViewState(view) => next.view.view_state = view,
        Action::SetDisplayMode(mode) => next.view.display_mode = mode,
        Action::SelectYear(year) => next.view.selected_year = year,
        Action::SelectMonth(month) => next.view.selected_month = month,
        Action::SelectWeek(week) => next.view.selected_week = week,
        Action::SelectCell(cell) => next.view.selected_cell = cell,

        Action::AddContentItem(item) => next.content_items.push(item),
        Action::UpdateContentItem(item) => replace_by_id(&mut next.content_items, item),
        Action::DeleteContentItem(id) => next.content_items.retain(|item| item.id != id),

        Action::AddSeason(season) => next.seasons.push(season),
        Action::UpdateSeason(season) => replace_by_id(&mut next.seasons, season),
        Action::DeleteSeason(id) => next.seasons.retain(|season| season.id != id),

        Action::AddFocusArea(area) => next.focus_areas.push(area),
        Action::UpdateFocusArea(area) => replace_by_id(&mut next.focus_areas, area),
        Action::DeleteFocusArea(id) => next.focus_areas.retain(|area| area.id != id),
        Action::ReorderFocusAreas(ids) => {
            let mut by_id: IndexMap<String, _> = next
                .focus_areas
                .drain(..)
                .map(|area| (area.id.clone(), area))
                .collect();
            next.focus_areas = ids
                .iter()
                .filter_map(|id| by_id.swap_remove(id))
                .collect();
        }

        Action::AddCategory(category) => next.categories.push(category),
        Action::UpdateCategory(category) => replace_by_id(&mut next.categories, category),
        Action::DeleteCategory(id) => next.categories.retain(|category| category.id != id),
        Action::LoadCategories(categories) => next.categories = seeded_categories(categories),
        Action::SetCategories(categories) => next.categories = categories,

        Action::UpdateUserSettings(patch) => match patch.validate() {
            Ok(()) => next.settings = patch.apply_to(&next.settings),
            Err(err) => tracing::warn!(%err, "ignoring invalid settings patch"),
        },
        Action::SetTheme(theme) => next.theme = theme,
        Action::UpdateTimelineColumn(column) => next.view.timeline_column = column,

        Action::LoadData(data) => apply_loaded(&mut next, data),
        Action::InitializeApp(data) => {
            apply_loaded(&mut next, data);
            next.is_loading = false;
        }

        Action::Unrecognized(kind) => {
            tracing::debug!(action = %kind, "unrecognised action; state unchanged");
        }
    }
    next
}

trait Keyed {
    fn key(&self) -> &str;
}

macro_rules! keyed_by_id {
    ($($ty:ty),+) => {
        $(impl Keyed for $ty {
            fn key(&self) -> &str {
                &self.id
            }
        })+
    };
}

keyed_by_id!(ContentItem, Season, FocusArea, Category);

/// Full-record replace keyed by id; a record that is not present is ignored.
fn replace_by_id<T: Keyed>(items: &mut [T], replacement: T) {
    if let Some(slot) = items.iter_mut().find(|item| item.key() == replacement.key()) {
        *slot = replacement;
    }
}

fn apply_loaded(state: &mut AppState, data: LoadedData) {
    let LoadedData {
        birth_date,
        user,
        content_items,
        seasons,
        focus_areas,
        categories,
        user_settings,
        theme,
    } = data;
    if let Some(birth_date) = birth_date {
        state.birth_date = Some(birth_date).filter(|date| !date.trim().is_empty());
    }
    if let Some(user) = user {
        state.user = user;
    }
    if let Some(items) = content_items {
        state.content_items = items;
    }
    if let Some(seasons) = seasons {
        state.seasons = seasons;
    }
    if let Some(areas) = focus_areas {
        state.focus_areas = areas;
    }
    if let Some(categories) = categories {
        state.categories = categories;
    }
    if let Some(settings) = user_settings {
        state.settings = settings;
    }
    if let Some(theme) = theme {
        state.theme = theme;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::state::StateDefaults;
    use crate::model::{ContentDetails, NotificationSettings, SettingsPatch, ThemeMode};

    fn ready() -> AppState {
        reduce(
            &AppState::loading(&StateDefaults::default()),
            Action::InitializeApp(LoadedData::default()),
        )
    }

    fn goal(id: &str) -> ContentItem {
        let mut item = ContentItem::new(
            "Run a marathon",
            "2025-04-01",
            ContentDetails::Goal {
                focus_area_id: None,
                completed: false,
                progress: 0,
                deadline: None,
                milestones: None,
            },
        );
        item.id = id.to_owned();
        item
    }

    fn area(id: &str, rank: u32) -> FocusArea {
        let mut area = FocusArea::new(format!("Area {id}"), rank);
        area.id = id.to_owned();
        area
    }

    #[test]
    fn unrecognised_action_leaves_state_unchanged() {
        let state = ready();
        let next = reduce(&state, Action::Unrecognized("TELEPORT".into()));
        assert_eq!(next, state);
    }

    #[test]
    fn initialize_clears_loading_and_keeps_absent_slices() {
        let loading = AppState::loading(&StateDefaults::default());
        let next = reduce(
            &loading,
            Action::InitializeApp(LoadedData {
                theme: Some(ThemeMode::Light),
                ..LoadedData::default()
            }),
        );
        assert!(!next.is_loading);
        assert_eq!(next.theme, ThemeMode::Light);
        assert_eq!(next.settings, loading.settings);
        assert!(next.content_items.is_empty());
    }

    #[test]
    fn add_then_delete_restores_length() {
        let state = ready();
        let added = reduce(&state, Action::AddContentItem(goal("g1")));
        assert_eq!(added.content_items.len(), state.content_items.len() + 1);
        let removed = reduce(&added, Action::DeleteContentItem("g1".into()));
        assert_eq!(removed.content_items, state.content_items);
    }

    #[test]
    fn update_replaces_matching_record_only() {
        let mut state = ready();
        state.content_items = vec![goal("a"), goal("b")];
        let mut edited = goal("b");
        edited.title = "Run two marathons".into();

        let next = reduce(&state, Action::UpdateContentItem(edited.clone()));
        assert_eq!(next.content_items[0], state.content_items[0]);
        assert_eq!(next.content_items[1], edited);

        let missing = reduce(&state, Action::UpdateContentItem(goal("zzz")));
        assert_eq!(missing.content_items, state.content_items);
    }

    #[test]
    fn settings_patch_is_shallow() {
        let state = ready();
        let next = reduce(
            &state,
            Action::UpdateUserSettings(SettingsPatch::life_expectancy(90)),
        );
        assert_eq!(next.settings.life_expectancy, 90);
        assert_eq!(
            next.settings.notifications_enabled,
            state.settings.notifications_enabled
        );
        assert_eq!(next.settings.notifications, state.settings.notifications);

        let toggles = NotificationSettings {
            daily_reflection: false,
            goal_reminders: false,
            milestone_alerts: false,
            monthly_review: false,
            memory_prompts: true,
        };
        let replaced = reduce(
            &next,
            Action::UpdateUserSettings(SettingsPatch {
                notifications: Some(toggles.clone()),
                ..SettingsPatch::default()
            }),
        );
        assert_eq!(replaced.settings.notifications, toggles);
        assert_eq!(replaced.settings.life_expectancy, 90);
    }

    #[test]
    fn invalid_settings_patch_is_ignored() {
        let state = ready();
        let next = reduce(
            &state,
            Action::UpdateUserSettings(SettingsPatch::life_expectancy(0)),
        );
        assert_eq!(next, state);
    }

    #[test]
    fn reorder_follows_ids_and_drops_unknown() {
        let mut state = ready();
        state.focus_areas = vec![area("a", 1), area("b", 2), area("c", 3)];
        let next = reduce(
            &state,
            Action::ReorderFocusAreas(vec!["c".into(), "ghost".into(), "a".into()]),
        );
        let ids: Vec<_> = next.focus_areas.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn load_categories_seeds_when_empty_but_set_does_not() {
        let state = ready();
        let loaded = reduce(&state, Action::LoadCategories(Vec::new()));
        assert_eq!(loaded.categories.len(), 10);

        let set = reduce(&loaded, Action::SetCategories(Vec::new()));
        assert!(set.categories.is_empty());

        let custom = vec![Category::new("Music", "#112233", "musical-notes")];
        let loaded = reduce(&state, Action::LoadCategories(custom.clone()));
        assert_eq!(loaded.categories, custom);
    }

    #[test]
    fn blank_birth_date_clears_it() {
        let state = reduce(&ready(), Action::SetUserBirthDate(Some("1990-05-17".into())));
        assert_eq!(state.birth_date.as_deref(), Some("1990-05-17"));
        let cleared = reduce(&state, Action::SetUserBirthDate(Some("  ".into())));
        assert_eq!(cleared.birth_date, None);
    }

    #[test]
    fn seasons_and_view_state_transitions() {
        let state = ready();
        let season = Season::new("University", "2008-09-01");
        let id = season.id.clone();
        let next = reduce(&state, Action::AddSeason(season));
        let next = reduce(&next, Action::UpdateTimelineColumn(12));
        let next = reduce(&next, Action::SelectCell(Some(240)));
        assert_eq!(next.seasons.len(), 1);
        assert_eq!(next.view.timeline_column, 12);
        assert_eq!(next.view.selected_cell, Some(240));

        let next = reduce(&next, Action::DeleteSeason(id));
        assert!(next.seasons.is_empty());
    }
}
