//! The application state container: one reducer-driven snapshot, persisted slice by slice.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::Value;

use crate::backup::{self, BackupDocument, BackupPolicy};
use crate::config::AppConfig;
use crate::migrations::{self, upgrade_focus_areas, MigrationContext, MigrationError};
use crate::model::{Category, ContentItem, FocusArea, Season, ThemeMode, UserData, UserSettings};
use crate::storage::keys::DEFAULT_KEY_PREFIX;
use crate::storage::{
    EntityKey, KeySpace, KeyValueStore, OnboardingProgress, PersistentStore, Records, Versioned,
};

pub mod actions;
pub mod reducer;
pub mod state;

pub use actions::Action;
pub use reducer::reduce;
pub use state::{
    AppState, DisplayMode, LoadedData, StateDefaults, ViewMode, ViewSelection, ViewState,
};

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub key_prefix: String,
    pub defaults: StateDefaults,
    /// Focus-area schema version boot migrates to.
    pub focus_target_version: u32,
    pub backup: BackupPolicy,
    pub backup_on_exit: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            defaults: StateDefaults::default(),
            focus_target_version: migrations::RANK_PRIORITY_VERSION,
            backup: BackupPolicy {
                dir: PathBuf::from("backups"),
                max_backups: 10,
            },
            backup_on_exit: false,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            key_prefix: config.storage.key_prefix.clone(),
            defaults: config.state_defaults(),
            focus_target_version: config.migrations.focus_target_version(),
            backup: BackupPolicy::from_options(&config.storage),
            backup_on_exit: config.storage.backup_on_exit,
        }
    }
}

/// What the most recent load found and repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    pub focus_version: u32,
    pub migrations_applied: Vec<&'static str>,
    /// Focus areas that did not decode; kept in storage as they were.
    pub dropped_focus_areas: usize,
    /// Content items, seasons and categories that did not decode; kept in storage.
    pub unreadable_records: usize,
    pub seeded_categories: bool,
}

struct RawSnapshot {
    birth_date: Option<String>,
    user: Option<UserData>,
    content_items: Option<Records<ContentItem>>,
    seasons: Option<Records<Season>>,
    focus_areas: Option<Versioned<Vec<Value>>>,
    categories: Option<Records<Category>>,
    user_settings: Option<UserSettings>,
    theme: Option<ThemeMode>,
}

pub struct Store {
    persistent: PersistentStore,
    options: StoreOptions,
    state: Mutex<Arc<AppState>>,
    boot: Mutex<BootReport>,
    mutated: AtomicBool,
}

impl Store {
    /// Opens the container over `backend`, loads every entity, runs focus-area
    /// migrations and leaves the state ready.
    pub fn init(backend: Arc<dyn KeyValueStore>, options: StoreOptions) -> Result<Self> {
        let latest = migrations::latest_version();
        if options.focus_target_version > latest {
            return Err(MigrationError::UnsupportedTarget {
                target: options.focus_target_version,
                latest,
            }
            .into());
        }
        let persistent = PersistentStore::new(
            backend,
            KeySpace::new(options.key_prefix.clone()),
            options.focus_target_version,
        )?;
        let store = Self {
            persistent,
            state: Mutex::new(Arc::new(AppState::loading(&options.defaults))),
            options,
            boot: Mutex::new(BootReport::default()),
            mutated: AtomicBool::new(false),
        };
        store.load()?;
        Ok(store)
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state.lock())
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn persistent(&self) -> &PersistentStore {
        &self.persistent
    }

    pub fn boot_report(&self) -> BootReport {
        self.boot.lock().clone()
    }

    /// Reduces `action` against the current snapshot and queues a write for
    /// every persisted slice that changed. An action that changes nothing
    /// returns the previous snapshot itself.
    pub fn dispatch(&self, action: Action) -> Arc<AppState> {
        let mut current = self.state.lock();
        let prev = Arc::clone(&current);
        let name = action.name();
        let view_only = action.is_view_only();

        let next = reduce(&prev, action);
        if next == *prev {
            tracing::debug!(action = name, "dispatch left state unchanged");
            return prev;
        }
        tracing::debug!(action = name, "dispatched");

        let next = Arc::new(next);
        *current = Arc::clone(&next);
        if !view_only && prev.is_ready() && next.is_ready() {
            self.persist_changes(&prev, &next);
        }
        next
    }

    pub fn dispatch_json(&self, raw: &str) -> Result<Arc<AppState>> {
        let action = Action::parse(raw).context("parsing action json")?;
        Ok(self.dispatch(action))
    }

    pub fn onboarding_progress(&self) -> Option<OnboardingProgress> {
        self.persistent.get_onboarding_progress()
    }

    pub fn save_onboarding_progress(&self, progress: OnboardingProgress) {
        self.persistent.save_onboarding_progress(progress);
        self.mutated.store(true, Ordering::Relaxed);
    }

    /// Forgets onboarding progress and the birth date, then reloads from storage.
    pub fn reset_onboarding(&self) -> Result<()> {
        tracing::info!("resetting onboarding");
        self.persistent.clear_onboarding_progress();
        self.persistent.save_birth_date(None);
        self.persistent.flush();
        self.mutated.store(true, Ordering::Relaxed);
        self.load()
    }

    /// Replaces every owned key with the contents of a backup and reloads.
    pub fn restore(&self, document: BackupDocument) -> Result<usize> {
        let blobs = document.into_blobs()?;
        let cleared = self.persistent.clear().context("clearing before restore")?;
        let mut restored = 0;
        for (key, value) in blobs {
            if self.persistent.keys().owns(&key) {
                self.persistent.put_raw(key, value);
                restored += 1;
            } else {
                tracing::warn!(key = %key, "backup entry outside this key space; skipped");
            }
        }
        self.persistent.flush();
        self.mutated.store(true, Ordering::Relaxed);
        tracing::info!(cleared, restored, "restored backup");
        self.load()?;
        Ok(restored)
    }

    pub fn write_backup(&self) -> Result<PathBuf> {
        self.persistent.flush();
        let blobs = self.persistent.dump()?;
        let document = BackupDocument::from_blobs(self.persistent.keys().prefix(), blobs);
        backup::write_backup(&self.options.backup, &document)
    }

    /// Blocks until every queued write has landed.
    pub fn flush(&self) {
        self.persistent.flush();
    }

    /// Drains the writer and, when configured and something was written this
    /// session, leaves a backup behind. Returns the backup path if one was written.
    pub fn shutdown(&self) -> Result<Option<PathBuf>> {
        self.persistent.flush();
        let backup = if self.options.backup_on_exit && self.mutated.load(Ordering::Relaxed) {
            self.write_backup().map(Some)
        } else {
            Ok(None)
        };
        self.persistent.shutdown();
        let stats = self.persistent.writer_stats();
        tracing::info!(
            written = stats.written,
            coalesced = stats.coalesced,
            failed = stats.failed,
            "store shut down"
        );
        backup
    }

    fn load(&self) -> Result<()> {
        let started = Instant::now();
        *self.state.lock() = Arc::new(AppState::loading(&self.options.defaults));
        self.persistent.forget_rejected();

        let raw = self.read_all();
        let target = self.options.focus_target_version;
        self.persistent.set_focus_schema_version(target);
        let mut report = BootReport::default();

        let focus_areas = match raw.focus_areas {
            Some(Versioned { version, data }) => {
                let upgrade = upgrade_focus_areas(data, version, target, &MigrationContext::now())?;
                self.persistent.set_focus_schema_version(upgrade.version);
                let upgrade_changed = upgrade.changed();
                let areas = self.retain(
                    EntityKey::FocusAreas,
                    Records::<FocusArea>::decode(upgrade.areas, EntityKey::FocusAreas.name()),
                );
                if upgrade_changed || version < upgrade.version {
                    tracing::debug!(from = version, to = upgrade.version, "writing back focus areas");
                    self.persistent.save_focus_areas(&areas);
                    self.mutated.store(true, Ordering::Relaxed);
                }
                report.migrations_applied = upgrade.applied;
                report.dropped_focus_areas = self.persistent.rejected_count(EntityKey::FocusAreas);
                Some(areas)
            }
            None => None,
        };
        report.focus_version = self.persistent.focus_schema_version();

        let content_items = raw
            .content_items
            .map(|records| self.retain(EntityKey::ContentItems, records));
        let seasons = raw
            .seasons
            .map(|records| self.retain(EntityKey::Seasons, records));
        let stored_categories = raw
            .categories
            .map(|records| self.retain(EntityKey::Categories, records))
            .unwrap_or_default();
        report.unreadable_records = [
            EntityKey::ContentItems,
            EntityKey::Seasons,
            EntityKey::Categories,
        ]
        .into_iter()
        .map(|entity| self.persistent.rejected_count(entity))
        .sum();
        report.seeded_categories = stored_categories.is_empty();
        let categories = state::seeded_categories(stored_categories);
        if report.seeded_categories {
            tracing::info!(count = categories.len(), "seeding default categories");
            self.persistent.save_categories(&categories);
            self.mutated.store(true, Ordering::Relaxed);
        }

        let data = LoadedData {
            birth_date: raw.birth_date,
            user: raw.user,
            content_items,
            seasons,
            focus_areas,
            categories: Some(categories),
            user_settings: raw.user_settings,
            theme: raw.theme,
        };
        let state = self.dispatch(Action::InitializeApp(data));
        tracing::info!(
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            items = state.content_items.len(),
            focus_areas = state.focus_areas.len(),
            focus_version = report.focus_version,
            "store ready"
        );
        *self.boot.lock() = report;
        Ok(())
    }

    /// One read per entity key, all in flight at once.
    fn read_all(&self) -> RawSnapshot {
        let store = &self.persistent;
        thread::scope(|scope| {
            let birth_date = scope.spawn(|| store.get_birth_date());
            let user = scope.spawn(|| store.get_user_data());
            let content_items = scope.spawn(|| store.read_records(EntityKey::ContentItems));
            let seasons = scope.spawn(|| store.read_records(EntityKey::Seasons));
            let focus_areas = scope.spawn(|| store.get_focus_areas_raw());
            let categories = scope.spawn(|| store.read_records(EntityKey::Categories));
            let user_settings = scope.spawn(|| store.get_user_settings());
            let theme = scope.spawn(|| store.get_theme());
            RawSnapshot {
                birth_date: joined(birth_date, EntityKey::UserBirthDate),
                user: joined(user, EntityKey::UserData),
                content_items: joined(content_items, EntityKey::ContentItems),
                seasons: joined(seasons, EntityKey::Seasons),
                focus_areas: joined(focus_areas, EntityKey::FocusAreas),
                categories: joined(categories, EntityKey::Categories),
                user_settings: joined(user_settings, EntityKey::UserSettings),
                theme: joined(theme, EntityKey::Theme),
            }
        })
    }

    /// Hands undecodable records to the persistent store and returns the rest.
    fn retain<T>(&self, entity: EntityKey, records: Records<T>) -> Vec<T> {
        self.persistent.retain_rejected(entity, records.rejected);
        records.items
    }

    fn persist_changes(&self, prev: &AppState, next: &AppState) {
        let store = &self.persistent;
        let mut wrote = false;
        if prev.birth_date != next.birth_date {
            store.save_birth_date(next.birth_date.as_deref());
            wrote = true;
        }
        if prev.user != next.user {
            store.save_user_data(&next.user);
            wrote = true;
        }
        if prev.content_items != next.content_items {
            store.save_content_items(&next.content_items);
            wrote = true;
        }
        if prev.seasons != next.seasons {
            store.save_seasons(&next.seasons);
            wrote = true;
        }
        if prev.focus_areas != next.focus_areas {
            store.save_focus_areas(&next.focus_areas);
            wrote = true;
        }
        if prev.categories != next.categories {
            store.save_categories(&next.categories);
            wrote = true;
        }
        if prev.settings != next.settings {
            store.save_user_settings(&next.settings);
            wrote = true;
        }
        if prev.theme != next.theme {
            store.save_theme(next.theme);
            wrote = true;
        }
        if wrote {
            self.mutated.store(true, Ordering::Relaxed);
        }
    }
}

fn joined<T>(handle: ScopedJoinHandle<'_, Option<T>>, entity: EntityKey) -> Option<T> {
    handle.join().unwrap_or_else(|_| {
        tracing::error!(entity = entity.name(), "entity read panicked; treating as absent");
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::{PRIORITY_SCHEME_VERSION, RANK_PRIORITY_VERSION};
    use crate::model::{ContentDetails, PriorityLevel, SettingsPatch};
    use crate::storage::{MemoryStore, ONBOARDING_KEY};
    use serde_json::json;
    use tempfile::TempDir;

    fn open(backend: &Arc<MemoryStore>) -> anyhow::Result<Store> {
        Store::init(backend.clone(), StoreOptions::default())
    }

    fn goal(title: &str) -> ContentItem {
        ContentItem::new(
            title,
            "2025-01-01",
            ContentDetails::Goal {
                focus_area_id: None,
                completed: false,
                progress: 0,
                deadline: None,
                milestones: None,
            },
        )
    }

    fn stored_json(backend: &MemoryStore, key: &str) -> anyhow::Result<Value> {
        let raw = backend.get_item(key)?.expect("key stored");
        Ok(serde_json::from_str(&raw)?)
    }

    #[test]
    fn empty_storage_boots_with_defaults() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let store = open(&backend)?;
        let state = store.state();

        assert!(state.is_ready());
        assert!(state.content_items.is_empty());
        assert!(state.seasons.is_empty());
        assert!(state.focus_areas.is_empty());
        assert_eq!(state.categories.len(), 10);
        assert_eq!(state.settings.life_expectancy, 83);
        assert_eq!(state.theme, ThemeMode::Dark);
        assert_eq!(state.birth_date, None);
        assert!(store.boot_report().seeded_categories);

        store.flush();
        let categories = stored_json(&backend, "@ThousandMonths:categories")?;
        assert_eq!(categories["data"].as_array().map(Vec::len), Some(10));
        Ok(())
    }

    #[test]
    fn dispatch_persists_changed_slices() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let store = open(&backend)?;
        let item = goal("Learn Portuguese");
        let id = item.id.clone();

        store.dispatch(Action::AddContentItem(item.clone()));
        store.flush();
        assert_eq!(store.persistent().get_content_items(), Some(vec![item]));

        store.dispatch(Action::DeleteContentItem(id));
        store.flush();
        assert_eq!(store.persistent().get_content_items(), Some(Vec::new()));
        assert!(backend.get_item("@ThousandMonths:theme")?.is_none());
        Ok(())
    }

    #[test]
    fn no_op_dispatch_returns_same_snapshot() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let store = open(&backend)?;
        let before = store.state();

        let after = store.dispatch(Action::Unrecognized("WARP_DRIVE".into()));
        assert!(Arc::ptr_eq(&before, &after));

        let after = store.dispatch_json(r#"{"type":"WARP_DRIVE","payload":{}}"#)?;
        assert!(Arc::ptr_eq(&before, &after));
        Ok(())
    }

    #[test]
    fn view_state_is_never_persisted() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let store = open(&backend)?;
        store.flush();
        let keys_before = backend.all_keys()?;

        store.dispatch(Action::SetViewMode(ViewMode::Year));
        store.dispatch(Action::SelectYear(Some(2020)));
        store.dispatch(Action::UpdateTimelineColumn(7));
        store.flush();

        assert_eq!(backend.all_keys()?, keys_before);
        assert_eq!(store.state().view.timeline_column, 7);
        Ok(())
    }

    #[test]
    fn settings_patch_merges_and_persists() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let store = open(&backend)?;
        store.dispatch(Action::UpdateUserSettings(SettingsPatch::life_expectancy(90)));
        store.flush();

        let stored = store.persistent().get_user_settings().expect("settings stored");
        assert_eq!(stored.life_expectancy, 90);
        assert_eq!(stored.daily_reflection_time, "20:00");
        Ok(())
    }

    #[test]
    fn write_failures_keep_in_memory_state() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let store = open(&backend)?;
        backend.set_fail_writes(true);

        store.dispatch(Action::SetTheme(ThemeMode::Light));
        store.flush();

        assert_eq!(store.state().theme, ThemeMode::Light);
        assert!(store.persistent().writer_stats().failed >= 1);
        Ok(())
    }

    #[test]
    fn read_failures_boot_with_defaults() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::with_items([(
            "@ThousandMonths:theme",
            r#"{"schemaVersion":1,"data":"light"}"#,
        )]));
        backend.set_fail_reads(true);
        let store = open(&backend)?;
        let state = store.state();
        assert!(state.is_ready());
        assert_eq!(state.theme, ThemeMode::Dark);
        Ok(())
    }

    #[test]
    fn dispatch_while_loading_does_not_persist() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let store = open(&backend)?;
        store.dispatch(Action::SetLoading(true));
        store.dispatch(Action::SetTheme(ThemeMode::System));
        store.flush();
        assert!(backend.get_item("@ThousandMonths:theme")?.is_none());

        store.dispatch(Action::SetLoading(false));
        store.dispatch(Action::SetTheme(ThemeMode::Light));
        store.flush();
        assert_eq!(store.persistent().get_theme(), Some(ThemeMode::Light));
        Ok(())
    }

    #[test]
    fn boot_migrates_legacy_focus_areas_and_writes_back() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::with_items([(
            "@ThousandMonths:focusAreas",
            r#"[{"id":"a","name":"Health","rank":1},{"id":"b","name":"Work","rank":3,"allocation":30}]"#,
        )]));
        let store = open(&backend)?;

        let state = store.state();
        let levels: Vec<_> = state.focus_areas.iter().map(|a| a.priority_level).collect();
        assert_eq!(levels, vec![PriorityLevel::Primary, PriorityLevel::Secondary]);
        assert_eq!(
            store.boot_report().migrations_applied,
            vec!["rank-priority-level"]
        );

        store.flush();
        let stored = stored_json(&backend, "@ThousandMonths:focusAreas")?;
        assert_eq!(stored["schemaVersion"], json!(RANK_PRIORITY_VERSION));
        assert_eq!(stored["data"][0]["priorityLevel"], json!("primary"));
        assert_eq!(stored["data"][1]["allocation"], json!(30.0));
        Ok(())
    }

    #[test]
    fn adopting_priority_scheme_runs_full_chain() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::with_items([(
            "@ThousandMonths:focusAreas",
            r#"[{"id":"a","name":"Health","rank":2,"allocation":50}]"#,
        )]));
        let options = StoreOptions {
            focus_target_version: PRIORITY_SCHEME_VERSION,
            ..StoreOptions::default()
        };
        let store = Store::init(backend.clone(), options)?;

        let area = &store.state().focus_areas[0];
        assert_eq!(area.priority_level, PriorityLevel::Important);
        assert_eq!(area.allocation, None);
        assert!(area.last_updated.is_some());

        store.flush();
        let stored = stored_json(&backend, "@ThousandMonths:focusAreas")?;
        assert_eq!(stored["schemaVersion"], json!(PRIORITY_SCHEME_VERSION));
        Ok(())
    }

    #[test]
    fn clean_focus_areas_are_not_rewritten() -> anyhow::Result<()> {
        let raw = r#"{"schemaVersion":1,"data":[{"id":"a","name":"Health","rank":1,"priorityLevel":"primary"}]}"#;
        let backend = Arc::new(MemoryStore::with_items([("@ThousandMonths:focusAreas", raw)]));
        let store = open(&backend)?;
        store.flush();
        assert!(store.boot_report().migrations_applied.is_empty());
        assert_eq!(
            backend.get_item("@ThousandMonths:focusAreas")?.as_deref(),
            Some(raw)
        );
        Ok(())
    }

    #[test]
    fn newer_focus_schema_is_decoded_as_is() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::with_items([(
            "@ThousandMonths:focusAreas",
            r#"{"schemaVersion":2,"data":[{"id":"a","name":"Health","rank":1,"priorityLevel":"essential","status":"paused"},{"id":"b"}]}"#,
        )]));
        let store = open(&backend)?;
        let state = store.state();
        assert_eq!(state.focus_areas.len(), 1);
        assert_eq!(state.focus_areas[0].priority_level, PriorityLevel::Essential);
        let report = store.boot_report();
        assert_eq!(report.focus_version, 2);
        assert_eq!(report.dropped_focus_areas, 1);
        Ok(())
    }

    #[test]
    fn undecodable_content_items_survive_later_writes() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::with_items([(
            "@ThousandMonths:contentItems",
            r#"{"schemaVersion":1,"data":[
                {"id":"m1","title":"Wedding","date":"2016-08-20","type":"memory","mediaUris":null},
                {"id":"g1","title":"Half marathon","date":"2024-01-01","type":"goal","progress":45.5},
                {"id":"h1","title":"Hologram","date":"2024-01-01","type":"hologram"}
            ]}"#,
        )]));
        let store = open(&backend)?;
        let titles: Vec<_> = store
            .state()
            .content_items
            .iter()
            .map(|item| item.title.clone())
            .collect();
        assert_eq!(titles, vec!["Wedding", "Half marathon"]);
        assert_eq!(store.boot_report().unreadable_records, 1);

        store.dispatch(Action::AddContentItem(goal("New")));
        store.flush();
        let stored = stored_json(&backend, "@ThousandMonths:contentItems")?;
        let ids: Vec<_> = stored["data"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| item["id"].as_str())
            .collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(&ids[..2], &["m1", "g1"]);
        assert_eq!(ids[3], "h1");
        assert_eq!(stored["data"][3]["type"], json!("hologram"));

        let reopened = open(&backend)?;
        assert_eq!(reopened.state().content_items.len(), 3);
        assert_eq!(reopened.boot_report().unreadable_records, 1);
        Ok(())
    }

    #[test]
    fn undecodable_focus_areas_are_kept_on_write_back() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::with_items([(
            "@ThousandMonths:focusAreas",
            r#"[{"id":"a","name":"Health","rank":1},{"id":"b","name":"Work","rank":"2"},
                {"id":"c","name":"Play","rank":2.5},{"id":"d","rank":4}]"#,
        )]));
        let store = open(&backend)?;
        let state = store.state();
        let levels: Vec<_> = state
            .focus_areas
            .iter()
            .map(|area| (area.id.as_str(), area.priority_level))
            .collect();
        assert_eq!(
            levels,
            vec![
                ("a", PriorityLevel::Primary),
                ("b", PriorityLevel::Tertiary),
                ("c", PriorityLevel::Tertiary),
            ]
        );
        assert_eq!(store.boot_report().dropped_focus_areas, 1);

        store.flush();
        let stored = stored_json(&backend, "@ThousandMonths:focusAreas")?;
        assert_eq!(stored["data"].as_array().map(Vec::len), Some(4));
        assert_eq!(stored["data"][3]["id"], json!("d"));
        assert_eq!(stored["data"][3]["priorityLevel"], json!("tertiary"));

        store.dispatch(Action::DeleteFocusArea("a".into()));
        store.flush();
        let stored = stored_json(&backend, "@ThousandMonths:focusAreas")?;
        let ids: Vec<_> = stored["data"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|area| area["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
        Ok(())
    }

    #[test]
    fn focus_writes_keep_newer_stored_version() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::with_items([(
            "@ThousandMonths:focusAreas",
            r#"{"schemaVersion":2,"data":[{"id":"a","name":"Health","rank":1,"priorityLevel":"essential","status":"active"}]}"#,
        )]));
        let store = open(&backend)?;
        assert_eq!(store.boot_report().focus_version, PRIORITY_SCHEME_VERSION);
        assert_eq!(store.persistent().focus_schema_version(), PRIORITY_SCHEME_VERSION);

        let mut area = store.state().focus_areas[0].clone();
        area.name = "Body".into();
        store.dispatch(Action::UpdateFocusArea(area));
        store.flush();

        let stored = stored_json(&backend, "@ThousandMonths:focusAreas")?;
        assert_eq!(stored["schemaVersion"], json!(PRIORITY_SCHEME_VERSION));
        assert_eq!(stored["data"][0]["name"], json!("Body"));
        assert_eq!(stored["data"][0]["priorityLevel"], json!("essential"));
        Ok(())
    }

    #[test]
    fn unknown_focus_target_is_rejected() {
        let options = StoreOptions {
            focus_target_version: 99,
            ..StoreOptions::default()
        };
        assert!(Store::init(Arc::new(MemoryStore::new()), options).is_err());
    }

    #[test]
    fn reset_onboarding_clears_progress_and_birth_date() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let store = open(&backend)?;
        store.dispatch(Action::SetUserBirthDate(Some("1990-05-17".into())));
        store.dispatch(Action::AddContentItem(goal("Keep me")));
        store.save_onboarding_progress(OnboardingProgress {
            step: 4,
            completed: true,
        });
        store.flush();

        store.reset_onboarding()?;
        let state = store.state();
        assert!(state.is_ready());
        assert_eq!(state.birth_date, None);
        assert_eq!(state.content_items.len(), 1);
        assert_eq!(store.onboarding_progress(), None);
        assert!(backend.get_item(ONBOARDING_KEY)?.is_none());
        assert!(backend.get_item("@ThousandMonths:userBirthDate")?.is_none());
        Ok(())
    }

    #[test]
    fn concurrent_dispatches_are_serialised() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let store = open(&backend)?;
        thread::scope(|scope| {
            for worker in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for n in 0..25 {
                        store.dispatch(Action::AddContentItem(goal(&format!("{worker}-{n}"))));
                    }
                });
            }
        });
        store.flush();
        let state = store.state();
        assert_eq!(state.content_items.len(), 100);
        assert_eq!(
            store.persistent().get_content_items(),
            Some(state.content_items.clone())
        );
        Ok(())
    }

    #[test]
    fn backup_and_restore_round_trip() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let backend = Arc::new(MemoryStore::new());
        let options = StoreOptions {
            backup: BackupPolicy {
                dir: temp.path().to_path_buf(),
                max_backups: 3,
            },
            ..StoreOptions::default()
        };
        let store = Store::init(backend.clone(), options)?;
        store.dispatch(Action::AddContentItem(goal("Before backup")));
        let path = store.write_backup()?;

        store.dispatch(Action::AddContentItem(goal("After backup")));
        store.dispatch(Action::SetTheme(ThemeMode::Light));
        store.flush();

        let restored = store.restore(backup::read_backup(&path)?)?;
        assert!(restored >= 2);
        let state = store.state();
        assert_eq!(state.content_items.len(), 1);
        assert_eq!(state.content_items[0].title, "Before backup");
        assert_eq!(state.theme, ThemeMode::Dark);
        assert!(backend.get_item("@ThousandMonths:theme")?.is_none());
        Ok(())
    }

    #[test]
    fn shutdown_backs_up_only_after_writes() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let backend = Arc::new(MemoryStore::with_items([(
            "@ThousandMonths:categories",
            r##"{"schemaVersion":1,"data":[{"id":"x","name":"X","color":"#000000","icon":"star"}]}"##,
        )]));
        let options = StoreOptions {
            backup: BackupPolicy {
                dir: temp.path().to_path_buf(),
                max_backups: 3,
            },
            backup_on_exit: true,
            ..StoreOptions::default()
        };

        let idle = Store::init(backend.clone(), options.clone())?;
        assert_eq!(idle.shutdown()?, None);

        let busy = Store::init(backend.clone(), options)?;
        busy.dispatch(Action::SetAccentColor("#123456".into()));
        let path = busy.shutdown()?.expect("backup written");
        assert!(path.exists());
        Ok(())
    }
}
