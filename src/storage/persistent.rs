//! Typed save/load pairs over the key-value backend.
//!
//! Every blob is written as `{"schemaVersion": N, "data": ...}`. Blobs written
//! before versioning existed carry no envelope and read back as version 0.
//!
//! Failures never escape this layer: a read that fails or does not decode is
//! logged and reported as absent, and a write that fails is logged and skipped.
//! List blobs decode record by record; records that do not decode are retained
//! as raw JSON and written back with the list, so they are never lost.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::keys::{EntityKey, KeySpace, ONBOARDING_KEY};
use super::writer::{WriteQueue, WriterStats};
use super::KeyValueStore;
use crate::model::{Category, ContentItem, FocusArea, Season, ThemeMode, UserData, UserSettings};

/// Schema version of every entity except focus areas, which migrate on their own chain.
pub const ENTITY_SCHEMA_VERSION: u32 = 1;

const VERSION_FIELD: &str = "schemaVersion";
const DATA_FIELD: &str = "data";

#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u32,
    pub data: T,
}

/// A stored list split into the records that decoded and the raw ones that did not.
#[derive(Debug, Clone, PartialEq)]
pub struct Records<T> {
    pub items: Vec<T>,
    pub rejected: Vec<Value>,
}

impl<T: DeserializeOwned> Records<T> {
    pub fn decode(raw: Vec<Value>, key: &str) -> Self {
        let mut items = Vec::with_capacity(raw.len());
        let mut rejected = Vec::new();
        for (index, value) in raw.into_iter().enumerate() {
            match T::deserialize(&value) {
                Ok(item) => items.push(item),
                Err(err) => {
                    tracing::warn!(key, index, %err, "record does not decode; keeping it as stored");
                    rejected.push(value);
                }
            }
        }
        Self { items, rejected }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a, T> {
    schema_version: u32,
    data: &'a T,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnboardingProgress {
    pub step: u8,
    pub completed: bool,
}

pub struct PersistentStore {
    backend: Arc<dyn KeyValueStore>,
    keys: KeySpace,
    writer: WriteQueue,
    focus_schema_version: AtomicU32,
    retained: Mutex<HashMap<EntityKey, Vec<Value>>>,
}

impl PersistentStore {
    pub fn new(
        backend: Arc<dyn KeyValueStore>,
        keys: KeySpace,
        focus_schema_version: u32,
    ) -> Result<Self> {
        let writer = WriteQueue::spawn(Arc::clone(&backend))?;
        Ok(Self {
            backend,
            keys,
            writer,
            focus_schema_version: AtomicU32::new(focus_schema_version),
            retained: Mutex::new(HashMap::new()),
        })
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Version stamped on focus-area writes.
    pub fn focus_schema_version(&self) -> u32 {
        self.focus_schema_version.load(Ordering::Acquire)
    }

    /// Records the version the loaded focus areas are at, which may be newer
    /// than the one boot migrates to.
    pub fn set_focus_schema_version(&self, version: u32) {
        self.focus_schema_version.store(version, Ordering::Release);
    }

    /// Keeps `rejected` records of `entity` so later saves write them back.
    pub fn retain_rejected(&self, entity: EntityKey, rejected: Vec<Value>) {
        let mut retained = self.retained.lock();
        if rejected.is_empty() {
            retained.remove(&entity);
        } else {
            retained.insert(entity, rejected);
        }
    }

    pub fn rejected_count(&self, entity: EntityKey) -> usize {
        self.retained.lock().get(&entity).map_or(0, Vec::len)
    }

    pub fn forget_rejected(&self) {
        self.retained.lock().clear();
    }

    pub fn get_user_data(&self) -> Option<UserData> {
        self.read_entity(EntityKey::UserData)
    }

    pub fn save_user_data(&self, user: &UserData) {
        self.write_entity(EntityKey::UserData, user);
    }

    pub fn get_content_items(&self) -> Option<Vec<ContentItem>> {
        self.read_records(EntityKey::ContentItems)
            .map(|records| records.items)
    }

    pub fn save_content_items(&self, items: &[ContentItem]) {
        self.write_list(EntityKey::ContentItems, ENTITY_SCHEMA_VERSION, items);
    }

    pub fn get_seasons(&self) -> Option<Vec<Season>> {
        self.read_records(EntityKey::Seasons).map(|records| records.items)
    }

    pub fn save_seasons(&self, seasons: &[Season]) {
        self.write_list(EntityKey::Seasons, ENTITY_SCHEMA_VERSION, seasons);
    }

    /// Reads a list entity record by record.
    pub fn read_records<T: DeserializeOwned>(&self, entity: EntityKey) -> Option<Records<T>> {
        let key = self.keys.key(entity);
        let Versioned { version, data } = self.read_list(&key)?;
        warn_if_newer(&key, version);
        Some(Records::decode(data, &key))
    }

    /// Focus areas come back undecoded so the migration chain can inspect fields
    /// that the typed record cannot represent (missing levels, allocations).
    pub fn get_focus_areas_raw(&self) -> Option<Versioned<Vec<Value>>> {
        self.read_list(&self.keys.key(EntityKey::FocusAreas))
    }

    pub fn save_focus_areas(&self, areas: &[FocusArea]) {
        self.write_list(EntityKey::FocusAreas, self.focus_schema_version(), areas);
    }

    pub fn get_user_settings(&self) -> Option<UserSettings> {
        self.read_entity(EntityKey::UserSettings)
    }

    pub fn save_user_settings(&self, settings: &UserSettings) {
        self.write_entity(EntityKey::UserSettings, settings);
    }

    pub fn get_categories(&self) -> Option<Vec<Category>> {
        self.read_records(EntityKey::Categories)
            .map(|records| records.items)
    }

    pub fn save_categories(&self, categories: &[Category]) {
        self.write_list(EntityKey::Categories, ENTITY_SCHEMA_VERSION, categories);
    }

    pub fn get_birth_date(&self) -> Option<String> {
        self.read_entity::<Option<String>>(EntityKey::UserBirthDate)
            .flatten()
            .filter(|date| !date.trim().is_empty())
    }

    /// `None` removes the key rather than storing a null.
    pub fn save_birth_date(&self, birth_date: Option<&str>) {
        let key = self.keys.key(EntityKey::UserBirthDate);
        match birth_date {
            Some(date) => self.enqueue(key, ENTITY_SCHEMA_VERSION, &date),
            None => self.writer.remove(key),
        }
    }

    pub fn get_theme(&self) -> Option<ThemeMode> {
        self.read_entity(EntityKey::Theme)
    }

    pub fn save_theme(&self, theme: ThemeMode) {
        self.write_entity(EntityKey::Theme, &theme);
    }

    pub fn get_onboarding_progress(&self) -> Option<OnboardingProgress> {
        self.read_key(ONBOARDING_KEY)
    }

    pub fn save_onboarding_progress(&self, progress: OnboardingProgress) {
        self.enqueue(ONBOARDING_KEY.to_owned(), ENTITY_SCHEMA_VERSION, &progress);
    }

    pub fn clear_onboarding_progress(&self) {
        self.writer.remove(ONBOARDING_KEY.to_owned());
    }

    /// Raw blobs of every key this application owns, read straight from the backend.
    pub fn dump(&self) -> Result<BTreeMap<String, String>> {
        let mut blobs = BTreeMap::new();
        let keys = self.backend.all_keys().context("listing stored keys")?;
        for key in keys.into_iter().filter(|key| self.keys.owns(key)) {
            if let Some(value) = self
                .backend
                .get_item(&key)
                .with_context(|| format!("reading {key}"))?
            {
                blobs.insert(key, value);
            }
        }
        Ok(blobs)
    }

    /// Queues a raw blob as-is; used when restoring a backup.
    pub fn put_raw(&self, key: String, value: String) {
        self.writer.put(key, value);
    }

    /// Drops every key this application owns. Pending writes land first so
    /// nothing queued earlier resurrects a cleared key.
    pub fn clear(&self) -> Result<usize> {
        self.writer.flush();
        let namespace = format!("{}:", self.keys.prefix());
        let mut removed = self
            .backend
            .clear_prefix(&namespace)
            .with_context(|| format!("clearing {namespace}"))?;
        if self.backend.get_item(ONBOARDING_KEY)?.is_some() {
            self.backend
                .remove_item(ONBOARDING_KEY)
                .context("clearing onboarding progress")?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn flush(&self) {
        self.writer.flush();
    }

    pub fn writer_stats(&self) -> WriterStats {
        self.writer.stats()
    }

    pub fn shutdown(&self) {
        self.writer.shutdown();
    }

    fn read_entity<T: DeserializeOwned>(&self, entity: EntityKey) -> Option<T> {
        self.read_key(&self.keys.key(entity))
    }

    fn read_key<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Versioned { version, data } = self.read_raw(key)?;
        warn_if_newer(key, version);
        match serde_json::from_value(data) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(?err, key, "stored blob does not decode; treating as absent");
                None
            }
        }
    }

    fn read_list(&self, key: &str) -> Option<Versioned<Vec<Value>>> {
        let Versioned { version, data } = self.read_raw(key)?;
        match data {
            Value::Array(records) => Some(Versioned {
                version,
                data: records,
            }),
            Value::Null => None,
            other => {
                tracing::warn!(key, kind = json_kind(&other), "stored blob is not a list; ignoring");
                None
            }
        }
    }

    fn read_raw(&self, key: &str) -> Option<Versioned<Value>> {
        match self.backend.get_item(key) {
            Ok(Some(raw)) => Some(decode_envelope(&raw)),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(?err, key, "reading stored blob failed; treating as absent");
                None
            }
        }
    }

    fn write_entity<T: Serialize>(&self, entity: EntityKey, value: &T) {
        self.enqueue(self.keys.key(entity), ENTITY_SCHEMA_VERSION, value);
    }

    /// Writes `items` followed by any retained records of `entity`.
    fn write_list<T: Serialize>(&self, entity: EntityKey, version: u32, items: &[T]) {
        let key = self.keys.key(entity);
        let retained = self.retained.lock().get(&entity).cloned();
        let Some(retained) = retained else {
            self.enqueue(key, version, &items);
            return;
        };
        let encoded: Result<Vec<Value>, _> = items.iter().map(serde_json::to_value).collect();
        match encoded {
            Ok(mut records) => {
                records.extend(retained);
                self.enqueue(key, version, &records);
            }
            Err(err) => {
                tracing::warn!(?err, key = %key, "serialising records failed; write skipped");
            }
        }
    }

    fn enqueue<T: Serialize>(&self, key: String, version: u32, value: &T) {
        let envelope = Envelope {
            schema_version: version,
            data: value,
        };
        match serde_json::to_string(&envelope) {
            Ok(json) => self.writer.put(key, json),
            Err(err) => {
                tracing::warn!(?err, key = %key, "serialising blob failed; write skipped");
            }
        }
    }
}

/// Splits a stored blob into version and payload. Text that is not JSON is read
/// as a bare string, which is how some early builds stored scalar values.
fn decode_envelope(raw: &str) -> Versioned<Value> {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(_) => {
            return Versioned {
                version: 0,
                data: Value::String(raw.to_owned()),
            }
        }
    };
    if let Value::Object(map) = &value {
        if map.len() == 2 {
            if let (Some(version), Some(data)) = (
                map.get(VERSION_FIELD).and_then(Value::as_u64),
                map.get(DATA_FIELD),
            ) {
                return Versioned {
                    version: u32::try_from(version).unwrap_or(u32::MAX),
                    data: data.clone(),
                };
            }
        }
    }
    Versioned {
        version: 0,
        data: value,
    }
}

fn warn_if_newer(key: &str, version: u32) {
    if version > ENTITY_SCHEMA_VERSION {
        tracing::warn!(
            key,
            version,
            known = ENTITY_SCHEMA_VERSION,
            "blob written by a newer schema; decoding best-effort"
        );
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
