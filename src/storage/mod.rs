use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};

pub mod keys;
pub mod memory;
pub mod persistent;
mod schema;
pub mod writer;

pub use keys::{EntityKey, KeySpace, ONBOARDING_KEY};
pub use memory::MemoryStore;
pub use persistent::{OnboardingProgress, PersistentStore, Records, Versioned};
pub use writer::WriteQueue;

/// String-keyed blob storage. Implementations only move opaque text; encoding,
/// versioning and error policy live in [`PersistentStore`].
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
    fn all_keys(&self) -> Result<Vec<String>>;

    /// Removes every key starting with `prefix` and returns how many went.
    fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.all_keys()? {
            if key.starts_with(prefix) {
                self.remove_item(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WalCheckpointStats {
    pub busy_frames: i64,
    pub wal_frames: i64,
    pub checkpointed_frames: i64,
}

/// SQLite-backed [`KeyValueStore`]. Every operation opens its own connection,
/// so clones can be used from any thread.
#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn run_wal_health_check(&self) -> Result<WalCheckpointStats> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("PRAGMA wal_checkpoint(PASSIVE)")
                .context("preparing wal checkpoint pragma")?;
            let mut rows = stmt.query([]).context("executing wal checkpoint pragma")?;
            if let Some(row) = rows.next()? {
                Ok(WalCheckpointStats {
                    busy_frames: row.get(0)?,
                    wal_frames: row.get(1)?,
                    checkpointed_frames: row.get(2)?,
                })
            } else {
                bail!("wal checkpoint returned no rows");
            }
        })
    }

    /// Unix timestamp of the last write to `key`.
    pub fn updated_at(&self, key: &str) -> Result<Option<i64>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT updated_at FROM kv_store WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("reading timestamp for {key}"))
        })
    }
}

impl KeyValueStore for StorageHandle {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("reading {key}"))
        })
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value, now],
            )
            .with_context(|| format!("writing {key}"))?;
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])
                .with_context(|| format!("removing {key}"))?;
            Ok(())
        })
    }

    fn all_keys(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()
                .context("listing stored keys")?;
            Ok(keys)
        })
    }

    fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM kv_store WHERE substr(key, 1, length(?1)) = ?1",
                [prefix],
            )
            .with_context(|| format!("clearing keys under {prefix}"))
        })
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &paths.database_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    if !existed {
        tracing::info!(path = %db_path.display(), "created key-value database");
    }
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    conn.busy_timeout(std::time::Duration::from_millis(storage.busy_timeout_ms))
        .context("setting busy timeout")?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::init_storage;
    use super::*;

    #[test]
    fn set_get_remove_round_trip() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        assert_eq!(storage.get_item("missing")?, None);

        storage.set_item("@ThousandMonths:theme", "\"light\"")?;
        storage.set_item("@ThousandMonths:theme", "\"dark\"")?;
        assert_eq!(
            storage.get_item("@ThousandMonths:theme")?.as_deref(),
            Some("\"dark\"")
        );
        assert!(storage.updated_at("@ThousandMonths:theme")?.is_some());

        storage.remove_item("@ThousandMonths:theme")?;
        assert_eq!(storage.get_item("@ThousandMonths:theme")?, None);
        Ok(())
    }

    #[test]
    fn all_keys_are_sorted() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set_item("b", "2")?;
        storage.set_item("a", "1")?;
        assert_eq!(storage.all_keys()?, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    }

    #[test]
    fn clear_prefix_only_touches_matching_keys() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set_item("@ThousandMonths:theme", "1")?;
        storage.set_item("@ThousandMonths:seasons", "2")?;
        storage.set_item("@Other_App:theme", "3")?;
        assert_eq!(storage.clear_prefix("@ThousandMonths:")?, 2);
        assert_eq!(storage.all_keys()?, vec!["@Other_App:theme".to_string()]);
        Ok(())
    }

    #[test]
    fn wal_health_check_runs() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set_item("k", "v")?;
        let stats = storage.run_wal_health_check()?;
        assert!(stats.busy_frames >= 0);
        assert!(stats.checkpointed_frames <= stats.wal_frames);
        Ok(())
    }
}
