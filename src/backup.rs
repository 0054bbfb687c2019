//! JSON exports of every stored blob, written atomically and pruned to a fixed count.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::config::StorageOptions;

const BACKUP_PREFIX: &str = "backup-";
const BACKUP_EXTENSION: &str = "json";
const BACKUP_TMP_EXTENSION: &str = "json.tmp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPolicy {
    pub dir: PathBuf,
    /// 0 keeps every backup.
    pub max_backups: usize,
}

impl BackupPolicy {
    pub fn from_options(options: &StorageOptions) -> Self {
        Self {
            dir: options.backup_dir.clone(),
            max_backups: options.max_backups,
        }
    }
}

/// On-disk backup layout. Blobs that are JSON are embedded as JSON so the file
/// stays readable; anything else is kept as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub created_at: i64,
    pub key_prefix: String,
    pub entries: BTreeMap<String, Value>,
}

impl BackupDocument {
    pub fn from_blobs(key_prefix: &str, blobs: BTreeMap<String, String>) -> Self {
        let entries = blobs
            .into_iter()
            .map(|(key, raw)| {
                let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                (key, value)
            })
            .collect();
        Self {
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
            key_prefix: key_prefix.to_owned(),
            entries,
        }
    }

    /// Blobs as they should be written back to the key-value backend.
    pub fn into_blobs(self) -> Result<BTreeMap<String, String>> {
        self.entries
            .into_iter()
            .map(|(key, value)| {
                let raw = serde_json::to_string(&value)
                    .with_context(|| format!("re-encoding backup entry {key}"))?;
                Ok((key, raw))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    pub path: PathBuf,
    pub created_at: i64,
    seq: u32,
}

pub fn write_backup(policy: &BackupPolicy, document: &BackupDocument) -> Result<PathBuf> {
    fs::create_dir_all(&policy.dir)
        .with_context(|| format!("ensuring backup dir {}", policy.dir.display()))?;
    let json = serde_json::to_vec_pretty(document).context("serialising backup")?;

    let final_path = next_backup_path(&policy.dir, document.created_at);
    let tmp_path = final_path.with_extension(BACKUP_TMP_EXTENSION);
    fs::write(&tmp_path, &json)
        .with_context(|| format!("writing temporary backup {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &final_path)
        .with_context(|| format!("atomically persisting backup {}", final_path.display()))?;
    tracing::info!(
        path = %final_path.display(),
        entries = document.entries.len(),
        "wrote backup"
    );

    let pruned = prune(policy)?;
    if pruned > 0 {
        tracing::info!(pruned, "pruned old backups");
    }
    Ok(final_path)
}

pub fn read_backup(path: &Path) -> Result<BackupDocument> {
    let raw = fs::read(path).with_context(|| format!("reading backup {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing backup {}", path.display()))
}

/// Backups in `dir`, newest first.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupFile>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("reading backup dir {}", dir.display()))
        }
    };

    let mut backups = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(?err, "skipping unreadable backup entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some((created_at, seq)) = parse_backup_name(&path) {
            backups.push(BackupFile {
                path,
                created_at,
                seq,
            });
        }
    }
    backups.sort_by(|a, b| (b.created_at, b.seq).cmp(&(a.created_at, a.seq)));
    Ok(backups)
}

/// Deletes the oldest backups beyond the policy's limit and returns how many went.
pub fn prune(policy: &BackupPolicy) -> Result<usize> {
    if policy.max_backups == 0 {
        return Ok(0);
    }
    let backups = list_backups(&policy.dir)?;
    let mut removed = 0;
    for stale in backups.iter().skip(policy.max_backups) {
        match fs::remove_file(&stale.path) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("removing backup {}", stale.path.display()))
            }
        }
    }
    Ok(removed)
}

fn next_backup_path(dir: &Path, created_at: i64) -> PathBuf {
    let base = dir.join(format!("{BACKUP_PREFIX}{created_at}.{BACKUP_EXTENSION}"));
    if !base.exists() {
        return base;
    }
    (1..)
        .map(|seq| dir.join(format!("{BACKUP_PREFIX}{created_at}-{seq}.{BACKUP_EXTENSION}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}

fn parse_backup_name(path: &Path) -> Option<(i64, u32)> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(BACKUP_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.strip_prefix(BACKUP_PREFIX)?;
    match stem.split_once('-') {
        Some((secs, seq)) => Some((secs.parse().ok()?, seq.parse().ok()?)),
        None => Some((stem.parse().ok()?, 0)),
    }
}
