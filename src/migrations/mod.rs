//! Version-indexed upgrades for persisted focus areas.
//!
//! # Invariants
//! - Versions in [`FOCUS_AREA_MIGRATIONS`] are strictly increasing.
//! - Every step is idempotent, so re-running it on already migrated data is a no-op.
//! - Blobs from before versioning (version 0) run every step up to the target.

use serde_json::Value;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub mod focus_areas;

/// Focus areas always carry a rank-derived `priorityLevel`.
pub const RANK_PRIORITY_VERSION: u32 = 1;
/// Focus areas use the essential/important/supplemental scheme.
pub const PRIORITY_SCHEME_VERSION: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("focus-area schema version {target} is unknown; latest supported is {latest}")]
    UnsupportedTarget { target: u32, latest: u32 },
}

pub struct MigrationContext {
    pub now: String,
}

impl MigrationContext {
    pub fn now() -> Self {
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string());
        Self { now }
    }
}

struct Migration {
    version: u32,
    name: &'static str,
    needed: fn(&[Value]) -> bool,
    apply: fn(Vec<Value>, &MigrationContext) -> Vec<Value>,
}

const FOCUS_AREA_MIGRATIONS: &[Migration] = &[
    Migration {
        version: RANK_PRIORITY_VERSION,
        name: "rank-priority-level",
        needed: focus_areas::needs_rank_migration,
        apply: apply_rank_priority,
    },
    Migration {
        version: PRIORITY_SCHEME_VERSION,
        name: "priority-scheme",
        needed: focus_areas::needs_priority_scheme_migration,
        apply: apply_priority_scheme,
    },
];

fn apply_rank_priority(areas: Vec<Value>, _ctx: &MigrationContext) -> Vec<Value> {
    focus_areas::migrate_rank_priority(areas)
}

fn apply_priority_scheme(areas: Vec<Value>, ctx: &MigrationContext) -> Vec<Value> {
    focus_areas::migrate_priority_scheme(areas, &ctx.now)
}

/// Latest focus-area schema version this binary knows.
pub fn latest_version() -> u32 {
    FOCUS_AREA_MIGRATIONS
        .last()
        .map_or(0, |migration| migration.version)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upgrade {
    pub areas: Vec<Value>,
    pub version: u32,
    pub applied: Vec<&'static str>,
}

impl Upgrade {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Runs every step whose version lies in `(from, target]` and whose detection fires.
///
/// A blob already at or beyond `target` passes through untouched.
pub fn upgrade_focus_areas(
    areas: Vec<Value>,
    from: u32,
    target: u32,
    ctx: &MigrationContext,
) -> Result<Upgrade, MigrationError> {
    let latest = latest_version();
    if target > latest {
        return Err(MigrationError::UnsupportedTarget { target, latest });
    }

    let mut areas = areas;
    let mut applied = Vec::new();
    for migration in FOCUS_AREA_MIGRATIONS {
        if migration.version <= from || migration.version > target {
            continue;
        }
        if (migration.needed)(&areas) {
            tracing::info!(
                migration = migration.name,
                version = migration.version,
                count = areas.len(),
                "migrating focus areas"
            );
            areas = (migration.apply)(areas, ctx);
            applied.push(migration.name);
        }
    }

    Ok(Upgrade {
        areas,
        version: from.max(target),
        applied,
    })
}
