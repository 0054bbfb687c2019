use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::app::{Action, AppState, BootReport, Store};
use crate::backup;
use crate::model::{ContentKind, SettingsPatch};
use crate::storage::{OnboardingProgress, StorageHandle};
use crate::timeline::today_utc;

#[derive(Args, Debug, Clone)]
pub struct DispatchArgs {
    /// Action as JSON: {"type": "...", "payload": ...}
    pub action: String,
}

#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// Partial settings object, e.g. '{"lifeExpectancy": 90}'
    pub patch: String,
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Also move focus areas onto the essential/important/supplemental scheme
    #[arg(long)]
    pub adopt_priority_scheme: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    /// Backup file written by the `backup` command
    pub path: PathBuf,
}

pub fn status(store: &Store, storage: &StorageHandle) -> Result<()> {
    let state = store.state();
    print!(
        "{}",
        format_status(&state, store.onboarding_progress(), &store.boot_report())
    );
    println!("database      {}", storage.database_path().display());
    match storage.run_wal_health_check() {
        Ok(stats) => println!(
            "wal           {} frames, {} checkpointed, {} busy",
            stats.wal_frames, stats.checkpointed_frames, stats.busy_frames
        ),
        Err(err) => tracing::warn!(?err, "wal health check failed"),
    }
    Ok(())
}

pub fn dispatch(store: &Store, args: DispatchArgs) -> Result<()> {
    let action = Action::parse(&args.action).context("action must be valid JSON")?;
    if let Action::Unrecognized(kind) = &action {
        bail!("unrecognised action {kind:?}; nothing dispatched");
    }
    action.validate().context("action payload is invalid")?;
    let name = action.name();
    let before = store.state();
    let after = store.dispatch(action);
    if std::sync::Arc::ptr_eq(&before, &after) {
        println!("{name}: no change");
    } else {
        println!("{name}: applied");
    }
    print!(
        "{}",
        format_status(&after, store.onboarding_progress(), &store.boot_report())
    );
    Ok(())
}

pub fn settings(store: &Store, args: SettingsArgs) -> Result<()> {
    let patch = SettingsPatch::from_json(&args.patch).context("invalid settings patch")?;
    if patch.is_empty() {
        bail!("settings patch is empty");
    }
    let state = store.dispatch(Action::UpdateUserSettings(patch));
    let json = serde_json::to_string_pretty(&state.settings).context("serialising settings")?;
    println!("{json}");
    Ok(())
}

pub fn migrate(store: &Store) -> Result<()> {
    print!("{}", format_boot_report(&store.boot_report()));
    Ok(())
}

pub fn reset_onboarding(store: &Store) -> Result<()> {
    store.reset_onboarding()?;
    println!("Onboarding reset; birth date cleared.");
    Ok(())
}

pub fn backup(store: &Store) -> Result<()> {
    let path = store.write_backup()?;
    println!("Backup written to {}", path.display());
    Ok(())
}

pub fn restore(store: &Store, args: RestoreArgs) -> Result<()> {
    let document = backup::read_backup(&args.path)?;
    if document.key_prefix != store.persistent().keys().prefix() {
        tracing::warn!(
            backup = %document.key_prefix,
            current = store.persistent().keys().prefix(),
            "backup was taken under a different key prefix"
        );
    }
    let restored = store.restore(document)?;
    println!("Restored {restored} key(s) from {}", args.path.display());
    Ok(())
}

pub fn keys(store: &Store, storage: &StorageHandle) -> Result<()> {
    store.flush();
    let blobs = store.persistent().dump()?;
    let mut updated = BTreeMap::new();
    for key in blobs.keys() {
        if let Some(at) = storage.updated_at(key)? {
            updated.insert(key.clone(), at);
        }
    }
    print!("{}", format_keys(&blobs, &updated));
    Ok(())
}

fn format_status(
    state: &AppState,
    onboarding: Option<OnboardingProgress>,
    report: &BootReport,
) -> String {
    let mut out = String::new();
    let phase = if state.is_ready() { "ready" } else { "loading" };
    let _ = writeln!(&mut out, "state         {phase}");
    let _ = writeln!(
        &mut out,
        "birth date    {}",
        state.birth_date.as_deref().unwrap_or("(not set)")
    );
    if let Some(grid) = state.life_grid() {
        let today = today_utc();
        let _ = writeln!(
            &mut out,
            "months        {} lived, {} remaining of {}",
            grid.months_lived(today),
            grid.months_remaining(today),
            grid.total_months()
        );
    }
    let _ = writeln!(
        &mut out,
        "settings      life expectancy {}, theme {}",
        state.settings.life_expectancy, state.theme
    );
    let _ = writeln!(
        &mut out,
        "content       {} goals, {} memories, {} lessons, {} reflections",
        state.items_of_kind(ContentKind::Goal).count(),
        state.items_of_kind(ContentKind::Memory).count(),
        state.items_of_kind(ContentKind::Lesson).count(),
        state.items_of_kind(ContentKind::Reflection).count(),
    );
    let _ = writeln!(
        &mut out,
        "collections   {} seasons, {} focus areas (schema v{}), {} categories",
        state.seasons.len(),
        state.focus_areas.len(),
        report.focus_version,
        state.categories.len()
    );
    let onboarding = match onboarding {
        Some(progress) if progress.completed => "completed".to_string(),
        Some(progress) => format!("step {}", progress.step),
        None => "not started".to_string(),
    };
    let _ = writeln!(&mut out, "onboarding    {onboarding}");
    out
}

fn format_boot_report(report: &BootReport) -> String {
    let mut out = String::new();
    if report.migrations_applied.is_empty() {
        let _ = writeln!(
            &mut out,
            "Focus areas already at schema v{}; nothing to migrate.",
            report.focus_version
        );
    } else {
        let _ = writeln!(
            &mut out,
            "Migrated focus areas to schema v{}: {}",
            report.focus_version,
            report.migrations_applied.join(", ")
        );
    }
    if report.dropped_focus_areas > 0 {
        let _ = writeln!(
            &mut out,
            "Kept {} focus area(s) that could not be decoded as stored.",
            report.dropped_focus_areas
        );
    }
    if report.unreadable_records > 0 {
        let _ = writeln!(
            &mut out,
            "Kept {} other record(s) that could not be decoded as stored.",
            report.unreadable_records
        );
    }
    out
}

fn format_keys(blobs: &BTreeMap<String, String>, updated: &BTreeMap<String, i64>) -> String {
    if blobs.is_empty() {
        return "No keys stored.\n".to_string();
    }
    let mut out = String::new();
    for (key, raw) in blobs {
        let version = serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|value| value.get("schemaVersion").and_then(Value::as_u64))
            .map_or_else(|| "v0".to_string(), |version| format!("v{version}"));
        let mut line = format!("{key}  {version}  {} bytes", raw.len());
        if let Some(at) = updated.get(key) {
            let _ = write!(&mut line, "  updated {}", format_timestamp(*at));
        }
        let _ = writeln!(&mut out, "{line}");
    }
    out
}

fn format_timestamp(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| ts.to_string())
}
