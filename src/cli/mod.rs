use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::{Store, StoreOptions};
use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::migrations::PRIORITY_SCHEME_VERSION;
use crate::storage;

pub mod commands;

use self::commands::{DispatchArgs, MigrateArgs, RestoreArgs, SettingsArgs};

#[derive(Parser, Debug)]
#[command(
    name = "thousand-months",
    version,
    about = "Inspect and operate the life-timeline store"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over THOUSAND_MONTHS_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over THOUSAND_MONTHS_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarise the loaded state (default)
    Status,
    /// Dispatch a JSON action, e.g. '{"type":"SET_THEME","payload":"light"}'
    Dispatch(DispatchArgs),
    /// Apply a partial settings patch given as JSON
    Settings(SettingsArgs),
    /// Migrate stored focus areas and report what changed
    Migrate(MigrateArgs),
    /// Forget onboarding progress and the birth date
    ResetOnboarding,
    /// Write a JSON backup of every stored blob
    Backup,
    /// Replace stored data with the contents of a backup file
    Restore(RestoreArgs),
    /// List stored keys with their schema versions
    Keys,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&paths, &config.storage)?;

    let command = cli.command.unwrap_or(Commands::Status);
    let mut options = StoreOptions::from_config(&config);
    if let Commands::Migrate(args) = &command {
        if args.adopt_priority_scheme {
            options.focus_target_version = PRIORITY_SCHEME_VERSION;
        }
    }
    let store = Store::init(Arc::new(storage.clone()), options).context("opening store")?;

    let outcome = match command {
        Commands::Status => commands::status(&store, &storage),
        Commands::Dispatch(args) => commands::dispatch(&store, args),
        Commands::Settings(args) => commands::settings(&store, args),
        Commands::Migrate(_) => commands::migrate(&store),
        Commands::ResetOnboarding => commands::reset_onboarding(&store),
        Commands::Backup => commands::backup(&store),
        Commands::Restore(args) => commands::restore(&store, args),
        Commands::Keys => commands::keys(&store, &storage),
    };

    let shutdown = store.shutdown();
    if let Ok(Some(path)) = &shutdown {
        tracing::info!(path = %path.display(), "wrote exit backup");
    }
    outcome?;
    shutdown.map(|_| ())
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
