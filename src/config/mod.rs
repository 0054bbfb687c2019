use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::app::StateDefaults;
use crate::config::themes::AccentPalette;
use crate::migrations::{PRIORITY_SCHEME_VERSION, RANK_PRIORITY_VERSION};
use crate::model::settings::{DEFAULT_LIFE_EXPECTANCY, MAX_LIFE_EXPECTANCY};
use crate::model::ThemeMode;
use crate::storage::keys::DEFAULT_KEY_PREFIX;

pub mod themes;

const APP_DOMAIN: &str = "app";
const APP_ORG: &str = "ThousandMonths";
const APP_NAME: &str = "thousand-months";

pub const CONFIG_ENV: &str = "THOUSAND_MONTHS_CONFIG";
pub const DATA_ENV: &str = "THOUSAND_MONTHS_DATA";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths);
            self.write_default_config(&default_cfg)?;
            tracing::info!(path = %self.paths.config_file.display(), "wrote default config");
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths);
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var_os(CONFIG_ENV).map(PathBuf::from);
        let override_data = env::var_os(DATA_ENV).map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_root.join("state"));

        Ok(Self::rooted(config_dir, config_file, data_root, state_dir))
    }

    /// Lays out every path below an explicit config and data root.
    pub fn rooted(
        config_dir: PathBuf,
        config_file: PathBuf,
        data_dir: PathBuf,
        state_dir: PathBuf,
    ) -> Self {
        Self {
            database_path: data_dir.join("thousand-months.db"),
            backup_dir: data_dir.join("backups"),
            config_dir,
            config_file,
            data_dir,
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.backup_dir,
            &self.state_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageOptions,
    pub defaults: DefaultsConfig,
    pub migrations: MigrationOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) {
        self.storage.resolve(paths);
        if self.storage.key_prefix.trim().is_empty() {
            tracing::warn!("empty storage.key_prefix in config, falling back to default");
            self.storage.key_prefix = DEFAULT_KEY_PREFIX.to_owned();
        }
        if !(1..=MAX_LIFE_EXPECTANCY).contains(&self.defaults.life_expectancy) {
            tracing::warn!(
                value = self.defaults.life_expectancy,
                "life expectancy in config out of range, falling back to {DEFAULT_LIFE_EXPECTANCY}"
            );
            self.defaults.life_expectancy = DEFAULT_LIFE_EXPECTANCY;
        }
        if let Some(accent) = self.defaults.accent_color.take() {
            match AccentPalette::default().resolve(&accent) {
                Some(hex) => self.defaults.accent_color = Some(hex),
                None => tracing::warn!(%accent, "unknown accent colour in config, ignoring"),
            }
        }
    }

    pub fn state_defaults(&self) -> StateDefaults {
        StateDefaults {
            life_expectancy: self.defaults.life_expectancy,
            theme: self.defaults.theme,
            accent_color: self.defaults.accent_color.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    #[serde(skip)]
    pub backup_dir: PathBuf,
    pub key_prefix: String,
    pub wal_autocheckpoint: u32,
    pub busy_timeout_ms: u64,
    pub backup_on_exit: bool,
    /// Oldest backups beyond this count are pruned (0 = keep all).
    pub max_backups: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            backup_dir: PathBuf::new(),
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            wal_autocheckpoint: 1000,
            busy_timeout_ms: 5000,
            backup_on_exit: true,
            max_backups: 10,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        if self.backup_dir.as_os_str().is_empty() {
            self.backup_dir = paths.backup_dir.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub life_expectancy: u16,
    pub theme: ThemeMode,
    /// Preset name or `#rrggbb`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accent_color: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            life_expectancy: DEFAULT_LIFE_EXPECTANCY,
            theme: ThemeMode::Dark,
            accent_color: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Run the essential/important/supplemental step at boot.
    pub adopt_priority_scheme: bool,
}

impl MigrationOptions {
    /// Focus-area schema version the boot sequence migrates to.
    pub fn focus_target_version(&self) -> u32 {
        if self.adopt_priority_scheme {
            PRIORITY_SCHEME_VERSION
        } else {
            RANK_PRIORITY_VERSION
        }
    }
}
