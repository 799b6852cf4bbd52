use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use strum::{Display, EnumString};

use crate::quantity::{StackGeometry, Unit, DEFAULT_CONTAINER_SLOTS, DEFAULT_STACK_SIZE};
use crate::table::{DisplayOptions, DEFAULT_MAX_MULTIPLIER};

pub mod preferences;

pub use preferences::{FilePreferences, MemoryPreferences, PreferenceStore, Preferences};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Matlist";
const APP_NAME: &str = "matlist";
const DEFAULT_BACKUP_SUFFIX: &str = ".bak";

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
            default_cfg.post_load();
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load();
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
    pub state_dir: PathBuf,
    pub preferences_file: PathBuf,
    pub log_file: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("MATLIST_CONFIG").ok().map(PathBuf::from);
        let override_state = env::var("MATLIST_STATE").ok().map(PathBuf::from);

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

        let state_dir = override_state.unwrap_or_else(|| {
            project_dirs
                .state_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| project_dirs.data_dir().join("state"))
        });

        Ok(Self::rooted(config_dir, config_file, state_dir))
    }

    /// Paths with every file placed under the two given directories.
    pub fn rooted(config_dir: PathBuf, config_file: PathBuf, state_dir: PathBuf) -> Self {
        let preferences_file = state_dir.join("preferences.toml");
        let log_file = state_dir.join("matlist.log");
        Self {
            config_dir,
            config_file,
            state_dir,
            preferences_file,
            log_file,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.state_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub display: DisplayConfig,
    pub auto_save: AutoSaveConfig,
    pub storage: StorageOptions,
    pub projection: ProjectionConfig,
}

impl AppConfig {
    fn post_load(&mut self) {
        if self.storage.backup_suffix.trim().is_empty() {
            tracing::warn!("empty backup suffix in config, falling back to {DEFAULT_BACKUP_SUFFIX}");
            self.storage.backup_suffix = DEFAULT_BACKUP_SUFFIX.to_string();
        }
        if self.projection.max_multiplier == 0 {
            tracing::warn!("max_multiplier must be at least 1, using {DEFAULT_MAX_MULTIPLIER}");
            self.projection.max_multiplier = DEFAULT_MAX_MULTIPLIER;
        }
        if self.display.stack_size == 0 || self.display.container_slots == 0 {
            tracing::warn!("stack geometry must be positive, using 64 x 27");
            self.display.stack_size = DEFAULT_STACK_SIZE;
            self.display.container_slots = DEFAULT_CONTAINER_SLOTS;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub unit: Unit,
    pub stack_size: u32,
    pub container_slots: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            unit: Unit::Item,
            stack_size: DEFAULT_STACK_SIZE,
            container_slots: DEFAULT_CONTAINER_SLOTS,
        }
    }
}

impl DisplayConfig {
    pub fn geometry(&self) -> StackGeometry {
        StackGeometry::new(self.stack_size, self.container_slots)
    }

    pub fn options(&self) -> DisplayOptions {
        DisplayOptions {
            unit: self.unit,
            geometry: self.geometry(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum CommitPolicy {
    /// Write after every change.
    #[default]
    Immediate,
    /// Write once changes have been quiet for the debounce window.
    Debounced,
    /// Write only when asked.
    Manual,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub policy: CommitPolicy,
    #[serde(rename = "debounce_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub debounce: Duration,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            policy: CommitPolicy::Immediate,
            debounce: Duration::from_millis(800),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// Appended to the sheet path to name its single backup generation.
    pub backup_suffix: String,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub max_multiplier: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            max_multiplier: DEFAULT_MAX_MULTIPLIER,
        }
    }
}
