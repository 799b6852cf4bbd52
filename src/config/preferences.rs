use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::quantity::Unit;

/// Per-user state that survives restarts. Distinct from [`super::AppConfig`],
/// which the user edits by hand; this file is rewritten by the program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Overrides `display.unit` from the config when set.
    pub unit: Option<Unit>,
    pub hide_completed: bool,
    pub last_sheet: Option<PathBuf>,
}

pub trait PreferenceStore {
    fn load(&self) -> Result<Preferences>;
    fn store(&self, preferences: &Preferences) -> Result<()>;
}

/// Reads and writes `preferences.toml`.
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FilePreferences {
    fn load(&self) -> Result<Preferences> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Preferences::default())
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading preferences {}", self.path.display()))
            }
        };
        match toml::from_str(&raw) {
            Ok(prefs) => Ok(prefs),
            Err(err) => {
                tracing::warn!(?err, path = %self.path.display(), "ignoring unreadable preferences");
                Ok(Preferences::default())
            }
        }
    }

    fn store(&self, preferences: &Preferences) -> Result<()> {
        let toml = toml::to_string_pretty(preferences).context("serializing preferences")?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating state dir {}", parent.display()))?;
        }
        let tmp_path = self.path.with_extension("toml.tmp");
        fs::write(&tmp_path, toml.as_bytes())
            .with_context(|| format!("writing temporary preferences {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("persisting preferences {}", self.path.display()))?;
        Ok(())
    }
}

/// Keeps preferences in memory only. One-shot commands use this so that
/// flags such as `--unit` do not leak into the next session.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    inner: RefCell<Preferences>,
}

impl MemoryPreferences {
    pub fn new(initial: Preferences) -> Self {
        Self {
            inner: RefCell::new(initial),
        }
    }

    pub fn snapshot(&self) -> Preferences {
        self.inner.borrow().clone()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn load(&self) -> Result<Preferences> {
        Ok(self.snapshot())
    }

    fn store(&self, preferences: &Preferences) -> Result<()> {
        *self.inner.borrow_mut() = preferences.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = FilePreferences::new(temp.path().join("preferences.toml"));
        assert_eq!(store.load()?, Preferences::default());
        Ok(())
    }

    #[test]
    fn stored_preferences_reload() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = FilePreferences::new(temp.path().join("state").join("preferences.toml"));
        let prefs = Preferences {
            unit: Some(Unit::Stack),
            hide_completed: true,
            last_sheet: Some(temp.path().join("base.csv")),
        };
        store.store(&prefs)?;
        assert_eq!(store.load()?, prefs);

        let raw = fs::read_to_string(store.path())?;
        assert!(raw.contains("unit = \"stack\""), "got {raw}");
        Ok(())
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("preferences.toml");
        fs::write(&path, "hide_completed = \"perhaps\"")?;
        assert_eq!(FilePreferences::new(path).load()?, Preferences::default());
        Ok(())
    }
}
