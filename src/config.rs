//! Configuration loading and management
//!
//! The config lives in a small JSON file (`~/.autoscreen_config.json` by
//! default). Missing keys fall back to defaults, so older files keep working.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "AUTOSCREEN_CONFIG";

const CONFIG_FILE_NAME: &str = ".autoscreen_config.json";

/// Which part of the desktop to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RegionSpec {
    /// Every display as one image
    #[default]
    AllDisplays,
    /// A single display, numbered from 1
    Display(u32),
}

impl TryFrom<String> for RegionSpec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            return Ok(RegionSpec::AllDisplays);
        }
        match value.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(RegionSpec::Display(n)),
            _ => Err(format!("monitor must be \"all\" or a display number, got {:?}", value)),
        }
    }
}

impl From<RegionSpec> for String {
    fn from(region: RegionSpec) -> Self {
        region.to_string()
    }
}

impl fmt::Display for RegionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionSpec::AllDisplays => f.write_str("all"),
            RegionSpec::Display(n) => write!(f, "{}", n),
        }
    }
}

/// User settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory screenshots are written to
    pub save_folder: PathBuf,

    /// Display selection for captures
    pub monitor: RegionSpec,

    /// Hotkey in canonical chord form, e.g. `ctrl+shift+s`
    pub hotkey: String,
}

impl Default for Config {
    fn default() -> Self {
        let home = home_dir();
        Self {
            save_folder: home.join("Screenshots"),
            monitor: RegionSpec::AllDisplays,
            hotkey: default_hotkey().to_string(),
        }
    }
}

fn default_hotkey() -> &'static str {
    if cfg!(target_os = "macos") {
        "shift+super+s"
    } else {
        "ctrl+shift+s"
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Persistence for [`Config`]
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Config>;
    fn save(&self, config: &Config) -> Result<()>;
}

/// Stores the config as pretty-printed JSON
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$AUTOSCREEN_CONFIG`, or `~/.autoscreen_config.json`
    pub fn from_env() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir().join(CONFIG_FILE_NAME));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self) -> Result<Config> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };

        match serde_json::from_str(&text) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "malformed config file, using defaults");
                Ok(Config::default())
            }
        }
    }

    fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(config).context("failed to encode config")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(path = ?self.path, "config saved");
        Ok(())
    }
}
