//! Settings edits made from the command line
//!
//! Each edit loads the stored config, changes one field, and saves it back.
//! Telling the daemon to reload is left to the caller.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::config::{ConfigStore, RegionSpec};
use crate::hotkey::Chord;
use crate::services::MonitorInfo;

pub fn set_hotkey(store: &dyn ConfigStore, chord: &Chord) -> Result<()> {
    let mut config = store.load()?;
    config.hotkey = chord.to_string();
    store.save(&config)?;
    info!(%chord, "hotkey saved");
    Ok(())
}

/// Store `"all"` or a display number
///
/// When `connected` is known, a number past the last monitor is refused.
pub fn set_monitor(
    store: &dyn ConfigStore,
    choice: &str,
    connected: Option<&[MonitorInfo]>,
) -> Result<RegionSpec> {
    let region = RegionSpec::try_from(choice.to_string()).map_err(anyhow::Error::msg)?;
    if let (RegionSpec::Display(n), Some(monitors)) = (region, connected) {
        if !monitors.iter().any(|m| m.number == n) {
            bail!("monitor {} is not connected ({} found)", n, monitors.len());
        }
    }

    let mut config = store.load()?;
    config.monitor = region;
    store.save(&config)?;
    info!(%region, "monitor saved");
    Ok(region)
}

/// Store a new save folder, creating it; `~` expands to the home directory
pub fn set_folder(store: &dyn ConfigStore, folder: &Path) -> Result<PathBuf> {
    let folder = absolute(&expand_home(folder))?;
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("failed to create {}", folder.display()))?;

    let mut config = store.load()?;
    config.save_folder = folder.clone();
    store.save(&config)?;
    info!(folder = %folder.display(), "save folder saved");
    Ok(folder)
}

/// Lines for `autoscreen monitors`, the current choice marked with `*`
pub fn describe_monitors(monitors: &[MonitorInfo], current: RegionSpec) -> Vec<String> {
    let mark = |selected: bool| if selected { '*' } else { ' ' };
    let mut lines = Vec::with_capacity(monitors.len() + 1);
    lines.push(format!(
        "{} all  All Monitors ({} connected)",
        mark(current == RegionSpec::AllDisplays),
        monitors.len()
    ));
    for monitor in monitors {
        lines.push(format!(
            "{} {:<3}  {}",
            mark(current == RegionSpec::Display(monitor.number)),
            monitor.number,
            monitor
        ));
    }
    lines
}

/// Show the save folder in the desktop file manager, creating it first
pub fn open_folder(store: &dyn ConfigStore) -> Result<PathBuf> {
    let folder = store.load()?.save_folder;
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("failed to create {}", folder.display()))?;

    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    debug!(opener, folder = %folder.display(), "opening folder");
    Command::new(opener)
        .arg(&folder)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to run {}", opener))?;
    Ok(folder)
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read the current directory")?;
    Ok(cwd.join(path))
}
