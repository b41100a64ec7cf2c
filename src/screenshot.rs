//! Screenshot task run for every hotkey activation

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{error, info, warn};

use crate::config::{Config, ConfigStore};
use crate::events::{Activation, ActivationHandler};
use crate::services::{CaptureService, ClipboardService, Image, Notifier};

const FILE_PREFIX: &str = "screenshot_";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Capture, save, copy, notify
pub struct ScreenshotTask {
    capture: Arc<dyn CaptureService>,
    clipboard: Arc<dyn ClipboardService>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn ConfigStore>,
}

impl ScreenshotTask {
    pub fn new(
        capture: Arc<dyn CaptureService>,
        clipboard: Arc<dyn ClipboardService>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            capture,
            clipboard,
            notifier,
            store,
        }
    }

    /// Take one screenshot for a hotkey press and return where it was written
    pub fn take(&self, activation: &Activation) -> Result<PathBuf> {
        self.take_at(activation.at)
    }

    /// Take one screenshot named after `at`
    pub fn take_at(&self, at: SystemTime) -> Result<PathBuf> {
        // Settings are re-read each time so edits apply without a restart
        let config = self.store.load()?;
        let image = self.capture.grab(&config.monitor)?;
        let path = self.save(&config, &image, at)?;

        let copied = match self.clipboard.publish(&image) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to copy screenshot to clipboard");
                false
            }
        };

        let file_name = display_name(&path);
        let body = if copied {
            format!("{} (copied to clipboard)", file_name)
        } else {
            file_name
        };
        self.notifier.notify("Screenshot Saved", &body);
        Ok(path)
    }

    fn save(&self, config: &Config, image: &Image, at: SystemTime) -> Result<PathBuf> {
        std::fs::create_dir_all(&config.save_folder).with_context(|| {
            format!("failed to create {}", config.save_folder.display())
        })?;

        let stamp = DateTime::<Local>::from(at).format(TIMESTAMP_FORMAT);
        let stem = format!("{}{}", FILE_PREFIX, stamp);
        write_unique(&config.save_folder, &stem, &image.png)
    }
}

impl ActivationHandler for ScreenshotTask {
    fn handle(&self, activation: &Activation) {
        match self.take(activation) {
            Ok(path) => info!(seq = activation.seq, path = %path.display(), "screenshot saved"),
            Err(e) => {
                error!(seq = activation.seq, error = %e, "screenshot failed");
                self.notifier.notify("Error", &format!("Screenshot failed: {:#}", e));
            }
        }
    }
}

/// Two shots in the same second get `_2`, `_3`, ... instead of overwriting
fn write_unique(dir: &Path, stem: &str, bytes: &[u8]) -> Result<PathBuf> {
    let mut attempt = 1u32;
    loop {
        let name = if attempt == 1 {
            format!("{}.png", stem)
        } else {
            format!("{}_{}.png", stem, attempt)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to create {}", path.display()))
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
