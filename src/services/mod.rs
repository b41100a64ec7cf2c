//! Collaborators used when a hotkey fires
//!
//! Screen capture, clipboard and user notifications sit behind small traits
//! so the screenshot task can be exercised without a desktop session.

mod capture;
mod clipboard;
mod notifier;

use anyhow::Result;

use crate::config::RegionSpec;

pub use capture::{MonitorInfo, ScreenCapture};
pub use clipboard::SystemClipboard;
pub use notifier::DesktopNotifier;

/// An encoded PNG, passed through untouched from capture to disk and clipboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub png: Vec<u8>,
}

impl Image {
    pub fn from_png(png: Vec<u8>) -> Self {
        Self { png }
    }

    pub fn len(&self) -> usize {
        self.png.len()
    }

    pub fn is_empty(&self) -> bool {
        self.png.is_empty()
    }
}

/// Grabs screen contents
pub trait CaptureService: Send + Sync {
    fn grab(&self, region: &RegionSpec) -> Result<Image>;
}

/// Places an image on the system clipboard
pub trait ClipboardService: Send + Sync {
    fn publish(&self, image: &Image) -> Result<()>;
}

/// Fire-and-forget user feedback
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}
