//! Desktop notifications using the `notify-rust` crate

use std::thread;

use tracing::{info, warn};

use super::Notifier;

const APP_NAME: &str = "AutoScreen";

/// Native notification center / freedesktop notifications
#[derive(Debug, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title, body, "notify");
        let title = title.to_string();
        let body = body.to_string();
        // Showing can block on the notification daemon
        let spawned = thread::Builder::new()
            .name("autoscreen-notify".into())
            .spawn(move || {
                if let Err(e) = notify_rust::Notification::new()
                    .appname(APP_NAME)
                    .summary(&title)
                    .body(&body)
                    .show()
                {
                    warn!(error = %e, "failed to show notification");
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to start notification thread");
        }
    }
}
