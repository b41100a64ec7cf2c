//! Signal handling for shutdown and config reload

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

/// What the daemon should do in response to a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// SIGHUP: re-read the config file and re-register the hotkey
    Reload,
    /// SIGTERM or SIGINT
    Shutdown,
}

/// Handles SIGTERM, SIGINT and SIGHUP
pub struct Signals {
    sigterm: Signal,
    sigint: Signal,
    sighup: Signal,
}

impl Signals {
    /// Register the handlers; must be called inside a tokio runtime
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
            sighup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next signal
    pub async fn next(&mut self) -> LifecycleEvent {
        tokio::select! {
            _ = self.sigterm.recv() => {
                debug!("received SIGTERM");
                LifecycleEvent::Shutdown
            }
            _ = self.sigint.recv() => {
                debug!("received SIGINT");
                LifecycleEvent::Shutdown
            }
            _ = self.sighup.recv() => {
                debug!("received SIGHUP");
                LifecycleEvent::Reload
            }
        }
    }
}
