//! autoscreen: background screenshot daemon
//!
//! Usage:
//! - `autoscreen` runs the daemon
//! - `autoscreen record` captures a new hotkey from the terminal
//! - `autoscreen bind <chord>` sets the hotkey directly
//! - `autoscreen shot` takes one screenshot now
//! - `autoscreen monitors` lists displays, numbered left to right
//! - `autoscreen monitor <all|n>` picks what to capture
//! - `autoscreen folder <path>` sets where screenshots go
//! - `autoscreen open` opens the screenshots folder
//!
//! Configuration commands save the config file and ask a running daemon to
//! reload it (SIGHUP).

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use autoscreen::binding::{BindingError, BindingManager};
use autoscreen::config::{ConfigStore, JsonConfigStore};
use autoscreen::events::{run_worker, ACTIVATION_QUEUE};
use autoscreen::hotkey::{self, record_chord, Chord, HotkeyListener, ListenerFailure, TerminalCapture};
use autoscreen::lifecycle::{self, LifecycleEvent, Signals, SingleInstanceGuard};
use autoscreen::screenshot::ScreenshotTask;
use autoscreen::services::{DesktopNotifier, Notifier, ScreenCapture, SystemClipboard};
use autoscreen::settings;

const USAGE: &str = "usage: autoscreen [record | bind <chord> | shot | monitors | monitor <all|n> | folder <path> | open]";

const RECORD_TIMEOUT: Duration = Duration::from_secs(30);
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => run_daemon().await,
        ["record"] => record(),
        ["bind", chord] => bind(chord),
        ["shot"] => shot(),
        ["monitors"] => list_monitors(),
        ["monitor", choice] => choose_monitor(choice),
        ["folder", path] => choose_folder(Path::new(path)),
        ["open"] => open_folder(),
        _ => {
            eprintln!("{}", USAGE);
            bail!("unrecognized arguments: {}", args.join(" "));
        }
    }
}

async fn run_daemon() -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "autoscreen starting");

    let notifier: Arc<dyn Notifier> = Arc::new(DesktopNotifier);
    let store = Arc::new(JsonConfigStore::from_env());
    info!(path = %store.path().display(), exists = store.exists(), "using config file");

    let Some(_instance) = SingleInstanceGuard::acquire(lifecycle::default_lock_path())
        .context("failed to take the instance lock")?
    else {
        notifier.notify("Already Running", "AutoScreen is already running");
        return Ok(());
    };

    let mut signals = Signals::new().context("failed to register signal handlers")?;

    let (backend, resolver) = hotkey::platform::native()?;
    let (activation_tx, activation_rx) = mpsc::channel(ACTIVATION_QUEUE);
    let (failure_tx, mut failures) = mpsc::unbounded_channel();
    let listener = HotkeyListener::new(backend, resolver, activation_tx).with_failure_reports(failure_tx);
    let mut bindings = BindingManager::new(listener, store.clone());

    let task = ScreenshotTask::new(
        Arc::new(ScreenCapture),
        Arc::new(SystemClipboard::new()?),
        notifier.clone(),
        store.clone(),
    );
    let worker = tokio::spawn(run_worker(activation_rx, Arc::new(task)));

    // Listener startup blocks until the hook reports readiness
    match tokio::task::block_in_place(|| bindings.register_from_config()) {
        Ok(chord) => {
            info!(%chord, "daemon initialized, entering main loop");
            notifier.notify("AutoScreen Running", &format!("Press {} to take a screenshot", chord.label()));
        }
        Err(e) => {
            error!(error = %e, "failed to register hotkey");
            warn!("continuing without a hotkey; fix the config and send SIGHUP");
            notifier.notify("Error", &registration_hint(&e));
        }
    }

    loop {
        tokio::select! {
            event = signals.next() => match event {
                LifecycleEvent::Reload => reload(&mut bindings, store.as_ref(), notifier.as_ref()),
                LifecycleEvent::Shutdown => {
                    info!("shutdown signal received");
                    break;
                }
            },
            // The manager keeps a sender alive, so this never yields None
            Some(failure) = failures.recv() => {
                listener_died(&mut bindings, &failure, notifier.as_ref());
            }
        }
    }

    info!("shutting down...");
    tokio::task::block_in_place(|| {
        bindings.shutdown();
        drop(bindings);
    });
    // The queue closes once the last listener is gone
    match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, worker).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "activation worker failed"),
        Err(_) => warn!("activation worker still busy, exiting anyway"),
    }

    info!("autoscreen stopped");
    Ok(())
}

fn reload(bindings: &mut BindingManager, store: &dyn ConfigStore, notifier: &dyn Notifier) {
    let hotkey = match store.load() {
        Ok(config) => config.hotkey,
        Err(e) => {
            warn!(error = %e, "failed to reload config, keeping current hotkey");
            return;
        }
    };
    match tokio::task::block_in_place(|| bindings.register_hotkey(&hotkey)) {
        Ok(chord) => notifier.notify("Settings Reloaded", &format!("Press {} to take a screenshot", chord.label())),
        Err(e) => {
            warn!(hotkey, error = %e, "reload rejected, keeping current hotkey");
            notifier.notify("Error", &registration_hint(&e));
        }
    }
}

fn listener_died(bindings: &mut BindingManager, failure: &ListenerFailure, notifier: &dyn Notifier) {
    if tokio::task::block_in_place(|| bindings.listener_failed(failure)) {
        error!(chord = %failure.chord, error = %failure.error, "hotkey listener died");
        notifier.notify(
            "Hotkey Stopped",
            &format!(
                "{} no longer works: {}. Send SIGHUP or restart AutoScreen to retry",
                failure.chord.label(),
                failure.error
            ),
        );
    }
}

fn registration_hint(err: &BindingError) -> String {
    match err {
        BindingError::Hotkey(hotkey::HotkeyError::PermissionDenied(_)) => {
            if cfg!(target_os = "macos") {
                "Grant Accessibility/Input Monitoring permission, then restart AutoScreen".to_string()
            } else {
                "Add your user to the 'input' group to read keyboard devices".to_string()
            }
        }
        other => format!("Hotkey not registered: {}", other),
    }
}

fn record() -> Result<()> {
    println!("Press the new hotkey (Esc to cancel)...");
    let chord = {
        let mut capture = TerminalCapture::new().context("failed to open the terminal")?;
        record_chord(&mut capture, Some(RECORD_TIMEOUT))
    };
    match chord {
        Ok(chord) => save_hotkey(chord),
        Err(e) => {
            println!("{}", e);
            Ok(())
        }
    }
}

fn bind(text: &str) -> Result<()> {
    let chord: Chord = text.parse()?;
    save_hotkey(chord)
}

fn save_hotkey(chord: Chord) -> Result<()> {
    settings::set_hotkey(&JsonConfigStore::from_env(), &chord)?;
    println!("Hotkey set to {} ({})", chord.label(), chord);
    notify_daemon()
}

fn shot() -> Result<()> {
    let store = Arc::new(JsonConfigStore::from_env());
    let task = ScreenshotTask::new(
        Arc::new(ScreenCapture),
        Arc::new(SystemClipboard::new()?),
        Arc::new(DesktopNotifier),
        store,
    );
    let path = task.take_at(SystemTime::now())?;
    println!("Saved {}", path.display());
    Ok(())
}

fn list_monitors() -> Result<()> {
    let current = JsonConfigStore::from_env().load()?.monitor;
    let monitors = ScreenCapture.monitors()?;
    for line in settings::describe_monitors(&monitors, current) {
        println!("{}", line);
    }
    Ok(())
}

fn choose_monitor(choice: &str) -> Result<()> {
    let connected = match ScreenCapture.monitors() {
        Ok(monitors) => Some(monitors),
        Err(e) => {
            warn!(error = %e, "could not list monitors, saving without checking");
            None
        }
    };
    let region = settings::set_monitor(&JsonConfigStore::from_env(), choice, connected.as_deref())?;
    println!("Capturing monitor: {}", region);
    notify_daemon()
}

fn choose_folder(folder: &Path) -> Result<()> {
    let folder = settings::set_folder(&JsonConfigStore::from_env(), folder)?;
    println!("Saving screenshots to {}", folder.display());
    notify_daemon()
}

fn open_folder() -> Result<()> {
    let folder = settings::open_folder(&JsonConfigStore::from_env())?;
    println!("Opened {}", folder.display());
    Ok(())
}

fn notify_daemon() -> Result<()> {
    match lifecycle::request_reload(&lifecycle::default_lock_path())? {
        Some(pid) => println!("Running daemon (pid {}) reloaded", pid),
        None => println!("No daemon running; the change applies on next start"),
    }
    Ok(())
}
