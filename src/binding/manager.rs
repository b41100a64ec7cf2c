//! Binding manager implementation
//!
//! Keeps at most one hotkey listener alive and swaps it all-or-nothing when
//! the user picks a new chord.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ConfigStore;
use crate::hotkey::chord;
use crate::hotkey::{
    record_chord, Chord, HotkeyError, HotkeyListener, KeyCapture, ListenerFailure, ListenerHandle,
    ModifierSet, ParseError, RecordError,
};

/// Lifecycle states of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingState {
    /// No hotkey registered yet
    #[default]
    Idle,
    /// A listener is live for the current chord
    Active,
    /// Waiting for the user to press a new chord
    Recording,
    /// Shut down; no further registrations
    Stopped,
}

impl std::fmt::Display for BindingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingState::Idle => write!(f, "Idle"),
            BindingState::Active => write!(f, "Active"),
            BindingState::Recording => write!(f, "Recording"),
            BindingState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Errors returned by [`BindingManager`]
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Hotkey(#[from] HotkeyError),

    #[error("failed to load config: {0}")]
    Config(#[source] anyhow::Error),

    #[error("hotkey recording cancelled")]
    Cancelled,

    #[error("binding manager has been shut down")]
    Stopped,
}

impl From<RecordError> for BindingError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Cancelled => BindingError::Cancelled,
            RecordError::Parse(e) => BindingError::Parse(e),
            RecordError::Capture(e) => BindingError::Hotkey(e),
        }
    }
}

/// The chord currently bound and the listener serving it
struct Binding {
    listener: ListenerHandle,
    registered_at: Instant,
}

impl Binding {
    fn chord(&self) -> Chord {
        *self.listener.chord()
    }
}

/// Owns the active hotkey binding
pub struct BindingManager {
    listener: HotkeyListener,
    store: Arc<dyn ConfigStore>,
    state: BindingState,
    binding: Option<Binding>,
}

impl BindingManager {
    /// Create a manager with nothing registered
    pub fn new(listener: HotkeyListener, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            listener,
            store,
            state: BindingState::Idle,
            binding: None,
        }
    }

    /// Get the current state
    ///
    /// A binding whose listener thread has died reads as `Idle`.
    pub fn state(&self) -> BindingState {
        if self.state == BindingState::Active && !self.is_listening() {
            return BindingState::Idle;
        }
        self.state
    }

    pub fn active_chord(&self) -> Option<Chord> {
        self.binding.as_ref().map(Binding::chord)
    }

    /// Whether the active listener's thread is still running
    pub fn is_listening(&self) -> bool {
        self.binding
            .as_ref()
            .map_or(false, |b| b.listener.is_running())
    }

    /// Snapshot of the modifiers the active listener sees as held
    pub fn held_modifiers(&self) -> ModifierSet {
        self.binding
            .as_ref()
            .map(|b| b.listener.held_modifiers())
            .unwrap_or_default()
    }

    /// Bind `text` as the hotkey, replacing any current binding
    ///
    /// The new listener is started before the old one is stopped; on any
    /// error the previous binding stays in place.
    pub fn register_hotkey(&mut self, text: &str) -> Result<Chord, BindingError> {
        self.ensure_running()?;

        let chord = chord::parse(text).map_err(|e| {
            warn!(hotkey = text, error = %e, "rejected hotkey");
            e
        })?;

        if self.active_chord() == Some(chord) && self.is_listening() {
            debug!(%chord, "hotkey already registered");
            return Ok(chord);
        }

        let listener = self.listener.start(&chord).map_err(|e| {
            warn!(%chord, error = %e, "failed to start hotkey listener");
            e
        })?;

        let previous = self.binding.replace(Binding {
            listener,
            registered_at: Instant::now(),
        });

        match previous {
            Some(mut old) => {
                old.listener.stop();
                info!(
                    from = %old.chord(),
                    to = %chord,
                    active_ms = old.registered_at.elapsed().as_millis() as u64,
                    "hotkey re-registered"
                );
            }
            None => info!(%chord, backend = self.listener.backend_name(), "hotkey registered"),
        }

        self.state = BindingState::Active;
        self.persist(&chord);
        Ok(chord)
    }

    /// Register the hotkey stored in the config
    pub fn register_from_config(&mut self) -> Result<Chord, BindingError> {
        let config = self
            .store
            .load()
            .map_err(BindingError::Config)?;
        self.register_hotkey(&config.hotkey)
    }

    /// Capture the next complete key press from `capture` as a chord
    ///
    /// The current binding stays live while recording. The result is not
    /// bound; pass its text form to [`register_hotkey`](Self::register_hotkey)
    /// once the user confirms it.
    pub fn record_next(
        &mut self,
        capture: &mut dyn KeyCapture,
        timeout: Option<Duration>,
    ) -> Result<Chord, BindingError> {
        self.ensure_running()?;

        let prior = self.state;
        self.state = BindingState::Recording;
        info!(timeout_ms = timeout.map(|t| t.as_millis() as u64), "recording hotkey");

        let result = record_chord(capture, timeout);
        self.state = prior;

        match result {
            Ok(chord) => {
                info!(%chord, "hotkey recorded");
                Ok(chord)
            }
            Err(e) => {
                info!(error = %e, "hotkey recording ended without a chord");
                Err(e.into())
            }
        }
    }

    /// Drop the binding whose listener reported `failure`
    ///
    /// Returns false for reports from listeners that were already replaced.
    /// The chord stays in the config, so a later `register_hotkey` retries it.
    pub fn listener_failed(&mut self, failure: &ListenerFailure) -> bool {
        let is_current = self
            .binding
            .as_ref()
            .map_or(false, |b| b.listener.id() == failure.listener_id);
        if !is_current {
            debug!(listener_id = failure.listener_id, "ignoring failure of a replaced listener");
            return false;
        }

        if let Some(mut binding) = self.binding.take() {
            binding.listener.stop();
        }
        if self.state == BindingState::Active {
            self.state = BindingState::Idle;
        }
        warn!(chord = %failure.chord, error = %failure.error, "hotkey listener died, binding dropped");
        true
    }

    /// Stop the active listener. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.state == BindingState::Stopped {
            return;
        }
        if let Some(mut binding) = self.binding.take() {
            binding.listener.stop();
            info!(chord = %binding.chord(), "hotkey unregistered");
        }
        self.state = BindingState::Stopped;
    }

    fn ensure_running(&self) -> Result<(), BindingError> {
        if self.state == BindingState::Stopped {
            return Err(BindingError::Stopped);
        }
        Ok(())
    }

    /// Store the canonical chord text if it changed
    fn persist(&self, chord: &Chord) {
        let canonical = chord::format(chord);
        let result = self.store.load().and_then(|mut config| {
            if config.hotkey == canonical {
                return Ok(());
            }
            config.hotkey = canonical.clone();
            self.store.save(&config)
        });
        if let Err(e) = result {
            warn!(hotkey = %canonical, error = %e, "failed to persist hotkey");
        }
    }
}

impl Drop for BindingManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::Result;
    use tokio::sync::mpsc;

    use crate::config::Config;
    use crate::events::Activation;
    use crate::hotkey::testing::{captured, chord_press, FakeBackend, FakeResolver, ScriptedCapture};
    use crate::hotkey::{KeyToken, Modifier};

    #[derive(Default)]
    struct MemoryStore {
        config: Mutex<Config>,
        saves: Mutex<usize>,
    }

    impl ConfigStore for MemoryStore {
        fn load(&self) -> Result<Config> {
            Ok(self.config.lock().unwrap().clone())
        }

        fn save(&self, config: &Config) -> Result<()> {
            *self.config.lock().unwrap() = config.clone();
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct Harness {
        manager: BindingManager,
        backend: Arc<FakeBackend>,
        store: Arc<MemoryStore>,
        activations: mpsc::Receiver<Activation>,
    }

    fn harness() -> Harness {
        harness_with_failures().0
    }

    fn harness_with_failures() -> (Harness, mpsc::UnboundedReceiver<ListenerFailure>) {
        let backend = Arc::new(FakeBackend::default());
        let store = Arc::new(MemoryStore::default());
        let (tx, activations) = mpsc::channel(16);
        let (failure_tx, failures) = mpsc::unbounded_channel();
        let listener = HotkeyListener::new(backend.clone(), Arc::new(FakeResolver), tx)
            .with_failure_reports(failure_tx);
        let harness = Harness {
            manager: BindingManager::new(listener, store.clone()),
            backend,
            store,
            activations,
        };
        (harness, failures)
    }

    async fn next_activation(rx: &mut mpsc::Receiver<Activation>) -> Activation {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no activation within 2s")
            .expect("activation queue closed")
    }

    #[test]
    fn test_initial_state() {
        let h = harness();
        assert_eq!(h.manager.state(), BindingState::Idle);
        assert_eq!(h.manager.active_chord(), None);
        assert!(h.manager.held_modifiers().is_empty());
    }

    #[tokio::test]
    async fn test_reregistration_keeps_one_listener() {
        let mut h = harness();
        let first = h.manager.register_hotkey("ctrl+shift+s").unwrap();
        let second = h.manager.register_hotkey("ctrl+alt+p").unwrap();

        assert_eq!(h.manager.state(), BindingState::Active);
        assert_eq!(h.manager.active_chord(), Some(second));
        assert_eq!(h.backend.live_taps(), 1);

        // The old chord is dead; only the new one reaches the queue
        h.backend.inject_all(&chord_press(&first));
        h.backend.inject_all(&chord_press(&second));
        let activation = next_activation(&mut h.activations).await;
        assert_eq!(activation.chord, second);
    }

    #[tokio::test]
    async fn test_parse_failure_keeps_binding() {
        let mut h = harness();
        let chord = h.manager.register_hotkey("ctrl+shift+s").unwrap();

        let err = h.manager.register_hotkey("ctrl++s").unwrap_err();
        assert!(matches!(err, BindingError::Parse(ParseError::MultipleOrMissingTrigger)));
        assert_eq!(h.manager.active_chord(), Some(chord));
        assert_eq!(h.backend.live_taps(), 1);

        h.backend.inject_all(&chord_press(&chord));
        assert_eq!(next_activation(&mut h.activations).await.chord, chord);
    }

    #[tokio::test]
    async fn test_permission_denied_keeps_binding() {
        let mut h = harness();
        let chord = h.manager.register_hotkey("ctrl+shift+s").unwrap();

        h.backend.deny_permission(true);
        let err = h.manager.register_hotkey("alt+f4").unwrap_err();
        assert!(matches!(err, BindingError::Hotkey(HotkeyError::PermissionDenied(_))));
        assert_eq!(h.manager.state(), BindingState::Active);
        assert_eq!(h.manager.active_chord(), Some(chord));

        h.backend.inject_all(&chord_press(&chord));
        assert_eq!(next_activation(&mut h.activations).await.chord, chord);
    }

    #[test]
    fn test_permission_denied_from_idle() {
        let mut h = harness();
        h.backend.deny_permission(true);
        assert!(h.manager.register_hotkey("ctrl+s").is_err());
        assert_eq!(h.manager.state(), BindingState::Idle);
        assert!(!h.manager.is_listening());
    }

    #[test]
    fn test_same_chord_is_noop() {
        let mut h = harness();
        h.manager.register_hotkey("ctrl+shift+s").unwrap();
        h.manager.register_hotkey("Shift + Ctrl + S").unwrap();
        assert_eq!(h.backend.open_count(), 1);
    }

    #[test]
    fn test_canonical_hotkey_is_persisted() {
        let mut h = harness();
        h.manager.register_hotkey("S + Shift + Control").unwrap();
        assert_eq!(h.store.config.lock().unwrap().hotkey, "ctrl+shift+s");

        let saves = *h.store.saves.lock().unwrap();
        h.manager.register_hotkey("alt+f9").unwrap();
        h.manager.register_hotkey("ctrl+shift+s").unwrap();
        assert_eq!(*h.store.saves.lock().unwrap(), saves + 2);
    }

    #[test]
    fn test_register_from_config() {
        let mut h = harness();
        h.store.config.lock().unwrap().hotkey = "alt+printscreen".to_string();
        let chord = h.manager.register_from_config().unwrap();
        assert_eq!(chord.to_string(), "alt+printscreen");
    }

    #[tokio::test]
    async fn test_record_timeout_keeps_prior_binding() {
        let mut h = harness();
        let chord = h.manager.register_hotkey("ctrl+shift+s").unwrap();

        let mut capture = ScriptedCapture::default();
        let err = h
            .manager
            .record_next(&mut capture, Some(Duration::from_secs(2)))
            .unwrap_err();
        assert!(matches!(err, BindingError::Cancelled));
        assert_eq!(h.manager.state(), BindingState::Active);
        assert_eq!(h.manager.active_chord(), Some(chord));

        h.backend.inject_all(&chord_press(&chord));
        assert_eq!(next_activation(&mut h.activations).await.chord, chord);
    }

    #[test]
    fn test_record_then_confirm() {
        let mut h = harness();
        h.manager.register_hotkey("ctrl+shift+s").unwrap();

        let mut capture = ScriptedCapture::new([
            captured(&[Modifier::Alt], KeyToken::Modifier(Modifier::Alt)),
            captured(&[Modifier::Alt], KeyToken::Function(9)),
        ]);
        let recorded = h
            .manager
            .record_next(&mut capture, Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(recorded.to_string(), "alt+f9");
        // Recording alone does not rebind
        assert_eq!(h.manager.active_chord().unwrap().to_string(), "ctrl+shift+s");

        h.manager.register_hotkey(&chord::format(&recorded)).unwrap();
        assert_eq!(h.manager.active_chord(), Some(recorded));
        assert_eq!(h.backend.live_taps(), 1);
    }

    #[test]
    fn test_record_from_idle_returns_to_idle() {
        let mut h = harness();
        let mut capture = ScriptedCapture::new([captured(&[Modifier::Ctrl], KeyToken::Char('k'))]);
        h.manager.record_next(&mut capture, None).unwrap();
        assert_eq!(h.manager.state(), BindingState::Idle);
    }

    #[tokio::test]
    async fn test_dead_listener_drops_binding() {
        let (mut h, mut failures) = harness_with_failures();
        let chord = h.manager.register_hotkey("ctrl+shift+s").unwrap();

        h.backend.disconnect_all();
        let failure = tokio::time::timeout(Duration::from_secs(2), failures.recv())
            .await
            .expect("no failure report within 2s")
            .expect("failure channel closed");

        assert!(h.manager.listener_failed(&failure));
        assert_eq!(h.manager.state(), BindingState::Idle);
        assert_eq!(h.manager.active_chord(), None);
        assert!(!h.manager.is_listening());

        // Registering again starts a fresh listener for the same chord
        h.manager.register_hotkey("ctrl+shift+s").unwrap();
        assert_eq!(h.backend.open_count(), 2);
        assert_eq!(h.manager.state(), BindingState::Active);
        h.backend.inject_all(&chord_press(&chord));
        assert_eq!(next_activation(&mut h.activations).await.chord, chord);
    }

    #[tokio::test]
    async fn test_dead_listener_is_not_reported_active() {
        let (mut h, mut failures) = harness_with_failures();
        h.manager.register_hotkey("ctrl+s").unwrap();

        h.backend.disconnect_all();
        tokio::time::timeout(Duration::from_secs(2), failures.recv())
            .await
            .unwrap()
            .unwrap();
        // The report is sent just before the thread exits
        for _ in 0..50 {
            if !h.manager.is_listening() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(h.manager.state(), BindingState::Idle);
    }

    #[tokio::test]
    async fn test_stale_failure_is_ignored() {
        let (mut h, mut failures) = harness_with_failures();
        h.manager.register_hotkey("ctrl+s").unwrap();
        h.backend.disconnect_all();
        let stale = tokio::time::timeout(Duration::from_secs(2), failures.recv())
            .await
            .unwrap()
            .unwrap();

        let chord = h.manager.register_hotkey("alt+f9").unwrap();
        assert!(!h.manager.listener_failed(&stale));
        assert_eq!(h.manager.active_chord(), Some(chord));
        assert_eq!(h.manager.state(), BindingState::Active);
    }

    #[test]
    fn test_config_error_keeps_source() {
        struct BrokenStore;

        impl ConfigStore for BrokenStore {
            fn load(&self) -> Result<Config> {
                Err(anyhow::anyhow!("disk on fire"))
            }

            fn save(&self, _config: &Config) -> Result<()> {
                Ok(())
            }
        }

        let (tx, _rx) = mpsc::channel(16);
        let listener = HotkeyListener::new(Arc::new(FakeBackend::default()), Arc::new(FakeResolver), tx);
        let mut manager = BindingManager::new(listener, Arc::new(BrokenStore));

        let err = manager.register_from_config().unwrap_err();
        assert!(matches!(err, BindingError::Config(_)));
        let source = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut h = harness();
        h.manager.register_hotkey("ctrl+shift+s").unwrap();

        h.manager.shutdown();
        h.manager.shutdown();
        assert_eq!(h.manager.state(), BindingState::Stopped);
        assert_eq!(h.backend.live_taps(), 0);

        assert!(matches!(
            h.manager.register_hotkey("ctrl+s"),
            Err(BindingError::Stopped)
        ));
        let mut capture = ScriptedCapture::default();
        assert!(matches!(
            h.manager.record_next(&mut capture, Some(Duration::from_millis(10))),
            Err(BindingError::Stopped)
        ));
    }
}
