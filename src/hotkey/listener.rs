//! Global hotkey listener
//!
//! Runs a platform key hook on a dedicated thread, tracks held modifiers and
//! queues an [`Activation`] whenever the bound chord is freshly pressed.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use super::chord::Chord;
use super::keys::{KeyToken, ModifierSet, PressState};
use super::platform::{KeyAction, KeyBackend, KeyTokenResolver, RawKeyEvent};
use super::HotkeyError;
use crate::events::Activation;

/// How long one `next_event` call may block before the stop flag is rechecked
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `start` waits for the hook to be installed
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Platform-independent chord matching over a stream of key tokens
#[derive(Debug)]
pub struct ChordMatcher {
    chord: Chord,
    pressed: PressState,
    /// Trigger is down; cleared on its release
    trigger_held: bool,
}

impl ChordMatcher {
    pub fn new(chord: Chord) -> Self {
        Self {
            chord,
            pressed: PressState::default(),
            trigger_held: false,
        }
    }

    /// Feed one key event. Returns true when the chord activates.
    ///
    /// Treats each modifier as a single physical key; use
    /// [`process_key`](Self::process_key) when left and right keys differ.
    pub fn process(&mut self, token: KeyToken, action: KeyAction) -> bool {
        let code = match token {
            KeyToken::Modifier(modifier) => modifier as u32,
            _ => 0,
        };
        self.process_key(code, token, action)
    }

    /// Feed one key event from the physical key `code`
    pub fn process_key(&mut self, code: u32, token: KeyToken, action: KeyAction) -> bool {
        if let KeyToken::Modifier(modifier) = token {
            match action {
                KeyAction::Press | KeyAction::Repeat => self.pressed.press(modifier, code),
                KeyAction::Release => self.pressed.release(modifier, code),
            }
            return false;
        }

        if token != self.chord.trigger() {
            return false;
        }

        match action {
            KeyAction::Release => {
                self.trigger_held = false;
                false
            }
            KeyAction::Press | KeyAction::Repeat => {
                let fresh = !self.trigger_held && action == KeyAction::Press;
                self.trigger_held = true;
                fresh && self.pressed.snapshot() == self.chord.required_modifiers()
            }
        }
    }

    pub fn held_modifiers(&self) -> ModifierSet {
        self.pressed.snapshot()
    }

    /// Forget all held keys
    pub fn reset(&mut self) {
        self.pressed.clear();
        self.trigger_held = false;
    }
}

/// Sent when a listener thread ends without being asked to stop
#[derive(Debug)]
pub struct ListenerFailure {
    pub listener_id: u64,
    pub chord: Chord,
    pub error: HotkeyError,
}

/// Starts listeners that share one backend and one activation queue
pub struct HotkeyListener {
    backend: Arc<dyn KeyBackend>,
    resolver: Arc<dyn KeyTokenResolver>,
    activation_tx: mpsc::Sender<Activation>,
    failure_tx: Option<mpsc::UnboundedSender<ListenerFailure>>,
    next_seq: Arc<AtomicU64>,
    next_id: AtomicU64,
}

impl HotkeyListener {
    /// Create a new hotkey listener
    pub fn new(
        backend: Arc<dyn KeyBackend>,
        resolver: Arc<dyn KeyTokenResolver>,
        activation_tx: mpsc::Sender<Activation>,
    ) -> Self {
        Self {
            backend,
            resolver,
            activation_tx,
            failure_tx: None,
            next_seq: Arc::new(AtomicU64::new(1)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Report listener threads that die (device unplugged, backend error)
    pub fn with_failure_reports(mut self, failure_tx: mpsc::UnboundedSender<ListenerFailure>) -> Self {
        self.failure_tx = Some(failure_tx);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Install the hook for `chord` on a new thread
    ///
    /// Returns once the thread reports that the platform hook is live, or
    /// with the error that prevented it.
    pub fn start(&self, chord: &Chord) -> Result<ListenerHandle, HotkeyError> {
        chord
            .validate()
            .map_err(|e| HotkeyError::InvalidChord(e.to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let held = Arc::new(AtomicU8::new(0));
        let (ready_tx, ready_rx) = sync_channel(1);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let worker = ListenerThread {
            id,
            chord: *chord,
            backend: Arc::clone(&self.backend),
            resolver: Arc::clone(&self.resolver),
            activation_tx: self.activation_tx.clone(),
            failure_tx: self.failure_tx.clone(),
            next_seq: Arc::clone(&self.next_seq),
            running: Arc::clone(&running),
            held: Arc::clone(&held),
        };

        let thread = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || worker.run(ready_tx))
            .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))?;

        match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(())) => Ok(ListenerHandle {
                id,
                chord: *chord,
                running,
                held,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread exits on its own once the hook call returns
                running.store(false, Ordering::SeqCst);
                Err(HotkeyError::StartTimeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                Err(HotkeyError::Backend(
                    "listener thread exited during startup".to_string(),
                ))
            }
        }
    }
}

/// State moved onto the listener thread
struct ListenerThread {
    id: u64,
    chord: Chord,
    backend: Arc<dyn KeyBackend>,
    resolver: Arc<dyn KeyTokenResolver>,
    activation_tx: mpsc::Sender<Activation>,
    failure_tx: Option<mpsc::UnboundedSender<ListenerFailure>>,
    next_seq: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    held: Arc<AtomicU8>,
}

impl ListenerThread {
    fn run(self, ready_tx: SyncSender<Result<(), HotkeyError>>) {
        let mut source = match self.backend.open() {
            Ok(source) => source,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        let _ = ready_tx.send(Ok(()));

        info!(chord = %self.chord, backend = self.backend.name(), "hotkey listener thread started");

        let mut matcher = ChordMatcher::new(self.chord);

        while self.running.load(Ordering::SeqCst) {
            match source.next_event(POLL_INTERVAL) {
                Ok(Some(event)) => self.handle_event(&mut matcher, event),
                Ok(None) => {}
                Err(e) => {
                    error!(chord = %self.chord, error = %e, "hotkey listener failed");
                    if let Some(failure_tx) = &self.failure_tx {
                        let _ = failure_tx.send(ListenerFailure {
                            listener_id: self.id,
                            chord: self.chord,
                            error: e,
                        });
                    }
                    break;
                }
            }
        }

        matcher.reset();
        self.held.store(0, Ordering::SeqCst);
        info!(chord = %self.chord, "hotkey listener thread stopped");
    }

    fn handle_event(&self, matcher: &mut ChordMatcher, event: RawKeyEvent) {
        let Some(token) = self.resolver.resolve(event.code) else {
            trace!(code = event.code, "unmapped key code");
            return;
        };

        let fired = matcher.process_key(event.code, token, event.action);
        self.held.store(matcher.held_modifiers().bits(), Ordering::SeqCst);

        if !fired || !self.running.load(Ordering::SeqCst) {
            return;
        }

        let activation = Activation::new(self.next_seq.fetch_add(1, Ordering::SeqCst), self.chord);
        let seq = activation.seq;
        match self.activation_tx.try_send(activation) {
            Ok(()) => debug!(seq, chord = %self.chord, "hotkey activated"),
            Err(TrySendError::Full(_)) => {
                warn!(seq, "activation queue full, dropping activation")
            }
            Err(TrySendError::Closed(_)) => warn!(seq, "activation queue closed"),
        }
    }
}

/// A running listener. Stops (and joins its thread) on `stop` or drop.
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    chord: Chord,
    running: Arc<AtomicBool>,
    held: Arc<AtomicU8>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn chord(&self) -> &Chord {
        &self.chord
    }

    /// Matches [`ListenerFailure::listener_id`]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the listener thread is still processing events
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Copy of the modifiers the listener currently sees as held
    pub fn held_modifiers(&self) -> ModifierSet {
        ModifierSet::from_bits(self.held.load(Ordering::SeqCst))
    }

    /// Stop the listener and wait for its thread to exit
    ///
    /// No activation is queued by this listener after `stop` returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(chord = %self.chord, "hotkey listener thread panicked");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
