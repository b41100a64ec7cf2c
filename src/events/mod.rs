//! Activation events and the worker that handles them
//!
//! Listener threads only queue [`Activation`]s; the worker runs the
//! (potentially slow) handler one activation at a time, in queue order.

mod worker;

use std::time::SystemTime;

use crate::hotkey::Chord;

pub use worker::{run_worker, ActivationHandler};

/// Capacity of the listener -> worker queue
pub const ACTIVATION_QUEUE: usize = 16;

/// A single press of the bound chord
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// Increases with every activation, in key-event order
    pub seq: u64,
    pub chord: Chord,
    pub at: SystemTime,
}

impl Activation {
    pub fn new(seq: u64, chord: Chord) -> Self {
        Self {
            seq,
            chord,
            at: SystemTime::now(),
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ACTIVATED #{} ({})", self.seq, self.chord)
    }
}
