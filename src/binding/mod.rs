//! Binding lifecycle management
//!
//! Owns the single active hotkey binding:
//! - Idle: nothing registered yet
//! - Active: one listener live for the current chord
//! - Recording: capturing a new chord while the old one stays live
//! - Stopped: shut down, terminal

mod manager;

pub use manager::{BindingError, BindingManager, BindingState};
