//! autoscreen: global-hotkey screenshot daemon
//!
//! - Parses and validates hotkey chords
//! - Listens for the chord on a dedicated thread per platform backend
//! - Hands each activation to a sequential worker that captures the
//!   screen, saves a PNG, copies it to the clipboard and notifies the user

pub mod binding;
pub mod config;
pub mod events;
pub mod hotkey;
pub mod lifecycle;
pub mod screenshot;
pub mod services;
pub mod settings;
