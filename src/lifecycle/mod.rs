//! Process lifecycle: signals and the single-instance lock

mod instance;
mod signals;

pub use instance::{default_lock_path, request_reload, running_pid, SingleInstanceGuard};
pub use signals::{LifecycleEvent, Signals};
