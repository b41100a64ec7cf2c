//! Single-instance lock file holding the daemon's pid

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

const LOCK_FILE_NAME: &str = ".autoscreen.lock";

/// Lock file location shared by the daemon and the `record` command
pub fn default_lock_path() -> PathBuf {
    std::env::temp_dir().join(LOCK_FILE_NAME)
}

/// Held for the lifetime of the daemon; the lock file is removed on drop
#[derive(Debug)]
pub struct SingleInstanceGuard {
    path: PathBuf,
}

impl SingleInstanceGuard {
    /// Take the lock, or `None` if another live process holds it
    pub fn acquire(path: impl Into<PathBuf>) -> io::Result<Option<Self>> {
        let path = path.into();
        // One retry: a stale file is removed and the create attempted again
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id())?;
                    file.flush()?;
                    debug!(path = %path.display(), "instance lock acquired");
                    return Ok(Some(Self { path }));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => match running_pid(&path) {
                    Some(pid) => {
                        info!(pid, "another instance is already running");
                        return Ok(None);
                    }
                    None => {
                        warn!(path = %path.display(), "removing stale instance lock");
                        match fs::remove_file(&path) {
                            Ok(()) => {}
                            Err(e) if e.kind() == ErrorKind::NotFound => {}
                            Err(e) => return Err(e),
                        }
                    }
                },
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(error = %e, path = %self.path.display(), "failed to remove instance lock");
        }
    }
}

/// Pid recorded in the lock file, if that process is still alive
pub fn running_pid(path: &Path) -> Option<u32> {
    let pid: u32 = fs::read_to_string(path).ok()?.trim().parse().ok()?;
    is_alive(pid).then_some(pid)
}

/// Ask the running daemon, if any, to reload its config; returns its pid
pub fn request_reload(path: &Path) -> io::Result<Option<u32>> {
    let Some(pid) = running_pid(path) else {
        return Ok(None);
    };
    send_signal(pid, libc::SIGHUP)?;
    debug!(pid, "reload requested");
    Ok(Some(pid))
}

fn is_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    match send_signal(pid, 0) {
        Ok(()) => true,
        // Exists but belongs to someone else
        Err(e) => e.raw_os_error() == Some(libc::EPERM),
    }
}

fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    // 0 and negative pids address process groups
    let pid = libc::pid_t::try_from(pid)
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, format!("invalid pid {}", pid)))?;
    // SAFETY: kill(2) takes plain integers and touches no memory
    if unsafe { libc::kill(pid, signal) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");

        let guard = SingleInstanceGuard::acquire(&path).unwrap().unwrap();
        assert_eq!(running_pid(&path), Some(std::process::id()));
        assert!(SingleInstanceGuard::acquire(&path).unwrap().is_none());

        drop(guard);
        assert!(!path.exists());
        assert!(SingleInstanceGuard::acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");

        // A child that has already exited leaves a pid nobody owns
        let mut child = Command::new("true").spawn().unwrap();
        let dead = child.id();
        child.wait().unwrap();
        fs::write(&path, dead.to_string()).unwrap();

        let guard = SingleInstanceGuard::acquire(&path).unwrap().unwrap();
        assert_eq!(fs::read_to_string(guard.path()).unwrap(), std::process::id().to_string());
    }

    #[test]
    fn test_reload_without_daemon() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(request_reload(&dir.path().join("lock")).unwrap(), None);
    }

    #[test]
    fn test_liveness_without_subprocess() {
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        assert!(is_alive(child.id()));

        child.kill().unwrap();
        child.wait().unwrap();
        assert!(!is_alive(child.id()));
    }

    #[test]
    fn test_group_pids_are_refused() {
        assert!(!is_alive(0));
        assert!(!is_alive(u32::MAX));
        let err = send_signal(0, libc::SIGHUP).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_garbage_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        fs::write(&path, "not a pid").unwrap();

        assert!(running_pid(&path).is_none());
        assert!(SingleInstanceGuard::acquire(&path).unwrap().is_some());
    }
}
