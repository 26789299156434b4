use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Advisory exclusive lock serializing mutating verbs on one project.
///
/// Held for the lifetime of the value; the lock file itself is left in
/// place and records the holder for the next caller's error message.
pub struct ProjectLock {
    lock_file: File,
    path: PathBuf,
}

impl ProjectLock {
    pub fn lock_path(state_dir: &Path, project: &str) -> PathBuf {
        state_dir.join(format!("{project}.lock"))
    }

    /// Take the lock for `project`, failing fast with `CoreError::Busy` if
    /// another invocation holds it.
    pub fn acquire(state_dir: &Path, project: &str, verb: &str) -> Result<Self, CoreError> {
        let path = Self::lock_path(state_dir, project);
        std::fs::create_dir_all(state_dir)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            let mut holder = String::new();
            let _ = file.read_to_string(&mut holder);
            let holder = match holder.trim() {
                "" => "unknown holder".to_owned(),
                h => h.to_owned(),
            };
            return Err(CoreError::Busy {
                project: project.to_owned(),
                path,
                holder,
            });
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "pid {} ({verb})", std::process::id())?;
        debug!("locked {} for {verb}", path.display());

        Ok(Self {
            lock_file: file,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = self.lock_file.set_len(0);
        let _ = self.lock_file.unlock();
    }
}

/// How long after a first interrupt a second one ends the session.
pub const INTERRUPT_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// First press: tell the user, arm the window.
    Warn,
    /// Second press inside the window.
    Terminate,
}

/// Two-press interrupt state machine. Time is passed in so it can be
/// driven without a clock.
#[derive(Debug, Clone)]
pub struct InterruptWindow {
    window: Duration,
    armed_at: Option<Instant>,
}

impl InterruptWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            armed_at: None,
        }
    }

    pub fn on_interrupt(&mut self, now: Instant) -> InterruptAction {
        match self.armed_at {
            Some(armed) if now.saturating_duration_since(armed) <= self.window => {
                self.armed_at = None;
                InterruptAction::Terminate
            }
            _ => {
                self.armed_at = Some(now);
                InterruptAction::Warn
            }
        }
    }

    pub fn is_armed(&self, now: Instant) -> bool {
        self.armed_at
            .is_some_and(|armed| now.saturating_duration_since(armed) <= self.window)
    }
}

impl Default for InterruptWindow {
    fn default() -> Self {
        Self::new(INTERRUPT_WINDOW)
    }
}

/// Install the process-wide Ctrl-C handler. A second press within
/// `INTERRUPT_WINDOW` raises `terminate`, which attached sessions poll.
pub fn install_interrupt_handler(terminate: Arc<AtomicBool>) -> Result<(), CoreError> {
    let window = Mutex::new(InterruptWindow::default());
    ctrlc::set_handler(move || {
        let action = window
            .lock()
            .map_or(InterruptAction::Terminate, |mut w| w.on_interrupt(Instant::now()));
        match action {
            InterruptAction::Warn => {
                eprintln!(
                    "\ninterrupt received; press Ctrl-C again within {}s to end the session",
                    INTERRUPT_WINDOW.as_secs()
                );
            }
            InterruptAction::Terminate => {
                terminate.store(true, Ordering::SeqCst);
            }
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();

        {
            let lock = ProjectLock::acquire(dir.path(), "shop", "up").unwrap();
            assert!(lock.path().exists());
            let holder = std::fs::read_to_string(lock.path()).unwrap();
            assert!(holder.contains("(up)"));
        }

        ProjectLock::acquire(dir.path(), "shop", "halt").unwrap();
    }

    #[test]
    fn second_acquire_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let _lock = ProjectLock::acquire(dir.path(), "shop", "up").unwrap();

        let err = ProjectLock::acquire(dir.path(), "shop", "destroy")
            .err()
            .unwrap();
        match err {
            CoreError::Busy {
                project, holder, ..
            } => {
                assert_eq!(project, "shop");
                assert!(holder.contains("(up)"), "holder was {holder}");
            }
            other => panic!("expected Busy, got {other}"),
        }
    }

    #[test]
    fn locks_are_per_project() {
        let dir = tempfile::tempdir().unwrap();
        let _a = ProjectLock::acquire(dir.path(), "shop", "up").unwrap();
        let _b = ProjectLock::acquire(dir.path(), "blog", "up").unwrap();
    }

    #[test]
    fn creates_missing_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state").join("vm");
        let lock = ProjectLock::acquire(&nested, "shop", "up").unwrap();
        assert_eq!(lock.path(), nested.join("shop.lock"));
    }

    #[test]
    fn second_press_within_window_terminates() {
        let mut window = InterruptWindow::default();
        let t0 = Instant::now();
        assert_eq!(window.on_interrupt(t0), InterruptAction::Warn);
        assert!(window.is_armed(t0 + Duration::from_millis(500)));
        assert_eq!(
            window.on_interrupt(t0 + Duration::from_millis(1500)),
            InterruptAction::Terminate
        );
        assert!(!window.is_armed(t0 + Duration::from_millis(1600)));
    }

    #[test]
    fn window_resets_after_timeout() {
        let mut window = InterruptWindow::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert_eq!(window.on_interrupt(t0), InterruptAction::Warn);
        let late = t0 + Duration::from_secs(3);
        assert!(!window.is_armed(late));
        assert_eq!(window.on_interrupt(late), InterruptAction::Warn);
        assert_eq!(
            window.on_interrupt(late + Duration::from_secs(1)),
            InterruptAction::Terminate
        );
    }
}
