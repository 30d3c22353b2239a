//! Bounded-wait exclusive critical section.
//!
//! # Invariants
//! - At most one holder at a time.
//! - Acquisition never waits longer than the requested timeout.
//! - The lock is released on every exit path of the action, including
//!   panics (the guard is dropped while unwinding).

use log::{debug, warn};
use parking_lot::Mutex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Default acquisition timeout for multi-step mutations.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// The lock could not be acquired in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    Busy { waited: Duration },
}

impl Display for LockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy { waited } => write!(
                f,
                "store is busy; lock not acquired within {} ms, try again",
                waited.as_millis()
            ),
        }
    }
}

impl Error for LockError {}

/// Store-wide exclusive lock.
pub struct LockManager {
    lock: Mutex<()>,
    default_timeout: Duration,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl LockManager {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            lock: Mutex::new(()),
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Runs `action` while holding the lock, waiting at most `timeout`.
    pub fn with_lock<T>(
        &self,
        timeout: Duration,
        action: impl FnOnce() -> T,
    ) -> Result<T, LockError> {
        let started_at = Instant::now();
        let Some(_guard) = self.lock.try_lock_for(timeout) else {
            warn!(
                "event=lock_acquire module=lock status=busy timeout_ms={}",
                timeout.as_millis()
            );
            return Err(LockError::Busy { waited: timeout });
        };
        debug!(
            "event=lock_acquire module=lock status=ok wait_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(action())
    }

    /// `with_lock` using the configured default timeout.
    pub fn with_default_lock<T>(&self, action: impl FnOnce() -> T) -> Result<T, LockError> {
        self.with_lock(self.default_timeout, action)
    }

    /// Whether someone currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::{LockError, LockManager};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn returns_action_result() {
        let manager = LockManager::default();
        assert_eq!(manager.with_lock(Duration::from_millis(10), || 7), Ok(7));
        assert!(!manager.is_locked());
    }

    #[test]
    fn contended_lock_times_out_with_busy() {
        let manager = LockManager::default();
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = &manager;
        thread::scope(|scope| {
            scope.spawn(move || {
                holder
                    .with_lock(Duration::from_secs(1), || {
                        held_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                    })
                    .unwrap();
            });

            held_rx.recv().unwrap();
            let outcome = manager.with_lock(Duration::from_millis(20), || ());
            assert!(matches!(outcome, Err(LockError::Busy { .. })));
            release_tx.send(()).unwrap();
        });

        assert!(manager.with_lock(Duration::from_millis(20), || ()).is_ok());
    }

    #[test]
    fn panicking_action_releases_the_lock() {
        let manager = LockManager::default();
        let result = catch_unwind(AssertUnwindSafe(|| {
            manager.with_lock(Duration::from_millis(10), || panic!("boom"))
        }));
        assert!(result.is_err());
        assert!(!manager.is_locked());
        assert_eq!(manager.with_lock(Duration::from_millis(10), || 1), Ok(1));
    }
}
