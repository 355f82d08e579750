//! Deletion confirmation poller
//!
//! Some remote deletions are asynchronous: the delete call returns before
//! the entity is actually gone. The poller re-checks existence on a fixed
//! interval until the entity disappears, the timeout elapses, or the run is
//! cancelled.

use crate::adapter::AdapterError;
use crate::identity::Identity;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Interval and timeout for deletion polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Shared cancellation flag
///
/// Clones share the same flag. Waiting on the token returns as soon as it is
/// cancelled, so a pending poll does not sleep out its interval.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout`. Returns `true` if the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// State of a running poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Confirmed,
    TimedOut,
    Cancelled,
    Failed,
}

/// Terminal result of a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The entity no longer exists
    Confirmed { attempts: u32 },
    /// The entity still existed when the timeout elapsed
    TimedOut { attempts: u32, elapsed: Duration },
    /// The wait was cancelled before deletion was confirmed
    Cancelled,
    /// The check failed with a non-retryable error
    Failed(AdapterError),
}

impl PollOutcome {
    pub fn state(&self) -> PollState {
        match self {
            Self::Confirmed { .. } => PollState::Confirmed,
            Self::TimedOut { .. } => PollState::TimedOut,
            Self::Cancelled => PollState::Cancelled,
            Self::Failed(_) => PollState::Failed,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Poll `check` until it reports the entity `id` gone.
///
/// `check` returns whether the entity still exists. A `NotFound` error
/// counts as gone, transport errors are retried until the timeout, and any
/// other error ends the poll.
pub fn confirm_deleted<F>(
    id: &Identity,
    mut check: F,
    config: &PollConfig,
    cancel: &CancelToken,
) -> PollOutcome
where
    F: FnMut() -> Result<bool, AdapterError>,
{
    let started = Instant::now();
    let mut attempts = 0u32;
    let mut state = PollState::Pending;

    while state == PollState::Pending {
        if cancel.is_cancelled() {
            log::debug!("stopped waiting for {id}: cancelled");
            return PollOutcome::Cancelled;
        }

        attempts += 1;
        match check() {
            Ok(false) | Err(AdapterError::NotFound) => state = PollState::Confirmed,
            Ok(true) => {
                log::debug!("{id} still present after attempt {attempts}");
            }
            Err(e) if e.is_retryable() => {
                log::debug!("retrying deletion check for {id} after {e}");
            }
            Err(e) => return PollOutcome::Failed(e),
        }

        if state == PollState::Confirmed {
            break;
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            state = PollState::TimedOut;
            break;
        }

        let wait = config.interval.min(config.timeout - elapsed);
        if cancel.wait_timeout(wait) {
            return PollOutcome::Cancelled;
        }
    }

    match state {
        PollState::Confirmed => PollOutcome::Confirmed { attempts },
        _ => PollOutcome::TimedOut {
            attempts,
            elapsed: started.elapsed(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::thread;

    fn id() -> Identity {
        Identity::new("42:7")
    }

    fn fast() -> PollConfig {
        PollConfig::new(Duration::from_millis(5), Duration::from_millis(200))
    }

    #[test]
    fn test_confirmed_on_fourth_poll() {
        let calls = Cell::new(0);
        let outcome = confirm_deleted(
            &id(),
            || {
                calls.set(calls.get() + 1);
                Ok(calls.get() < 4)
            },
            &fast(),
            &CancelToken::new(),
        );
        assert_eq!(outcome, PollOutcome::Confirmed { attempts: 4 });
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_not_found_counts_as_gone() {
        let outcome = confirm_deleted(
            &id(),
            || Err(AdapterError::NotFound),
            &fast(),
            &CancelToken::new(),
        );
        assert!(outcome.is_confirmed());
    }

    #[test]
    fn test_times_out_when_never_gone() {
        let config = PollConfig::new(Duration::from_millis(5), Duration::from_millis(30));
        let outcome = confirm_deleted(&id(), || Ok(true), &config, &CancelToken::new());
        match outcome {
            PollOutcome::TimedOut { attempts, elapsed } => {
                assert!(attempts >= 2);
                assert!(elapsed >= Duration::from_millis(30));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(
            PollOutcome::TimedOut {
                attempts: 1,
                elapsed: Duration::ZERO
            }
            .state(),
            PollState::TimedOut
        );
    }

    #[test]
    fn test_transport_errors_are_retried() {
        let calls = Cell::new(0);
        let outcome = confirm_deleted(
            &id(),
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(AdapterError::transport("connection reset"))
                } else {
                    Ok(false)
                }
            },
            &fast(),
            &CancelToken::new(),
        );
        assert_eq!(outcome, PollOutcome::Confirmed { attempts: 3 });
    }

    #[test]
    fn test_other_errors_fail_the_poll() {
        let outcome = confirm_deleted(
            &id(),
            || {
                Err(AdapterError::Rejected {
                    status: 403,
                    message: "forbidden".into(),
                })
            },
            &fast(),
            &CancelToken::new(),
        );
        assert_eq!(outcome.state(), PollState::Failed);
    }

    #[test]
    fn test_cancel_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = confirm_deleted(&id(), || Ok(false), &fast(), &cancel);
        assert_eq!(outcome, PollOutcome::Cancelled);
    }

    #[test]
    fn test_cancel_wakes_pending_wait() {
        let cancel = CancelToken::new();
        let config = PollConfig::new(Duration::from_secs(60), Duration::from_secs(600));
        let remote = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let started = Instant::now();
        let outcome = confirm_deleted(&id(), || Ok(true), &config, &cancel);
        handle.join().unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn test_wait_timeout_without_cancel() {
        let cancel = CancelToken::new();
        assert!(!cancel.wait_timeout(Duration::from_millis(1)));
        assert!(!cancel.is_cancelled());
    }
}
