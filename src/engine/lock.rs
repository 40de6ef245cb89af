//! engine::lock
//!
//! The exclusive writer lock for the controller.
//!
//! # Architecture
//!
//! Exactly one operation may hold the writer lock at any moment. Holding
//! it grants exclusive mutation rights over the configuration model, the
//! restart-mark registry, and the service registry. Readers never take
//! this lock; they work from immutable snapshots.
//!
//! The lock is acquired implicitly by the first mutating call an operation
//! makes (or explicitly via the context's `acquire_controller_lock`) and
//! is held until the operation finalizes.
//!
//! # Invariants
//!
//! - The lock must be held for every model, restart-mark, or service
//!   registry mutation
//! - The lock is released on guard drop (RAII), even if a handler panics
//! - Acquisition supports a deadline; timing out performs no mutation
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use stagecraft::engine::lock::WriteLock;
//!
//! let lock = WriteLock::new();
//! let guard = lock.acquire(Some(Duration::from_millis(100))).unwrap();
//! assert!(lock.is_held());
//! drop(guard);
//! assert!(!lock.is_held());
//! ```

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Errors from lock acquisition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    /// The deadline elapsed before the current holder released the lock.
    #[error("could not acquire the controlling writer lock before the deadline")]
    Timeout,
}

/// The process-wide exclusive writer lock.
#[derive(Debug, Default)]
pub struct WriteLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl WriteLock {
    /// Create an unheld lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, blocking until it is free.
    ///
    /// With a deadline, waits at most that long; on expiry returns
    /// [`LockError::Timeout`] and the caller has acquired nothing.
    /// Without one, waits indefinitely.
    pub fn acquire(&self, deadline: Option<Duration>) -> Result<WriteLockGuard<'_>, LockError> {
        // A poisoned flag is still a coherent bool; the panicking holder's
        // guard has already run its Drop and cleared it.
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        match deadline {
            None => {
                while *held {
                    held = self
                        .released
                        .wait(held)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
            Some(limit) => {
                let expires = Instant::now() + limit;
                while *held {
                    let remaining = expires
                        .checked_duration_since(Instant::now())
                        .ok_or(LockError::Timeout)?;
                    let (guard, timeout) = self
                        .released
                        .wait_timeout(held, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    held = guard;
                    if timeout.timed_out() && *held {
                        return Err(LockError::Timeout);
                    }
                }
            }
        }

        *held = true;
        Ok(WriteLockGuard { lock: self })
    }

    /// Acquire without blocking; `None` if another operation holds it.
    pub fn try_acquire(&self) -> Option<WriteLockGuard<'_>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if *held {
            None
        } else {
            *held = true;
            Some(WriteLockGuard { lock: self })
        }
    }

    /// Whether any operation currently holds the lock.
    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = false;
        self.released.notify_all();
    }
}

/// RAII guard for the writer lock. Releasing happens on drop.
#[derive(Debug)]
pub struct WriteLockGuard<'a> {
    lock: &'a WriteLock,
}

impl Drop for WriteLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_succeeds_when_free() {
        let lock = WriteLock::new();
        let guard = lock.acquire(Some(Duration::from_millis(10))).unwrap();
        assert!(lock.is_held());
        drop(guard);
        assert!(!lock.is_held());
    }

    #[test]
    fn acquire_times_out_when_held() {
        let lock = WriteLock::new();
        let _guard = lock.acquire(None).unwrap();

        let result = lock.acquire(Some(Duration::from_millis(20)));
        assert_eq!(result.err(), Some(LockError::Timeout));
        // The failed attempt must not have disturbed the holder.
        assert!(lock.is_held());
    }

    #[test]
    fn try_acquire_returns_none_when_held() {
        let lock = WriteLock::new();
        let _guard = lock.try_acquire().expect("lock free");
        assert!(lock.try_acquire().is_none());
    }

    #[test]
    fn released_guard_unblocks_waiter() {
        let lock = Arc::new(WriteLock::new());
        let guard = lock.acquire(None).unwrap();

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _guard = lock.acquire(Some(Duration::from_secs(5))).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(20));
        drop(guard);
        waiter.join().expect("waiter acquires after release");
        assert!(!lock.is_held());
    }

    #[test]
    fn contended_acquisitions_are_serialized() {
        let lock = Arc::new(WriteLock::new());
        let counter = Arc::new(Mutex::new(0u32));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    let _guard = lock.acquire(None).unwrap();
                    let mut count = counter.lock().unwrap();
                    *count += 1;
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 8);
        assert!(!lock.is_held());
    }
}
