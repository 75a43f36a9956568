//! Response slot
//!
//! A single-assignment cell: one producer writes an outcome once, any
//! number of consumers block until it is there and each get a copy.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{KvError, Result};
use super::CancellationReason;

/// Terminal result of a request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Succeeded(T),
    Failed(KvError),
    Cancelled(CancellationReason),
}

impl<T> Outcome<T> {
    /// Cancellation maps to [`KvError::Cancelled`], distinct from failure
    pub fn into_result(self) -> Result<T> {
        match self {
            Outcome::Succeeded(value) => Ok(value),
            Outcome::Failed(error) => Err(error),
            Outcome::Cancelled(reason) => Err(KvError::Cancelled(reason)),
        }
    }
}

/// Write-once, read-many outcome cell
pub struct ResponseSlot<T> {
    value: Mutex<Option<Outcome<T>>>,
    ready: Condvar,
}

impl<T: Clone> ResponseSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Store `outcome` unless something is already stored.
    ///
    /// Returns whether this call stored it.
    pub fn complete(&self, outcome: Outcome<T>) -> bool {
        self.complete_with(outcome, || {})
    }

    /// Like [`complete`](Self::complete), running `publish` after the
    /// outcome is stored and before the lock is released or any waiter
    /// wakes.
    pub fn complete_with(&self, outcome: Outcome<T>, publish: impl FnOnce()) -> bool {
        let mut value = self.value.lock();
        if value.is_some() {
            return false;
        }
        *value = Some(outcome);
        publish();
        drop(value);
        self.ready.notify_all();
        true
    }

    /// Current outcome without blocking
    pub fn get(&self) -> Option<Outcome<T>> {
        self.value.lock().clone()
    }

    /// Block until an outcome is stored
    pub fn wait(&self) -> Outcome<T> {
        let mut value = self.value.lock();
        loop {
            if let Some(outcome) = value.as_ref() {
                return outcome.clone();
            }
            self.ready.wait(&mut value);
        }
    }

    /// Block until an outcome is stored or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<T>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };
        let mut value = self.value.lock();
        loop {
            if let Some(outcome) = value.as_ref() {
                return Some(outcome.clone());
            }
            if self.ready.wait_until(&mut value, deadline).timed_out() {
                return value.clone();
            }
        }
    }
}

impl<T: Clone> Default for ResponseSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
