//! Optimistic Retry Engine
//!
//! Compound read-modify-write on top of CAS-guarded single writes:
//!
//! 1. read the current state and the CAS it was read at
//! 2. compute the next state (pure, re-run on every attempt)
//! 3. write it guarded by that CAS
//! 4. on CAS mismatch go back to 1, up to a fixed attempt ceiling
//!
//! Last writer under CAS wins; conflicting writers never merge, they retry
//! from a fresh read. Running out of attempts surfaces
//! [`KvError::ConcurrentModification`], a contention signal rather than a
//! data error.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::protocol::Cas;

/// Delay between conflicting attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry immediately
    #[default]
    None,

    /// Same delay before every retry
    Fixed(Duration),

    /// Doubling delay, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `attempt`-th conflict (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(16);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

/// A value together with the CAS it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub cas: Cas,
}

impl<T> Versioned<T> {
    pub fn new(value: T, cas: Cas) -> Self {
        Self { value, cas }
    }
}

/// Bounded optimistic update loop for one key
#[derive(Debug, Clone)]
pub struct GuardedUpdate {
    operation: String,
    max_attempts: u32,
    backoff: Backoff,
    missing_path_is_absent: bool,
}

impl GuardedUpdate {
    pub fn new(operation: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            operation: operation.into(),
            max_attempts: max_attempts.max(1),
            backoff: Backoff::None,
            missing_path_is_absent: false,
        }
    }

    /// Ceiling and backoff taken from `config`
    pub fn from_config(operation: impl Into<String>, config: &Config) -> Self {
        Self::new(operation, config.cas_retry_limit).with_backoff(config.cas_retry_backoff)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// For removals: a path-not-found from the guarded write means there is
    /// nothing to remove, and the update finishes as absent.
    pub fn missing_path_is_absent(mut self) -> Self {
        self.missing_path_is_absent = true;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the loop. Returns the state the winning write replaced.
    ///
    /// `read_current` yields `None` for an absent field, with the CAS of
    /// whatever contains it (0 when nothing exists yet, meaning
    /// unconditional). Errors other than CAS mismatch stop the loop.
    pub fn run<T, N, R, C, W>(
        &self,
        mut read_current: R,
        mut compute_next: C,
        mut write_if_unchanged: W,
    ) -> Result<Option<T>>
    where
        R: FnMut() -> Result<Versioned<Option<T>>>,
        C: FnMut(Option<&T>) -> N,
        W: FnMut(N, Cas) -> Result<()>,
    {
        for attempt in 1..=self.max_attempts {
            let current = read_current()?;
            let next = compute_next(current.value.as_ref());

            match write_if_unchanged(next, current.cas) {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(operation = %self.operation, attempt, "guarded update converged");
                    }
                    return Ok(current.value);
                }
                Err(e) if e.is_cas_mismatch() => {
                    debug!(
                        operation = %self.operation,
                        attempt,
                        cas = current.cas,
                        "CAS conflict, retrying from a fresh read"
                    );
                    let delay = self.backoff.delay(attempt);
                    if attempt < self.max_attempts && !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                Err(KvError::PathNotFound { .. }) if self.missing_path_is_absent => {
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            operation = %self.operation,
            attempts = self.max_attempts,
            "guarded update gave up under contention"
        );
        Err(KvError::ConcurrentModification {
            operation: self.operation.clone(),
            attempts: self.max_attempts,
        })
    }
}

/// [`GuardedUpdate::run`] with immediate retries
pub fn attempt_guarded_update<T, N, R, C, W>(
    read_current: R,
    compute_next: C,
    write_if_unchanged: W,
    max_attempts: u32,
) -> Result<Option<T>>
where
    R: FnMut() -> Result<Versioned<Option<T>>>,
    C: FnMut(Option<&T>) -> N,
    W: FnMut(N, Cas) -> Result<()>,
{
    GuardedUpdate::new("guarded update", max_attempts).run(read_current, compute_next, write_if_unchanged)
}
