//! Request Module
//!
//! The unit of in-flight work and its exactly-once lifecycle.
//!
//! ## Lifecycle
//! ```text
//!                ┌──────────────┐
//!          ┌────▶│  Succeeded   │
//!          │     └──────────────┘
//! ┌────────┴───┐ ┌──────────────┐
//! │ Incomplete ├▶│    Failed    │
//! └────────┬───┘ └──────────────┘
//!          │     ┌──────────────┐
//!          └────▶│  Cancelled   │
//!                └──────────────┘
//! ```
//! The transition is a single compare-and-swap on an atomic state byte, so
//! a server response racing a timeout reaper delivers exactly one outcome.
//! Losing calls are silent no-ops.

mod slot;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::error::{KvError, Result};

pub use slot::{Outcome, ResponseSlot};

const INCOMPLETE: u8 = 0;
const SUCCEEDED: u8 = 1;
const FAILED: u8 = 2;
const CANCELLED: u8 = 3;
// Claimed by a winner that has not yet published its outcome.
const COMPLETING: u8 = 4;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Incomplete,
    Succeeded,
    Failed,
    Cancelled,
}

/// Why a request was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    /// Deadline passed before a response arrived
    Timeout,
    /// The owning client shut down
    Shutdown,
    /// The channel carrying the request went away
    ChannelClosed,
    /// The caller gave up on it
    CallerRequested,
}

/// Diagnostic identity of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    id: u64,
    operation: &'static str,
    target: Option<String>,
}

impl RequestContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            operation,
            target: None,
        }
    }

    /// Attach the document id the request is about
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Process-unique id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

/// An in-flight request with an exactly-once completion slot
pub struct Request<T> {
    timeout: Duration,
    created_at: Instant,
    context: RequestContext,
    state: AtomicU8,
    cancellation_reason: OnceLock<CancellationReason>,
    response: ResponseSlot<T>,
}

impl<T: Clone> Request<T> {
    /// Create an incomplete request.
    ///
    /// A zero timeout means no timeout was chosen and is rejected.
    pub fn new(timeout: Duration, context: RequestContext) -> Result<Self> {
        if timeout.is_zero() {
            return Err(KvError::InvalidArgument(
                "A Timeout must be provided".to_string(),
            ));
        }
        Ok(Self {
            timeout,
            created_at: Instant::now(),
            context,
            state: AtomicU8::new(INCOMPLETE),
            cancellation_reason: OnceLock::new(),
            response: ResponseSlot::new(),
        })
    }

    /// Complete successfully. Returns whether this call won.
    pub fn succeed(&self, result: T) -> bool {
        self.complete(SUCCEEDED, Outcome::Succeeded(result), None)
    }

    /// Complete with an error. Returns whether this call won.
    pub fn fail(&self, error: KvError) -> bool {
        self.complete(FAILED, Outcome::Failed(error), None)
    }

    /// Cancel with a reason. Returns whether this call won.
    pub fn cancel(&self, reason: CancellationReason) -> bool {
        self.complete(CANCELLED, Outcome::Cancelled(reason), Some(reason))
    }

    fn complete(&self, terminal: u8, outcome: Outcome<T>, reason: Option<CancellationReason>) -> bool {
        if self
            .state
            .compare_exchange(INCOMPLETE, COMPLETING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // The reason is published before the state, so anyone who sees
        // `Cancelled` also sees why. The state flips while the slot is
        // locked, so a terminal state always comes with its outcome.
        if let Some(reason) = reason {
            let _ = self.cancellation_reason.set(reason);
        }
        self.response
            .complete_with(outcome, || self.state.store(terminal, Ordering::Release));

        tracing::trace!(
            request_id = self.context.id,
            operation = self.context.operation,
            state = ?self.state(),
            "request completed"
        );
        true
    }

    pub fn state(&self) -> RequestState {
        match self.state.load(Ordering::Acquire) {
            SUCCEEDED => RequestState::Succeeded,
            FAILED => RequestState::Failed,
            CANCELLED => RequestState::Cancelled,
            _ => RequestState::Incomplete,
        }
    }

    pub fn completed(&self) -> bool {
        self.state() != RequestState::Incomplete
    }

    pub fn succeeded(&self) -> bool {
        self.state() == RequestState::Succeeded
    }

    pub fn failed(&self) -> bool {
        self.state() == RequestState::Failed
    }

    pub fn cancelled(&self) -> bool {
        self.state() == RequestState::Cancelled
    }

    pub fn cancellation_reason(&self) -> Option<CancellationReason> {
        if self.cancelled() {
            self.cancellation_reason.get().copied()
        } else {
            None
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `None` when the timeout reaches past what an `Instant` can hold;
    /// such a request never times out.
    pub fn deadline(&self) -> Option<Instant> {
        self.created_at.checked_add(self.timeout)
    }

    pub fn timed_out(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Outcome if already delivered
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.response.get()
    }

    /// Block until the request reaches a terminal state
    pub fn wait(&self) -> Result<T> {
        self.response.wait().into_result()
    }

    /// Block for at most `timeout`; `None` if still incomplete
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        self.response.wait_timeout(timeout).map(Outcome::into_result)
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("context", &self.context)
            .field("timeout", &self.timeout)
            .field("state", &self.state.load(Ordering::Acquire))
            .finish()
    }
}
