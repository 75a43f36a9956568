//! Client Module
//!
//! Tracks outstanding requests over one channel and correlates responses
//! with them.
//!
//! ## Request Path
//! ```text
//! KvOperation ──encode──▶ frame ──Transport::send──▶ (external writer)
//!      │
//!      └─▶ in-flight table [opaque → Request]
//!
//! (external reader) ──handle_response(frame)──▶ decode ──▶ Request::succeed / fail
//! ```
//! Issuing an operation never blocks: [`KvClient::dispatch`] returns the
//! request handle immediately. The blocking convenience calls wait on that
//! handle's result slot and cancel it once its deadline passes.

mod store;
mod transport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::protocol::{
    self, Cas, ChannelContext, CollectionId, Counter, DocKey, FrameHeader, KvOperation,
    KvResponse, LookupSpec, MutationSpec, MutationToken, ResponseBody, ResponseStatus,
    SubdocField, NO_CAS,
};
use crate::request::{CancellationReason, Request, RequestContext};
use crate::retry::Versioned;

pub use transport::{ChannelTransport, Transport};

/// Pause before re-sending after a transient server status
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(5);

/// What to do when the server reports a transient condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Surface the status to the caller
    FailFast,

    /// Re-send idempotent operations until the deadline
    #[default]
    BestEffort,
}

/// Result of a document or subdocument mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationResult {
    pub cas: Cas,
    pub mutation_token: Option<MutationToken>,
}

/// Result of an increment or decrement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterResult {
    pub content: u64,
    pub cas: Cas,
    pub mutation_token: Option<MutationToken>,
}

/// Result of a metadata probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaResult {
    pub cas: Cas,
    pub deleted: bool,
}

/// Per-spec results of a lookup, with the document's CAS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupInResult {
    pub cas: Cas,
    pub fields: Vec<SubdocField>,
}

struct InFlight {
    operation: KvOperation,
    request: Arc<Request<KvResponse>>,
}

/// Key-value client core bound to one channel
pub struct KvClient<T: Transport> {
    transport: T,
    channel: ChannelContext,
    config: Config,
    collection: CollectionId,
    retry_strategy: RetryStrategy,
    next_opaque: AtomicU32,
    in_flight: Mutex<HashMap<u32, InFlight>>,
}

impl<T: Transport> KvClient<T> {
    pub fn new(transport: T, channel: ChannelContext, config: Config) -> Self {
        Self {
            transport,
            channel,
            config,
            collection: CollectionId::DEFAULT,
            retry_strategy: RetryStrategy::default(),
            next_opaque: AtomicU32::new(1),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Address documents in `collection`
    pub fn with_collection(mut self, collection: CollectionId) -> Self {
        self.collection = collection;
        self
    }

    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn channel(&self) -> &ChannelContext {
        &self.channel
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Requests sent and not yet completed or reaped
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    // =========================================================================
    // Dispatch and Correlation
    // =========================================================================

    /// Send `op` with the configured timeout
    pub fn dispatch(&self, op: KvOperation) -> Result<Arc<Request<KvResponse>>> {
        self.dispatch_with_timeout(op, self.config.kv_timeout)
    }

    /// Encode `op`, register it under a fresh opaque and send it.
    ///
    /// Returns as soon as the frame is handed to the transport.
    pub fn dispatch_with_timeout(
        &self,
        mut op: KvOperation,
        timeout: Duration,
    ) -> Result<Arc<Request<KvResponse>>> {
        op.route(self.config.num_partitions);

        let context = RequestContext::new(op.name()).with_target(op.key().id());
        let request = Arc::new(Request::new(timeout, context)?);

        let opaque = self.next_opaque.fetch_add(1, Ordering::Relaxed);
        let frame = protocol::encode(&op, opaque, &self.channel);

        debug!(
            operation = op.name(),
            opaque,
            partition = op.key().partition(),
            request_id = request.context().id(),
            "dispatching request"
        );

        self.in_flight.lock().insert(
            opaque,
            InFlight {
                operation: op,
                request: Arc::clone(&request),
            },
        );

        if let Err(e) = self.transport.send(frame) {
            self.in_flight.lock().remove(&opaque);
            request.fail(e.clone());
            return Err(e);
        }

        Ok(request)
    }

    /// Complete the request a response frame answers.
    ///
    /// Responses nobody is waiting for are dropped. A frame that fails to
    /// decode fails its request and is also reported to the caller.
    pub fn handle_response(&self, frame: &[u8]) -> Result<()> {
        let header = FrameHeader::parse(frame)?;

        let Some(entry) = self.in_flight.lock().remove(&header.opaque) else {
            warn!(
                opaque = header.opaque,
                "dropping response for unknown or already completed request"
            );
            return Ok(());
        };

        let outcome = protocol::decode(&entry.operation, frame, &self.channel)
            .and_then(|response| check_status(&entry.operation, response));

        match outcome {
            Ok(response) => {
                entry.request.succeed(response);
                Ok(())
            }
            Err(e @ KvError::Protocol(_)) => {
                warn!(opaque = header.opaque, error = %e, "undecodable response");
                entry.request.fail(e.clone());
                Err(e)
            }
            Err(e) => {
                entry.request.fail(e);
                Ok(())
            }
        }
    }

    /// Cancel every request whose deadline is at or before `now`
    pub fn reap_expired(&self, now: Instant) -> usize {
        let expired: Vec<InFlight> = {
            let mut in_flight = self.in_flight.lock();
            let opaques: Vec<u32> = in_flight
                .iter()
                .filter(|(_, entry)| entry.request.timed_out(now))
                .map(|(opaque, _)| *opaque)
                .collect();
            opaques
                .into_iter()
                .filter_map(|opaque| in_flight.remove(&opaque))
                .collect()
        };

        for entry in &expired {
            if entry.request.cancel(CancellationReason::Timeout) {
                warn!(
                    operation = entry.operation.name(),
                    request_id = entry.request.context().id(),
                    timeout = ?entry.request.timeout(),
                    "request timed out"
                );
            }
        }
        expired.len()
    }

    /// Cancel everything outstanding
    pub fn shutdown(&self) {
        let drained: Vec<InFlight> = self.in_flight.lock().drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.request.cancel(CancellationReason::Shutdown);
        }
    }

    fn forget_completed(&self) {
        self.in_flight
            .lock()
            .retain(|_, entry| !entry.request.completed());
    }

    fn await_request(&self, request: &Request<KvResponse>) -> Result<KvResponse> {
        let Some(deadline) = request.deadline() else {
            return request.wait();
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        if let Some(result) = request.wait_timeout(remaining) {
            return result;
        }
        if request.cancel(CancellationReason::Timeout) {
            warn!(
                operation = request.context().operation(),
                request_id = request.context().id(),
                "request timed out waiting for a response"
            );
            self.forget_completed();
        }
        request.wait()
    }

    // =========================================================================
    // Blocking Execution
    // =========================================================================

    /// Dispatch `op` and wait for its outcome
    pub fn execute(&self, op: KvOperation) -> Result<KvResponse> {
        self.execute_with(op, self.config.kv_timeout, self.retry_strategy)
    }

    pub fn execute_with(
        &self,
        op: KvOperation,
        timeout: Duration,
        strategy: RetryStrategy,
    ) -> Result<KvResponse> {
        let deadline = Instant::now().checked_add(timeout);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                return Err(KvError::Timeout(timeout));
            }

            let request = self.dispatch_with_timeout(op.clone(), remaining)?;
            match self.await_request(&request) {
                Err(KvError::Status { status, .. })
                    if status.is_temporary()
                        && strategy == RetryStrategy::BestEffort
                        && op.idempotent() =>
                {
                    debug!(operation = op.name(), attempt, ?status, "transient status, retrying");
                    thread::sleep(TRANSIENT_RETRY_DELAY.min(remaining));
                }
                Err(KvError::Cancelled(CancellationReason::Timeout)) => {
                    return Err(KvError::Timeout(timeout));
                }
                other => return other,
            }
        }
    }

    // =========================================================================
    // Typed Operations
    // =========================================================================

    fn doc_key(&self, id: &str) -> Result<DocKey> {
        Ok(DocKey::new(id)?.in_collection(self.collection))
    }

    /// Whole document content with its CAS
    pub fn get(&self, id: &str) -> Result<Versioned<Bytes>> {
        let response = self.execute(KvOperation::get(self.doc_key(id)?))?;
        let content = response.content().cloned().unwrap_or_default();
        Ok(Versioned::new(content, response.cas))
    }

    pub fn insert(&self, id: &str, content: impl Into<Bytes>) -> Result<MutationResult> {
        let op = KvOperation::insert(self.doc_key(id)?, content, 0)?;
        Ok(mutation_result(self.execute(op)?))
    }

    pub fn upsert(&self, id: &str, content: impl Into<Bytes>, cas: Cas) -> Result<MutationResult> {
        let op = KvOperation::upsert(self.doc_key(id)?, content, 0, cas)?;
        Ok(mutation_result(self.execute(op)?))
    }

    pub fn increment(&self, id: &str, counter: Counter) -> Result<CounterResult> {
        let op = KvOperation::increment(self.doc_key(id)?, counter);
        Ok(counter_result(self.execute(op)?))
    }

    pub fn decrement(&self, id: &str, counter: Counter) -> Result<CounterResult> {
        let op = KvOperation::decrement(self.doc_key(id)?, counter);
        Ok(counter_result(self.execute(op)?))
    }

    pub fn get_meta(&self, id: &str) -> Result<MetaResult> {
        let response = self.execute(KvOperation::get_meta(self.doc_key(id)?))?;
        Ok(MetaResult {
            cas: response.cas,
            deleted: response.deleted(),
        })
    }

    /// Live document check; tombstones count as absent
    pub fn exists(&self, id: &str) -> Result<bool> {
        match self.get_meta(id) {
            Ok(meta) => Ok(!meta.deleted),
            Err(KvError::DocumentNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn lookup_in(&self, id: &str, specs: Vec<LookupSpec>) -> Result<LookupInResult> {
        let op = KvOperation::lookup_in(self.doc_key(id)?, specs)?;
        let response = self.execute(op)?;
        Ok(LookupInResult {
            cas: response.cas,
            fields: response.lookup_fields().to_vec(),
        })
    }

    pub fn mutate_in(&self, id: &str, specs: Vec<MutationSpec>, cas: Cas) -> Result<MutationResult> {
        let op = KvOperation::mutate_in(self.doc_key(id)?, specs, cas, 0)?;
        Ok(mutation_result(self.execute(op)?))
    }
}

fn mutation_result(response: KvResponse) -> MutationResult {
    MutationResult {
        cas: response.cas,
        mutation_token: response.mutation_token,
    }
}

fn counter_result(response: KvResponse) -> CounterResult {
    CounterResult {
        content: response.counter().unwrap_or_default(),
        cas: response.cas,
        mutation_token: response.mutation_token,
    }
}

/// Turn a non-success status into the error the caller sees.
///
/// Multi-path lookups with failing specs still succeed; their per-spec
/// statuses are for the caller to interpret.
fn check_status(op: &KvOperation, response: KvResponse) -> Result<KvResponse> {
    if response.status.is_success() {
        return Ok(response);
    }
    if matches!(op, KvOperation::LookupIn { .. }) && response.status.is_multi_path_failure() {
        return Ok(response);
    }
    Err(status_error(op, &response))
}

fn status_error(op: &KvOperation, response: &KvResponse) -> KvError {
    let id = op.key().id().to_string();
    match (response.status, &response.body) {
        (ResponseStatus::NotFound, _) => KvError::DocumentNotFound { id },
        (ResponseStatus::Exists, _) if op.cas() != NO_CAS => KvError::CasMismatch { id },
        (ResponseStatus::Exists, _) => KvError::DocumentExists { id },
        (_, ResponseBody::MutationFailed { index, status }) => {
            let path = match op {
                KvOperation::MutateIn { specs, .. } => specs
                    .get(*index as usize)
                    .map(|spec| spec.path.clone())
                    .unwrap_or_default(),
                _ => String::new(),
            };
            subdoc_error(*status, path, response.error_context.clone())
        }
        (status, _) => KvError::Status {
            status,
            context: response.error_context.clone(),
        },
    }
}

fn subdoc_error(status: ResponseStatus, path: String, context: Option<String>) -> KvError {
    match status {
        ResponseStatus::SubdocPathNotFound => KvError::PathNotFound { path },
        ResponseStatus::SubdocPathExists => KvError::PathExists { path },
        ResponseStatus::SubdocPathMismatch => KvError::PathMismatch { path },
        other => KvError::Status { status: other, context },
    }
}
