//! # kvlink
//!
//! Client-side engine for a clustered key-value store:
//! - Binary wire codec for document, counter and subdocument operations
//! - Exactly-once request lifecycle shared by responses, timeouts and shutdown
//! - Optimistic retry engine for read-modify-write under CAS
//! - Document-backed map built on field-level CAS writes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                DocumentMap / EntrySnapshot                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ GuardedUpdate (read → compute → CAS write)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    DocumentStore                             │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │   MemoryStore   │                │    KvClient     │
//!   │    (RwLock)     │                │  (in-flight by  │
//!   └─────────────────┘                │     opaque)     │
//!                                      └────────┬────────┘
//!                                               │ Request<KvResponse>
//!                                      ┌────────▼────────┐
//!                                      │    Protocol     │
//!                                      │ (encode/decode) │
//!                                      └────────┬────────┘
//!                                               ▼
//!                                           Transport
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod request;
pub mod retry;
pub mod client;
pub mod datastructures;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, ConfigBuilder};
pub use client::{ChannelTransport, KvClient, RetryStrategy, Transport};
pub use datastructures::{DocumentMap, DocumentStore, MemoryStore};
pub use request::{CancellationReason, Request, RequestState};
pub use retry::{attempt_guarded_update, Backoff, GuardedUpdate, Versioned};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvlink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
