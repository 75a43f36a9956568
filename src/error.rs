//! Error types for kvlink
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::protocol::ResponseStatus;
use crate::request::CancellationReason;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for kvlink operations
///
/// `Clone` so that one failure can be handed to every waiter of a request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server responded with {status:?}{}", fmt_context(.context))]
    Status {
        status: ResponseStatus,
        context: Option<String>,
    },

    // -------------------------------------------------------------------------
    // Document Errors
    // -------------------------------------------------------------------------
    #[error("CAS mismatch on document {id}")]
    CasMismatch { id: String },

    #[error("Document already exists: {id}")]
    DocumentExists { id: String },

    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Path already exists: {path}")]
    PathExists { path: String },

    #[error("Path mismatch: {path}")]
    PathMismatch { path: String },

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Couldn't perform {operation} in less than {attempts} iterations")]
    ConcurrentModification { operation: String, attempts: u32 },

    #[error("Request cancelled: {0:?}")]
    Cancelled(CancellationReason),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    // -------------------------------------------------------------------------
    // Serialization / Transport Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl KvError {
    /// True when a CAS-guarded write lost against a concurrent writer
    pub fn is_cas_mismatch(&self) -> bool {
        matches!(self, KvError::CasMismatch { .. })
    }

    /// True for absent document or absent path
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            KvError::DocumentNotFound { .. } | KvError::PathNotFound { .. }
        )
    }

    /// True when an optimistic retry loop ran out of attempts
    pub fn is_contention(&self) -> bool {
        matches!(self, KvError::ConcurrentModification { .. })
    }
}

fn fmt_context(context: &Option<String>) -> String {
    context
        .as_deref()
        .map(|c| format!(": {c}"))
        .unwrap_or_default()
}

impl From<serde_json::Error> for KvError {
    fn from(e: serde_json::Error) -> Self {
        KvError::Serialization(e.to_string())
    }
}
