//! Response definitions
//!
//! Typed results produced by decoding a response frame.

use bytes::Bytes;

use super::operation::Cas;
use super::status::ResponseStatus;

/// Partition-scoped sequence number of a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationToken {
    pub partition: u16,
    pub partition_uuid: u64,
    pub sequence_number: u64,
    pub bucket: String,
}

/// Result of one lookup spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdocField {
    pub status: ResponseStatus,
    pub value: Bytes,
}

/// Result of one mutation spec that returned a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdocMutationResult {
    pub index: u8,
    pub status: ResponseStatus,
    pub value: Bytes,
}

/// Operation-specific payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Nothing beyond status and CAS
    Empty,

    /// Full document content
    Content { flags: u32, content: Bytes },

    /// Counter value after increment/decrement
    Counter(u64),

    /// Metadata probe
    Meta { deleted: bool },

    /// One entry per lookup spec, in request order
    Lookup(Vec<SubdocField>),

    /// Specs of a successful mutation that produced values
    Mutation(Vec<SubdocMutationResult>),

    /// First failing spec of a multi-path mutation
    MutationFailed { index: u8, status: ResponseStatus },
}

/// A decoded response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvResponse {
    pub opaque: u32,
    pub status: ResponseStatus,
    pub cas: Cas,
    pub body: ResponseBody,
    pub mutation_token: Option<MutationToken>,

    /// Server-provided error text of a failed response, when it sent one
    pub error_context: Option<String>,
}

impl KvResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn counter(&self) -> Option<u64> {
        match self.body {
            ResponseBody::Counter(value) => Some(value),
            _ => None,
        }
    }

    /// Tombstone flag of a metadata probe; unknown reads as not deleted
    pub fn deleted(&self) -> bool {
        matches!(self.body, ResponseBody::Meta { deleted: true })
    }

    pub fn content(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Content { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn lookup_fields(&self) -> &[SubdocField] {
        match &self.body {
            ResponseBody::Lookup(fields) => fields,
            _ => &[],
        }
    }
}
