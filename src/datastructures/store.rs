//! Document store seam
//!
//! The single-document and single-field operations the data structures
//! are built from. Every field write takes a CAS precondition; `NO_CAS`
//! (0) writes unconditionally.

use serde_json::Value;

use crate::error::Result;
use crate::protocol::Cas;
use crate::retry::Versioned;

/// JSON documents addressed by id, with field-level access
pub trait DocumentStore: Send + Sync {
    /// Create a document. Fails with `DocumentExists` if it is already there.
    fn insert(&self, id: &str, content: &Value) -> Result<Cas>;

    /// Create or replace a whole document, ignoring its current version
    fn upsert(&self, id: &str, content: &Value) -> Result<Cas>;

    /// Whole document with its CAS
    fn get(&self, id: &str) -> Result<Versioned<Value>>;

    /// Field at `path`, `None` when absent, with the document's CAS
    fn lookup_field(&self, id: &str, path: &str) -> Result<Versioned<Option<Value>>>;

    fn field_exists(&self, id: &str, path: &str) -> Result<bool>;

    /// Number of children at `path`; the empty path counts root fields
    fn field_count(&self, id: &str, path: &str) -> Result<u64>;

    /// Set field `path` if the document is still at `cas`
    fn upsert_field(&self, id: &str, path: &str, value: &Value, cas: Cas) -> Result<Cas>;

    /// Remove field `path` if the document is still at `cas`.
    /// Fails with `PathNotFound` when the field is absent.
    fn remove_field(&self, id: &str, path: &str, cas: Cas) -> Result<Cas>;
}
