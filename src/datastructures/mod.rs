//! Data Structures Module
//!
//! Concurrency-safe collections layered on single-document operations.
//!
//! ## Layering
//! ```text
//! ┌──────────────────────────────┐
//! │ DocumentMap / EntrySnapshot  │  map semantics
//! └──────────────┬───────────────┘
//!                │ GuardedUpdate (read → compute → CAS write)
//! ┌──────────────▼───────────────┐
//! │        DocumentStore         │  field ops with CAS preconditions
//! └──────┬────────────────┬──────┘
//!        ▼                ▼
//!   MemoryStore     KvClient (wire)
//! ```

mod map;
mod memory;
mod path;
mod store;

pub use map::{DocumentMap, EntrySnapshot};
pub use memory::MemoryStore;
pub use path::{field_path, parse_field_path};
pub use store::DocumentStore;
