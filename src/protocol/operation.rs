//! Typed operations
//!
//! Validated descriptions of what a request asks the server to do. Invalid
//! parameters are rejected here, so encoding itself cannot fail.

use bytes::Bytes;

use crate::error::{KvError, Result};
use super::context::{partition_for_key, CollectionId};
use super::opcode::{Opcode, SubdocOpcode};

/// Opaque document version
pub type Cas = u64;

/// CAS precondition meaning "unconditional"
pub const NO_CAS: Cas = 0;

/// Longest document id the server accepts
pub const MAX_KEY_LEN: usize = 250;

/// Longest subdocument path the server accepts
pub const MAX_PATH_LEN: usize = 1024;

/// Most specs allowed in one multi-path request
pub const MAX_SPECS: usize = 16;

/// Largest document content or summed subdocument values. Keeps every
/// encoded body under `MAX_BODY_SIZE`.
pub const MAX_VALUE_LEN: usize = 20 * 1024 * 1024;

/// Expiry written on counters without an initial value, telling the server
/// to report not-found instead of creating the document
pub const COUNTER_NOT_EXISTS_EXPIRY: u32 = 0xFFFF_FFFF;

/// Common flags marking a document as JSON
pub const JSON_COMMON_FLAGS: u32 = 0x0200_0006;

/// Document id plus its namespace and routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocKey {
    id: String,
    collection: CollectionId,
    partition: u16,
}

impl DocKey {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(KvError::InvalidArgument("Document id cannot be empty".to_string()));
        }
        if id.len() > MAX_KEY_LEN {
            return Err(KvError::InvalidArgument(format!(
                "Document id is {} bytes (max {})",
                id.len(),
                MAX_KEY_LEN
            )));
        }
        Ok(Self {
            id,
            collection: CollectionId::DEFAULT,
            partition: 0,
        })
    }

    pub fn in_collection(mut self, collection: CollectionId) -> Self {
        self.collection = collection;
        self
    }

    pub fn on_partition(mut self, partition: u16) -> Self {
        self.partition = partition;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> CollectionId {
        self.collection
    }

    pub fn partition(&self) -> u16 {
        self.partition
    }
}

/// Parameters of an increment or decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    delta: u64,
    initial: Option<u64>,
    expiry: u32,
}

impl Counter {
    /// Rejects negative `delta` and negative `initial`
    pub fn new(delta: i64, initial: Option<i64>, expiry: u32) -> Result<Self> {
        if delta < 0 {
            return Err(KvError::InvalidArgument(
                "The delta cannot be less than 0".to_string(),
            ));
        }
        let initial = match initial {
            Some(value) if value < 0 => {
                return Err(KvError::InvalidArgument(
                    "The initial needs to be >= 0".to_string(),
                ))
            }
            Some(value) => Some(value as u64),
            None => None,
        };
        Ok(Self {
            delta: delta as u64,
            initial,
            expiry,
        })
    }

    pub fn delta(&self) -> u64 {
        self.delta
    }

    pub fn initial(&self) -> Option<u64> {
        self.initial
    }

    pub fn expiry(&self) -> u32 {
        self.expiry
    }
}

/// What a lookup spec reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Get,
    Exists,
    Count,
}

/// One path of a multi-path lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSpec {
    pub kind: LookupKind,
    pub path: String,
}

impl LookupSpec {
    pub fn get(path: impl Into<String>) -> Self {
        Self { kind: LookupKind::Get, path: path.into() }
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Self { kind: LookupKind::Exists, path: path.into() }
    }

    /// Number of children at `path`; the empty path counts root fields
    pub fn count(path: impl Into<String>) -> Self {
        Self { kind: LookupKind::Count, path: path.into() }
    }

    pub fn opcode(&self) -> SubdocOpcode {
        match self.kind {
            LookupKind::Get => SubdocOpcode::Get,
            LookupKind::Exists => SubdocOpcode::Exists,
            LookupKind::Count => SubdocOpcode::GetCount,
        }
    }
}

/// What a mutation spec writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Upsert,
    Remove,
}

/// One path of a multi-path mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationSpec {
    pub kind: MutationKind,
    pub path: String,
    /// JSON fragment; empty for removals
    pub value: Bytes,
    pub create_parents: bool,
}

impl MutationSpec {
    pub fn upsert(path: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            kind: MutationKind::Upsert,
            path: path.into(),
            value: value.into(),
            create_parents: false,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Remove,
            path: path.into(),
            value: Bytes::new(),
            create_parents: false,
        }
    }

    pub fn create_parents(mut self) -> Self {
        self.create_parents = true;
        self
    }

    pub fn opcode(&self) -> SubdocOpcode {
        match self.kind {
            MutationKind::Upsert => SubdocOpcode::DictUpsert,
            MutationKind::Remove => SubdocOpcode::Delete,
        }
    }
}

/// A request kind with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOperation {
    Get {
        key: DocKey,
    },
    Insert {
        key: DocKey,
        content: Bytes,
        expiry: u32,
    },
    Upsert {
        key: DocKey,
        content: Bytes,
        expiry: u32,
        cas: Cas,
    },
    Increment {
        key: DocKey,
        counter: Counter,
    },
    Decrement {
        key: DocKey,
        counter: Counter,
    },
    GetMeta {
        key: DocKey,
    },
    LookupIn {
        key: DocKey,
        specs: Vec<LookupSpec>,
    },
    MutateIn {
        key: DocKey,
        specs: Vec<MutationSpec>,
        cas: Cas,
        expiry: u32,
    },
}

impl KvOperation {
    pub fn get(key: DocKey) -> Self {
        KvOperation::Get { key }
    }

    pub fn get_meta(key: DocKey) -> Self {
        KvOperation::GetMeta { key }
    }

    /// Create a JSON document; fails on the server if it already exists
    pub fn insert(key: DocKey, content: impl Into<Bytes>, expiry: u32) -> Result<Self> {
        let content = content.into();
        check_value_len(content.len())?;
        Ok(KvOperation::Insert { key, content, expiry })
    }

    /// Create or replace a JSON document
    pub fn upsert(key: DocKey, content: impl Into<Bytes>, expiry: u32, cas: Cas) -> Result<Self> {
        let content = content.into();
        check_value_len(content.len())?;
        Ok(KvOperation::Upsert { key, content, expiry, cas })
    }

    pub fn increment(key: DocKey, counter: Counter) -> Self {
        KvOperation::Increment { key, counter }
    }

    pub fn decrement(key: DocKey, counter: Counter) -> Self {
        KvOperation::Decrement { key, counter }
    }

    pub fn lookup_in(key: DocKey, specs: Vec<LookupSpec>) -> Result<Self> {
        check_spec_count(specs.len())?;
        for spec in &specs {
            check_path(&spec.path, spec.kind != LookupKind::Count)?;
        }
        Ok(KvOperation::LookupIn { key, specs })
    }

    pub fn mutate_in(key: DocKey, specs: Vec<MutationSpec>, cas: Cas, expiry: u32) -> Result<Self> {
        check_spec_count(specs.len())?;
        for spec in &specs {
            check_path(&spec.path, true)?;
            match spec.kind {
                MutationKind::Upsert if spec.value.is_empty() => {
                    return Err(KvError::InvalidArgument(format!(
                        "Upsert of path {:?} needs a value",
                        spec.path
                    )))
                }
                MutationKind::Remove if !spec.value.is_empty() => {
                    return Err(KvError::InvalidArgument(format!(
                        "Remove of path {:?} cannot carry a value",
                        spec.path
                    )))
                }
                _ => {}
            }
        }
        check_value_len(specs.iter().map(|spec| spec.value.len()).sum())?;
        Ok(KvOperation::MutateIn { key, specs, cas, expiry })
    }

    /// Operation name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            KvOperation::Get { .. } => "get",
            KvOperation::Insert { .. } => "insert",
            KvOperation::Upsert { .. } => "upsert",
            KvOperation::Increment { .. } => "increment",
            KvOperation::Decrement { .. } => "decrement",
            KvOperation::GetMeta { .. } => "get_meta",
            KvOperation::LookupIn { .. } => "lookup_in",
            KvOperation::MutateIn { .. } => "mutate_in",
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            KvOperation::Get { .. } => Opcode::Get,
            KvOperation::Insert { .. } => Opcode::Insert,
            KvOperation::Upsert { .. } => Opcode::Upsert,
            KvOperation::Increment { .. } => Opcode::Increment,
            KvOperation::Decrement { .. } => Opcode::Decrement,
            KvOperation::GetMeta { .. } => Opcode::GetMeta,
            KvOperation::LookupIn { .. } => Opcode::SubdocMultiLookup,
            KvOperation::MutateIn { .. } => Opcode::SubdocMultiMutation,
        }
    }

    pub fn key(&self) -> &DocKey {
        match self {
            KvOperation::Get { key }
            | KvOperation::Insert { key, .. }
            | KvOperation::Upsert { key, .. }
            | KvOperation::Increment { key, .. }
            | KvOperation::Decrement { key, .. }
            | KvOperation::GetMeta { key }
            | KvOperation::LookupIn { key, .. }
            | KvOperation::MutateIn { key, .. } => key,
        }
    }

    fn key_mut(&mut self) -> &mut DocKey {
        match self {
            KvOperation::Get { key }
            | KvOperation::Insert { key, .. }
            | KvOperation::Upsert { key, .. }
            | KvOperation::Increment { key, .. }
            | KvOperation::Decrement { key, .. }
            | KvOperation::GetMeta { key }
            | KvOperation::LookupIn { key, .. }
            | KvOperation::MutateIn { key, .. } => key,
        }
    }

    /// CAS precondition written into the header
    pub fn cas(&self) -> Cas {
        match self {
            KvOperation::Upsert { cas, .. } | KvOperation::MutateIn { cas, .. } => *cas,
            _ => NO_CAS,
        }
    }

    /// Safe to send again after an ambiguous or transient failure
    pub fn idempotent(&self) -> bool {
        matches!(
            self,
            KvOperation::Get { .. } | KvOperation::GetMeta { .. } | KvOperation::LookupIn { .. }
        )
    }

    /// Whether a successful response may carry a mutation token
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            KvOperation::Insert { .. }
                | KvOperation::Upsert { .. }
                | KvOperation::Increment { .. }
                | KvOperation::Decrement { .. }
                | KvOperation::MutateIn { .. }
        )
    }

    /// Assign the partition the document id hashes to
    pub fn route(&mut self, num_partitions: u16) {
        let key = self.key_mut();
        key.partition = partition_for_key(key.id.as_bytes(), num_partitions);
    }
}

fn check_spec_count(count: usize) -> Result<()> {
    if count == 0 {
        return Err(KvError::InvalidArgument("At least one spec is required".to_string()));
    }
    if count > MAX_SPECS {
        return Err(KvError::InvalidArgument(format!(
            "{} specs given (max {})",
            count, MAX_SPECS
        )));
    }
    Ok(())
}

fn check_value_len(len: usize) -> Result<()> {
    if len > MAX_VALUE_LEN {
        return Err(KvError::InvalidArgument(format!(
            "Value is {} bytes (max {})",
            len, MAX_VALUE_LEN
        )));
    }
    Ok(())
}

fn check_path(path: &str, required: bool) -> Result<()> {
    if required && path.is_empty() {
        return Err(KvError::InvalidArgument("Path cannot be empty".to_string()));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(KvError::InvalidArgument(format!(
            "Path is {} bytes (max {})",
            path.len(),
            MAX_PATH_LEN
        )));
    }
    Ok(())
}
