//! In-memory document store
//!
//! HashMap of JSON documents behind a parking_lot RwLock. Every write
//! assigns a fresh CAS, and guarded field writes are checked against it the
//! way a server does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::{KvError, Result};
use crate::protocol::{Cas, NO_CAS};
use crate::retry::Versioned;
use super::path::parse_field_path;
use super::store::DocumentStore;

struct StoredDocument {
    content: Value,
    cas: Cas,
}

/// Process-local [`DocumentStore`]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
    next_cas: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            next_cas: AtomicU64::new(1),
        }
    }

    /// Number of stored documents
    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.read().contains_key(id)
    }

    /// Drop a document outright
    pub fn remove(&self, id: &str) -> bool {
        self.documents.write().remove(id).is_some()
    }

    fn fresh_cas(&self) -> Cas {
        self.next_cas.fetch_add(1, Ordering::Relaxed)
    }

    fn with_object<R>(&self, id: &str, f: impl FnOnce(&Map<String, Value>, Cas) -> Result<R>) -> Result<R> {
        let documents = self.documents.read();
        let document = documents
            .get(id)
            .ok_or_else(|| KvError::DocumentNotFound { id: id.to_string() })?;
        match &document.content {
            Value::Object(object) => f(object, document.cas),
            _ => Err(KvError::PathMismatch { path: String::new() }),
        }
    }

    fn mutate_object(
        &self,
        id: &str,
        cas: Cas,
        f: impl FnOnce(&mut Map<String, Value>) -> Result<()>,
    ) -> Result<Cas> {
        let mut documents = self.documents.write();
        let document = documents
            .get_mut(id)
            .ok_or_else(|| KvError::DocumentNotFound { id: id.to_string() })?;
        if cas != NO_CAS && cas != document.cas {
            return Err(KvError::CasMismatch { id: id.to_string() });
        }
        match &mut document.content {
            Value::Object(object) => f(object)?,
            _ => return Err(KvError::PathMismatch { path: String::new() }),
        }
        document.cas = self.fresh_cas();
        Ok(document.cas)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&self, id: &str, content: &Value) -> Result<Cas> {
        let mut documents = self.documents.write();
        if documents.contains_key(id) {
            return Err(KvError::DocumentExists { id: id.to_string() });
        }
        let cas = self.fresh_cas();
        documents.insert(
            id.to_string(),
            StoredDocument { content: content.clone(), cas },
        );
        Ok(cas)
    }

    fn upsert(&self, id: &str, content: &Value) -> Result<Cas> {
        let cas = self.fresh_cas();
        self.documents.write().insert(
            id.to_string(),
            StoredDocument { content: content.clone(), cas },
        );
        Ok(cas)
    }

    fn get(&self, id: &str) -> Result<Versioned<Value>> {
        let documents = self.documents.read();
        let document = documents
            .get(id)
            .ok_or_else(|| KvError::DocumentNotFound { id: id.to_string() })?;
        Ok(Versioned::new(document.content.clone(), document.cas))
    }

    fn lookup_field(&self, id: &str, path: &str) -> Result<Versioned<Option<Value>>> {
        let field = parse_field_path(path)?;
        self.with_object(id, |object, cas| {
            Ok(Versioned::new(object.get(&field).cloned(), cas))
        })
    }

    fn field_exists(&self, id: &str, path: &str) -> Result<bool> {
        let field = parse_field_path(path)?;
        self.with_object(id, |object, _| Ok(object.contains_key(&field)))
    }

    fn field_count(&self, id: &str, path: &str) -> Result<u64> {
        if path.is_empty() {
            return self.with_object(id, |object, _| Ok(object.len() as u64));
        }
        let field = parse_field_path(path)?;
        self.with_object(id, |object, _| match object.get(&field) {
            Some(Value::Object(child)) => Ok(child.len() as u64),
            Some(Value::Array(child)) => Ok(child.len() as u64),
            Some(_) => Err(KvError::PathMismatch { path: path.to_string() }),
            None => Err(KvError::PathNotFound { path: path.to_string() }),
        })
    }

    fn upsert_field(&self, id: &str, path: &str, value: &Value, cas: Cas) -> Result<Cas> {
        let field = parse_field_path(path)?;
        self.mutate_object(id, cas, |object| {
            object.insert(field, value.clone());
            Ok(())
        })
    }

    fn remove_field(&self, id: &str, path: &str, cas: Cas) -> Result<Cas> {
        let field = parse_field_path(path)?;
        self.mutate_object(id, cas, |object| match object.remove(&field) {
            Some(_) => Ok(()),
            None => Err(KvError::PathNotFound { path: path.to_string() }),
        })
    }
}
