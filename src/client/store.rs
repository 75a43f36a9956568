//! [`DocumentStore`] over the wire
//!
//! Field reads become single-spec lookups and field writes become
//! single-spec mutations carrying the caller's CAS.

use serde_json::Value;

use crate::datastructures::DocumentStore;
use crate::error::{KvError, Result};
use crate::protocol::{Cas, LookupSpec, MutationSpec, ResponseStatus, SubdocField, NO_CAS};
use crate::retry::Versioned;
use super::{subdoc_error, KvClient, Transport};

impl<T: Transport> DocumentStore for KvClient<T> {
    fn insert(&self, id: &str, content: &Value) -> Result<Cas> {
        Ok(KvClient::insert(self, id, serde_json::to_vec(content)?)?.cas)
    }

    fn upsert(&self, id: &str, content: &Value) -> Result<Cas> {
        Ok(KvClient::upsert(self, id, serde_json::to_vec(content)?, NO_CAS)?.cas)
    }

    fn get(&self, id: &str) -> Result<Versioned<Value>> {
        let document = KvClient::get(self, id)?;
        let content = serde_json::from_slice(&document.value)?;
        Ok(Versioned::new(content, document.cas))
    }

    fn lookup_field(&self, id: &str, path: &str) -> Result<Versioned<Option<Value>>> {
        let result = self.lookup_in(id, vec![LookupSpec::get(path)])?;
        let value = match single_field(&result.fields, path)? {
            Some(field) => Some(serde_json::from_slice(&field.value)?),
            None => None,
        };
        Ok(Versioned::new(value, result.cas))
    }

    fn field_exists(&self, id: &str, path: &str) -> Result<bool> {
        let result = self.lookup_in(id, vec![LookupSpec::exists(path)])?;
        Ok(single_field(&result.fields, path)?.is_some())
    }

    fn field_count(&self, id: &str, path: &str) -> Result<u64> {
        let result = self.lookup_in(id, vec![LookupSpec::count(path)])?;
        let field = single_field(&result.fields, path)?
            .ok_or_else(|| KvError::PathNotFound { path: path.to_string() })?;
        std::str::from_utf8(&field.value)
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .ok_or_else(|| KvError::Protocol(format!("Count of {:?} is not a number", path)))
    }

    fn upsert_field(&self, id: &str, path: &str, value: &Value, cas: Cas) -> Result<Cas> {
        let spec = MutationSpec::upsert(path, serde_json::to_vec(value)?);
        Ok(self.mutate_in(id, vec![spec], cas)?.cas)
    }

    fn remove_field(&self, id: &str, path: &str, cas: Cas) -> Result<Cas> {
        Ok(self.mutate_in(id, vec![MutationSpec::remove(path)], cas)?.cas)
    }
}

/// The only field of a one-spec lookup; `None` when the path is absent
fn single_field<'a>(fields: &'a [SubdocField], path: &str) -> Result<Option<&'a SubdocField>> {
    let field = fields
        .first()
        .ok_or_else(|| KvError::Protocol("Lookup returned no results".to_string()))?;
    match field.status {
        ResponseStatus::Success => Ok(Some(field)),
        ResponseStatus::SubdocPathNotFound => Ok(None),
        status => Err(subdoc_error(status, path.to_string(), None)),
    }
}
