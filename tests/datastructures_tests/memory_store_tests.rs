//! Memory Store Tests
//!
//! Tests verify:
//! - Insert/upsert/get with fresh CAS values on every write
//! - Field reads, counts and CAS-guarded field writes
//! - Server-like errors for missing documents, paths and stale CAS

use serde_json::json;

use kvlink::datastructures::field_path;
use kvlink::protocol::NO_CAS;
use kvlink::{DocumentStore, KvError, MemoryStore};

// =============================================================================
// Document Tests
// =============================================================================

#[test]
fn test_new_store_is_empty() {
    let store = MemoryStore::new();
    assert_eq!(store.document_count(), 0);
    assert!(!store.contains("doc"));
}

#[test]
fn test_insert_then_get() {
    let store = MemoryStore::new();
    let cas = store.insert("doc", &json!({"a": 1})).unwrap();

    let document = store.get("doc").unwrap();
    assert_eq!(document.value, json!({"a": 1}));
    assert_eq!(document.cas, cas);
    assert_ne!(cas, NO_CAS);
}

#[test]
fn test_insert_existing_fails() {
    let store = MemoryStore::new();
    store.insert("doc", &json!({})).unwrap();

    let err = store.insert("doc", &json!({"b": 2})).unwrap_err();
    assert!(matches!(err, KvError::DocumentExists { .. }));
    assert_eq!(store.get("doc").unwrap().value, json!({}));
}

#[test]
fn test_upsert_replaces_and_bumps_cas() {
    let store = MemoryStore::new();
    let first = store.upsert("doc", &json!({"a": 1})).unwrap();
    let second = store.upsert("doc", &json!({})).unwrap();

    assert!(second > first);
    assert_eq!(store.get("doc").unwrap().value, json!({}));
}

#[test]
fn test_get_missing_document() {
    let store = MemoryStore::new();
    assert!(store.get("nope").unwrap_err().is_not_found());
}

#[test]
fn test_remove_document() {
    let store = MemoryStore::new();
    store.insert("doc", &json!({})).unwrap();
    assert!(store.remove("doc"));
    assert!(!store.remove("doc"));
    assert_eq!(store.document_count(), 0);
}

// =============================================================================
// Field Read Tests
// =============================================================================

#[test]
fn test_lookup_field_present_and_absent() {
    let store = MemoryStore::new();
    let cas = store.insert("doc", &json!({"a": "x"})).unwrap();

    let present = store.lookup_field("doc", "a").unwrap();
    assert_eq!(present.value, Some(json!("x")));
    assert_eq!(present.cas, cas);

    let absent = store.lookup_field("doc", "b").unwrap();
    assert_eq!(absent.value, None);
    assert_eq!(absent.cas, cas);
}

#[test]
fn test_field_exists_and_count() {
    let store = MemoryStore::new();
    store
        .insert("doc", &json!({"a": 1, "list": [1, 2, 3], "obj": {"k": true}}))
        .unwrap();

    assert!(store.field_exists("doc", "a").unwrap());
    assert!(!store.field_exists("doc", "z").unwrap());
    assert_eq!(store.field_count("doc", "").unwrap(), 3);
    assert_eq!(store.field_count("doc", "list").unwrap(), 3);
    assert_eq!(store.field_count("doc", "obj").unwrap(), 1);
    assert!(matches!(store.field_count("doc", "a"), Err(KvError::PathMismatch { .. })));
    assert!(matches!(store.field_count("doc", "z"), Err(KvError::PathNotFound { .. })));
}

#[test]
fn test_field_ops_on_missing_document() {
    let store = MemoryStore::new();
    assert!(store.lookup_field("nope", "a").unwrap_err().is_not_found());
    assert!(store.upsert_field("nope", "a", &json!(1), NO_CAS).unwrap_err().is_not_found());
}

#[test]
fn test_field_ops_on_non_object_document() {
    let store = MemoryStore::new();
    store.insert("scalar", &json!(5)).unwrap();
    assert!(matches!(
        store.lookup_field("scalar", "a"),
        Err(KvError::PathMismatch { .. })
    ));
}

#[test]
fn test_escaped_paths_address_literal_keys() {
    let store = MemoryStore::new();
    store.insert("doc", &json!({})).unwrap();

    store.upsert_field("doc", &field_path("a.b"), &json!(1), NO_CAS).unwrap();
    assert_eq!(store.get("doc").unwrap().value, json!({"a.b": 1}));
    assert!(store.field_exists("doc", &field_path("a.b")).unwrap());
}

// =============================================================================
// Guarded Write Tests
// =============================================================================

#[test]
fn test_upsert_field_with_current_cas() {
    let store = MemoryStore::new();
    let cas = store.insert("doc", &json!({})).unwrap();

    let next = store.upsert_field("doc", "a", &json!(1), cas).unwrap();
    assert_ne!(next, cas);
    assert_eq!(store.get("doc").unwrap().cas, next);
}

#[test]
fn test_upsert_field_with_stale_cas() {
    let store = MemoryStore::new();
    let stale = store.insert("doc", &json!({})).unwrap();
    store.upsert_field("doc", "a", &json!(1), stale).unwrap();

    let err = store.upsert_field("doc", "a", &json!(2), stale).unwrap_err();
    assert!(err.is_cas_mismatch());
    assert_eq!(store.get("doc").unwrap().value, json!({"a": 1}));
}

#[test]
fn test_no_cas_writes_unconditionally() {
    let store = MemoryStore::new();
    store.insert("doc", &json!({})).unwrap();
    store.upsert("doc", &json!({"x": 0})).unwrap();

    store.upsert_field("doc", "a", &json!(1), NO_CAS).unwrap();
    assert_eq!(store.get("doc").unwrap().value, json!({"x": 0, "a": 1}));
}

#[test]
fn test_remove_field() {
    let store = MemoryStore::new();
    let cas = store.insert("doc", &json!({"a": 1, "b": 2})).unwrap();

    store.remove_field("doc", "a", cas).unwrap();
    assert_eq!(store.get("doc").unwrap().value, json!({"b": 2}));
}

#[test]
fn test_remove_missing_field_leaves_cas() {
    let store = MemoryStore::new();
    let cas = store.insert("doc", &json!({})).unwrap();

    let err = store.remove_field("doc", "a", cas).unwrap_err();
    assert!(matches!(err, KvError::PathNotFound { .. }));
    assert_eq!(store.get("doc").unwrap().cas, cas);
}
