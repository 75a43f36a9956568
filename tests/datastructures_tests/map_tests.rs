//! Document Map Tests
//!
//! Tests verify:
//! - Map semantics (put returns the previous value, remove of absent keys)
//! - Opening is idempotent and safe under concurrent creation
//! - Conflicting writers are retried up to the configured ceiling
//! - Entry snapshots route mutations through the map
//! - Keys with path metacharacters are stored verbatim

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use kvlink::protocol::Cas;
use kvlink::{Config, DocumentMap, DocumentStore, KvError, MemoryStore, Result, Versioned};

fn open_map<V>(store: &Arc<MemoryStore>) -> DocumentMap<V, MemoryStore>
where
    V: Serialize + serde::de::DeserializeOwned,
{
    DocumentMap::open("map::test", Arc::clone(store), Config::default()).unwrap()
}

/// Store that lets another writer slip in before the first `interference`
/// guarded writes, so each of them meets a stale CAS
struct ConflictingStore {
    inner: MemoryStore,
    interference: AtomicU32,
    guarded_writes: AtomicU32,
}

impl ConflictingStore {
    fn new(interference: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            interference: AtomicU32::new(interference),
            guarded_writes: AtomicU32::new(0),
        }
    }

    fn interfere(&self, id: &str) -> Result<()> {
        self.guarded_writes.fetch_add(1, Ordering::SeqCst);
        let pending = self.interference.load(Ordering::SeqCst);
        if pending > 0 {
            self.interference.store(pending - 1, Ordering::SeqCst);
            let current = self.inner.get(id)?;
            self.inner.upsert(id, &current.value)?;
        }
        Ok(())
    }
}

impl DocumentStore for ConflictingStore {
    fn insert(&self, id: &str, content: &Value) -> Result<Cas> {
        self.inner.insert(id, content)
    }

    fn upsert(&self, id: &str, content: &Value) -> Result<Cas> {
        self.inner.upsert(id, content)
    }

    fn get(&self, id: &str) -> Result<Versioned<Value>> {
        self.inner.get(id)
    }

    fn lookup_field(&self, id: &str, path: &str) -> Result<Versioned<Option<Value>>> {
        self.inner.lookup_field(id, path)
    }

    fn field_exists(&self, id: &str, path: &str) -> Result<bool> {
        self.inner.field_exists(id, path)
    }

    fn field_count(&self, id: &str, path: &str) -> Result<u64> {
        self.inner.field_count(id, path)
    }

    fn upsert_field(&self, id: &str, path: &str, value: &Value, cas: Cas) -> Result<Cas> {
        self.interfere(id)?;
        self.inner.upsert_field(id, path, value, cas)
    }

    fn remove_field(&self, id: &str, path: &str, cas: Cas) -> Result<Cas> {
        self.interfere(id)?;
        self.inner.remove_field(id, path, cas)
    }
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_returns_previous_value() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<i64>(&store);

    assert_eq!(map.put("x", &1).unwrap(), None);
    assert_eq!(map.put("x", &2).unwrap(), Some(1));
    assert_eq!(map.get("x").unwrap(), Some(2));
}

#[test]
fn test_get_missing_key() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<String>(&store);
    assert_eq!(map.get("nope").unwrap(), None);
}

#[test]
fn test_remove_returns_value() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<String>(&store);

    map.put("k", &"v".to_string()).unwrap();
    assert_eq!(map.remove("k").unwrap(), Some("v".to_string()));
    assert_eq!(map.get("k").unwrap(), None);
    assert!(!map.contains_key("k").unwrap());
}

#[test]
fn test_remove_absent_key_returns_none() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<String>(&store);

    assert_eq!(map.remove("ghost").unwrap(), None);
    assert_eq!(map.size().unwrap(), 0);
}

#[test]
fn test_size_contains_and_clear() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<u32>(&store);
    assert!(map.is_empty().unwrap());

    map.put("a", &1).unwrap();
    map.put("b", &2).unwrap();
    map.put("a", &3).unwrap();

    assert_eq!(map.size().unwrap(), 2);
    assert!(map.contains_key("a").unwrap());
    assert!(!map.contains_key("c").unwrap());

    map.clear().unwrap();
    assert_eq!(map.size().unwrap(), 0);
    assert_eq!(map.get("a").unwrap(), None);
    assert!(store.contains(map.id()));
}

#[test]
fn test_empty_key_rejected() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<u32>(&store);

    assert!(matches!(map.put("", &1), Err(KvError::InvalidArgument(_))));
    assert!(matches!(map.get(""), Err(KvError::InvalidArgument(_))));
    assert!(matches!(map.remove(""), Err(KvError::InvalidArgument(_))));
}

#[test]
fn test_keys_with_path_characters_stored_verbatim() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<u32>(&store);

    map.put("a.b", &1).unwrap();
    map.put("list[0]", &2).unwrap();
    map.put("tick`", &3).unwrap();

    let document = store.get("map::test").unwrap().value;
    assert_eq!(document, json!({"a.b": 1, "list[0]": 2, "tick`": 3}));
    assert_eq!(map.get("a.b").unwrap(), Some(1));
    assert_eq!(map.remove("tick`").unwrap(), Some(3));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Session {
    user: String,
    expires_at: u64,
}

#[test]
fn test_structured_values() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<Session>(&store);

    let session = Session { user: "ada".to_string(), expires_at: 1_700_000_000 };
    map.put("s1", &session).unwrap();
    assert_eq!(map.get("s1").unwrap(), Some(session));
}

#[test]
fn test_mismatched_value_type_is_serialization_error() {
    let store = Arc::new(MemoryStore::new());
    open_map::<String>(&store).put("k", &"text".to_string()).unwrap();

    let numbers = open_map::<u64>(&store);
    assert!(matches!(numbers.get("k"), Err(KvError::Serialization(_))));
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_keeps_existing_content() {
    let store = Arc::new(MemoryStore::new());
    open_map::<u32>(&store).put("kept", &5).unwrap();

    let reopened = open_map::<u32>(&store);
    assert_eq!(reopened.get("kept").unwrap(), Some(5));
}

#[test]
fn test_concurrent_open_creates_one_document() {
    let store = Arc::new(MemoryStore::new());

    crossbeam::thread::scope(|s| {
        for _ in 0..8 {
            let store = Arc::clone(&store);
            s.spawn(move |_| {
                DocumentMap::<u32, _>::open("shared", store, Config::default()).unwrap();
            });
        }
    })
    .unwrap();

    assert_eq!(store.document_count(), 1);
    assert_eq!(store.get("shared").unwrap().value, json!({}));
}

// =============================================================================
// Contention Tests
// =============================================================================

#[test]
fn test_put_retries_through_conflicts() {
    let store = Arc::new(ConflictingStore::new(3));
    let map: DocumentMap<u32, _> =
        DocumentMap::open("contended", Arc::clone(&store), Config::default()).unwrap();

    assert_eq!(map.put("k", &1).unwrap(), None);
    assert_eq!(store.guarded_writes.load(Ordering::SeqCst), 4);
    assert_eq!(map.get("k").unwrap(), Some(1));
}

#[test]
fn test_put_gives_up_at_retry_limit() {
    let store = Arc::new(ConflictingStore::new(u32::MAX));
    let config = Config::builder().cas_retry_limit(5).build();
    let map: DocumentMap<u32, _> = DocumentMap::open("contended", Arc::clone(&store), config).unwrap();

    let err = map.put("k", &1).unwrap_err();
    assert!(err.is_contention());
    assert_eq!(store.guarded_writes.load(Ordering::SeqCst), 5);
    assert_eq!(err.to_string(), "Couldn't perform put in less than 5 iterations");
    assert_eq!(map.get("k").unwrap(), None);
}

#[test]
fn test_remove_retries_through_conflicts() {
    let store = Arc::new(ConflictingStore::new(0));
    let map: DocumentMap<u32, _> =
        DocumentMap::open("contended", Arc::clone(&store), Config::default()).unwrap();
    map.put("k", &9).unwrap();

    store.interference.store(2, Ordering::SeqCst);
    store.guarded_writes.store(0, Ordering::SeqCst);

    assert_eq!(map.remove("k").unwrap(), Some(9));
    assert_eq!(store.guarded_writes.load(Ordering::SeqCst), 3);
}

#[test]
fn test_concurrent_puts_all_land() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::builder().cas_retry_limit(10_000).build();
    let map: DocumentMap<usize, _> = DocumentMap::open("busy", Arc::clone(&store), config).unwrap();

    crossbeam::thread::scope(|s| {
        for t in 0..4 {
            let map = &map;
            s.spawn(move |_| {
                for i in 0..5 {
                    let key = format!("t{}-{}", t, i);
                    map.put(&key, &(t * 10 + i)).unwrap();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(map.size().unwrap(), 20);
    assert_eq!(map.get("t3-4").unwrap(), Some(34));
}

// =============================================================================
// Entry Snapshot Tests
// =============================================================================

#[test]
fn test_entries_snapshot_is_sorted() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<u32>(&store);
    map.put("b", &2).unwrap();
    map.put("a", &1).unwrap();

    let entries = map.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.keys().cloned().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(entries.get("a"), Some(&1));

    let pairs: Vec<(String, u32)> = (&entries).into_iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(pairs, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
}

#[test]
fn test_snapshot_remove_routes_through_map() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<u32>(&store);
    map.put("a", &1).unwrap();
    map.put("b", &2).unwrap();

    let mut entries = map.entries().unwrap();
    assert_eq!(entries.remove("a").unwrap(), Some(1));

    assert!(entries.get("a").is_none());
    assert_eq!(map.get("a").unwrap(), None);
    assert_eq!(map.size().unwrap(), 1);
}

#[test]
fn test_snapshot_remove_ignores_keys_added_later() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<u32>(&store);

    let mut entries = map.entries().unwrap();
    map.put("late", &7).unwrap();

    assert_eq!(entries.remove("late").unwrap(), None);
    assert_eq!(map.get("late").unwrap(), Some(7));
}

#[test]
fn test_snapshot_remove_after_concurrent_delete() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<u32>(&store);
    map.put("gone", &1).unwrap();

    let mut entries = map.entries().unwrap();
    map.remove("gone").unwrap();

    assert_eq!(entries.remove("gone").unwrap(), None);
    assert!(entries.is_empty());
}

#[test]
fn test_snapshot_set_and_clear() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<u32>(&store);
    map.put("a", &1).unwrap();

    let mut entries = map.entries().unwrap();
    assert_eq!(entries.set("a", 10).unwrap(), Some(1));
    assert_eq!(entries.set("b", 20).unwrap(), None);
    assert_eq!(map.get("a").unwrap(), Some(10));
    assert_eq!(entries.get("b"), Some(&20));

    entries.clear().unwrap();
    assert!(entries.is_empty());
    assert_eq!(map.size().unwrap(), 0);
}

#[test]
fn test_snapshot_into_map() {
    let store = Arc::new(MemoryStore::new());
    let map = open_map::<u32>(&store);
    map.put("only", &1).unwrap();

    let owned = map.entries().unwrap().into_map();
    assert_eq!(owned.get("only"), Some(&1));
}
