//! In-process server speaking the binary protocol
//!
//! Drains request frames from a [`ChannelTransport`], applies them to a
//! document table and feeds the response frames back into the client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use bytes::{Buf, Bytes};
use parking_lot::Mutex;
use serde_json::Value;

use kvlink::datastructures::parse_field_path;
use kvlink::protocol::{
    frames, ChannelContext, Frame, FrameHeader, Opcode, ResponseStatus, Sections, SubdocOpcode,
    COUNTER_NOT_EXISTS_EXPIRY, JSON_COMMON_FLAGS,
};
use kvlink::{ChannelTransport, Config, KvClient};

pub type Client = KvClient<ChannelTransport>;

/// Partition uuid reported in every mutation token
pub const PARTITION_UUID: u64 = 0xbeef;

struct Doc {
    content: Vec<u8>,
    cas: u64,
    deleted: bool,
}

/// Server state shared with the test
#[derive(Default)]
pub struct ServerState {
    documents: Mutex<HashMap<String, Doc>>,
    next_cas: AtomicU64,
    /// Swallow requests without answering
    pub silent: AtomicBool,
    /// Answer this many requests with a temporary failure first
    pub transient_failures: AtomicU32,
    /// Requests received
    pub requests: AtomicU32,
}

/// Client wired to a fresh server thread. The thread exits once the client
/// is dropped.
pub fn start(config: Config) -> (Arc<Client>, Arc<ServerState>) {
    let (transport, requests) = ChannelTransport::unbounded();
    let channel = ChannelContext::new(config.bucket.clone()).with_mutation_tokens(true);
    let client = Arc::new(KvClient::new(transport, channel, config));
    let state = Arc::new(ServerState::default());

    let weak: Weak<Client> = Arc::downgrade(&client);
    let server = Arc::clone(&state);
    thread::spawn(move || {
        for frame in requests.iter() {
            let Some(response) = server.handle(&frame) else {
                continue;
            };
            match weak.upgrade() {
                Some(client) => {
                    let _ = client.handle_response(&response);
                }
                None => break,
            }
        }
    });

    (client, state)
}

impl ServerState {
    /// Store a JSON document directly
    pub fn seed(&self, id: &str, content: &Value) {
        let cas = self.fresh_cas();
        self.documents.lock().insert(
            id.to_string(),
            Doc { content: serde_json::to_vec(content).unwrap(), cas, deleted: false },
        );
    }

    /// Turn a document into a tombstone
    pub fn tombstone(&self, id: &str) {
        if let Some(doc) = self.documents.lock().get_mut(id) {
            doc.deleted = true;
        }
    }

    pub fn document(&self, id: &str) -> Option<Value> {
        self.documents
            .lock()
            .get(id)
            .filter(|doc| !doc.deleted)
            .map(|doc| serde_json::from_slice(&doc.content).unwrap())
    }

    fn fresh_cas(&self) -> u64 {
        self.next_cas.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn handle(&self, bytes: &[u8]) -> Option<Bytes> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.silent.load(Ordering::SeqCst) {
            return None;
        }

        let frame = Frame::parse(bytes).unwrap();
        let h = frame.header;

        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Some(reply(&h, ResponseStatus::TemporaryFailure, 0, &[], &[]));
        }

        let id = String::from_utf8(frame.key.to_vec()).unwrap();
        let mut docs = self.documents.lock();
        let live = docs.get(&id).filter(|doc| !doc.deleted);

        let response = match Opcode::from_u8(h.opcode).unwrap() {
            Opcode::Get => match live {
                None => reply(&h, ResponseStatus::NotFound, 0, &[], &[]),
                Some(doc) => reply(
                    &h,
                    ResponseStatus::Success,
                    doc.cas,
                    &JSON_COMMON_FLAGS.to_be_bytes(),
                    &doc.content,
                ),
            },
            Opcode::Insert => {
                if live.is_some() {
                    reply(&h, ResponseStatus::Exists, 0, &[], &[])
                } else {
                    self.store(&mut docs, &h, id, frame.value.to_vec())
                }
            }
            Opcode::Upsert => match live {
                None if h.cas != 0 => reply(&h, ResponseStatus::NotFound, 0, &[], &[]),
                Some(doc) if h.cas != 0 && doc.cas != h.cas => {
                    reply(&h, ResponseStatus::Exists, 0, &[], &[])
                }
                _ => self.store(&mut docs, &h, id, frame.value.to_vec()),
            },
            Opcode::Increment | Opcode::Decrement => {
                let mut extras = frame.extras;
                let delta = extras.get_u64();
                let initial = extras.get_u64();
                let expiry = extras.get_u32();

                let current = live.map(|doc| {
                    std::str::from_utf8(&doc.content).unwrap().parse::<u64>().unwrap()
                });
                let next = match current {
                    None if expiry == COUNTER_NOT_EXISTS_EXPIRY => {
                        return Some(reply(&h, ResponseStatus::NotFound, 0, &[], &[]));
                    }
                    None => initial,
                    Some(value) if h.opcode == Opcode::Increment as u8 => value.wrapping_add(delta),
                    Some(value) => value.saturating_sub(delta),
                };

                let cas = self.fresh_cas();
                docs.insert(
                    id,
                    Doc { content: next.to_string().into_bytes(), cas, deleted: false },
                );
                reply(&h, ResponseStatus::Success, cas, &token(cas), &next.to_be_bytes())
            }
            Opcode::GetMeta => match docs.get(&id) {
                None => reply(&h, ResponseStatus::NotFound, 0, &[], &[]),
                Some(doc) => {
                    let mut extras = Vec::new();
                    extras.extend_from_slice(&(doc.deleted as u32).to_be_bytes());
                    extras.extend_from_slice(&JSON_COMMON_FLAGS.to_be_bytes());
                    extras.extend_from_slice(&0u32.to_be_bytes());
                    extras.extend_from_slice(&doc.cas.to_be_bytes());
                    reply(&h, ResponseStatus::Success, doc.cas, &extras, &[])
                }
            },
            Opcode::SubdocMultiLookup => match live {
                None => reply(&h, ResponseStatus::NotFound, 0, &[], &[]),
                Some(doc) => {
                    let content: Value = serde_json::from_slice(&doc.content).unwrap();
                    let mut body = Vec::new();
                    let mut all_ok = true;
                    let mut specs = frame.value;
                    while specs.has_remaining() {
                        let opcode = specs.get_u8();
                        let _flags = specs.get_u8();
                        let path_len = specs.get_u16() as usize;
                        let path = std::str::from_utf8(&specs[..path_len]).unwrap().to_string();
                        specs.advance(path_len);

                        let (status, value) = lookup(&content, opcode, &path);
                        all_ok &= status == ResponseStatus::Success;
                        body.extend_from_slice(&status.as_u16().to_be_bytes());
                        body.extend_from_slice(&(value.len() as u32).to_be_bytes());
                        body.extend_from_slice(&value);
                    }
                    let status = if all_ok {
                        ResponseStatus::Success
                    } else {
                        ResponseStatus::SubdocMultiPathFailure
                    };
                    reply(&h, status, doc.cas, &[], &body)
                }
            },
            Opcode::SubdocMultiMutation => match live {
                None => reply(&h, ResponseStatus::NotFound, 0, &[], &[]),
                Some(doc) if h.cas != 0 && doc.cas != h.cas => {
                    reply(&h, ResponseStatus::Exists, 0, &[], &[])
                }
                Some(doc) => {
                    let mut content: Value = serde_json::from_slice(&doc.content).unwrap();
                    let object = content.as_object_mut().unwrap();
                    let mut specs = frame.value;
                    let mut index = 0u8;
                    while specs.has_remaining() {
                        let opcode = specs.get_u8();
                        let _flags = specs.get_u8();
                        let path_len = specs.get_u16() as usize;
                        let value_len = specs.get_u32() as usize;
                        let path = std::str::from_utf8(&specs[..path_len]).unwrap().to_string();
                        specs.advance(path_len);
                        let value = specs[..value_len].to_vec();
                        specs.advance(value_len);

                        let field = parse_field_path(&path).unwrap();
                        let failed = match SubdocOpcode::from_u8(opcode).unwrap() {
                            SubdocOpcode::DictUpsert => {
                                object.insert(field, serde_json::from_slice(&value).unwrap());
                                None
                            }
                            SubdocOpcode::Delete => match object.remove(&field) {
                                Some(_) => None,
                                None => Some(ResponseStatus::SubdocPathNotFound),
                            },
                            _ => Some(ResponseStatus::SubdocInvalidCombo),
                        };
                        if let Some(status) = failed {
                            let mut body = vec![index];
                            body.extend_from_slice(&status.as_u16().to_be_bytes());
                            return Some(reply(
                                &h,
                                ResponseStatus::SubdocMultiPathFailure,
                                0,
                                &[],
                                &body,
                            ));
                        }
                        index += 1;
                    }
                    self.store(&mut docs, &h, id, serde_json::to_vec(&content).unwrap())
                }
            },
        };
        Some(response)
    }

    fn store(
        &self,
        docs: &mut HashMap<String, Doc>,
        h: &FrameHeader,
        id: String,
        content: Vec<u8>,
    ) -> Bytes {
        let cas = self.fresh_cas();
        docs.insert(id, Doc { content, cas, deleted: false });
        reply(h, ResponseStatus::Success, cas, &token(cas), &[])
    }
}

fn lookup(content: &Value, opcode: u8, path: &str) -> (ResponseStatus, Vec<u8>) {
    let object = content.as_object().unwrap();
    let opcode = SubdocOpcode::from_u8(opcode).unwrap();
    if opcode == SubdocOpcode::GetCount && path.is_empty() {
        return (ResponseStatus::Success, object.len().to_string().into_bytes());
    }

    let field = parse_field_path(path).unwrap();
    match (opcode, object.get(&field)) {
        (_, None) => (ResponseStatus::SubdocPathNotFound, Vec::new()),
        (SubdocOpcode::Get, Some(value)) => (ResponseStatus::Success, serde_json::to_vec(value).unwrap()),
        (SubdocOpcode::Exists, Some(_)) => (ResponseStatus::Success, Vec::new()),
        (SubdocOpcode::GetCount, Some(Value::Object(child))) => {
            (ResponseStatus::Success, child.len().to_string().into_bytes())
        }
        (SubdocOpcode::GetCount, Some(Value::Array(child))) => {
            (ResponseStatus::Success, child.len().to_string().into_bytes())
        }
        _ => (ResponseStatus::SubdocPathMismatch, Vec::new()),
    }
}

fn token(seqno: u64) -> [u8; 16] {
    let mut extras = [0u8; 16];
    extras[..8].copy_from_slice(&PARTITION_UUID.to_be_bytes());
    extras[8..].copy_from_slice(&seqno.to_be_bytes());
    extras
}

fn reply(h: &FrameHeader, status: ResponseStatus, cas: u64, extras: &[u8], value: &[u8]) -> Bytes {
    frames::response(
        h.opcode,
        0,
        status,
        h.opaque,
        cas,
        Sections { extras, key: &[], value },
    )
}
