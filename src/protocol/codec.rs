//! Protocol codec
//!
//! Encoding of typed operations into request frames and decoding of
//! response frames into typed results.
//!
//! ## Extras by Operation
//! - GET:          none (response: flags (4))
//! - INSERT/UPSERT: flags (4) + expiry (4)
//! - INCR/DECR:    delta (8) + initial (8) + expiry (4)
//! - GET_META:     version (1) = 0x02 (response: deleted (4) + ...)
//! - LOOKUP_IN:    none
//! - MUTATE_IN:    expiry (4), only when set
//!
//! ## Multi-path Bodies
//! ```text
//! lookup spec:    ┌──────┬───────┬──────────┬──────┐
//!                 │Op (1)│Flg (1)│PathLen(2)│ Path │
//!                 └──────┴───────┴──────────┴──────┘
//! mutation spec:  ┌──────┬───────┬──────────┬─────────┬──────┬───────┐
//!                 │Op (1)│Flg (1)│PathLen(2)│ValLen(4)│ Path │ Value │
//!                 └──────┴───────┴──────────┴─────────┴──────┴───────┘
//! lookup result:  ┌──────────┬────────┬───────┐
//!                 │Status (2)│Len (4) │ Value │
//!                 └──────────┴────────┴───────┘
//! ```
//!
//! Both directions are pure: no state survives a call, and scratch
//! buffers are owned by the call that allocates them.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{KvError, Result};
use super::context::{encode_key, ChannelContext};
use super::frame::{self, Frame, Sections};
use super::opcode::{datatype, path_flags};
use super::operation::{
    Counter, KvOperation, LookupSpec, MutationSpec, COUNTER_NOT_EXISTS_EXPIRY, JSON_COMMON_FLAGS,
    NO_CAS,
};
use super::response::{KvResponse, MutationToken, ResponseBody, SubdocField, SubdocMutationResult};
use super::status::ResponseStatus;

/// Version byte requesting the extended get-meta layout
const GET_META_VERSION: u8 = 0x02;

/// Extras of a successful mutation carrying a token: uuid (8) + seqno (8)
const MUTATION_TOKEN_EXTRAS_LEN: usize = 16;

// =============================================================================
// Encoding
// =============================================================================

/// Encode `op` into a request frame for a channel with capabilities `ctx`
pub fn encode(op: &KvOperation, opaque: u32, ctx: &ChannelContext) -> Bytes {
    let key = op.key();
    let wire_key = encode_key(key.id(), key.collection(), ctx);
    let partition = key.partition();

    let frame = match op {
        KvOperation::Get { .. } => frame::request(
            op.opcode(),
            datatype::RAW,
            partition,
            opaque,
            NO_CAS,
            Sections { key: &wire_key, ..Default::default() },
        ),
        KvOperation::Insert { content, expiry, .. } => {
            let extras = document_extras(*expiry);
            frame::request(
                op.opcode(),
                datatype::JSON,
                partition,
                opaque,
                NO_CAS,
                Sections { extras: &extras, key: &wire_key, value: content },
            )
        }
        KvOperation::Upsert { content, expiry, cas, .. } => {
            let extras = document_extras(*expiry);
            frame::request(
                op.opcode(),
                datatype::JSON,
                partition,
                opaque,
                *cas,
                Sections { extras: &extras, key: &wire_key, value: content },
            )
        }
        KvOperation::Increment { counter, .. } | KvOperation::Decrement { counter, .. } => {
            let extras = counter_extras(counter);
            frame::request(
                op.opcode(),
                datatype::RAW,
                partition,
                opaque,
                NO_CAS,
                Sections { extras: &extras, key: &wire_key, ..Default::default() },
            )
        }
        KvOperation::GetMeta { .. } => frame::request(
            op.opcode(),
            datatype::RAW,
            partition,
            opaque,
            NO_CAS,
            Sections { extras: &[GET_META_VERSION], key: &wire_key, ..Default::default() },
        ),
        KvOperation::LookupIn { specs, .. } => {
            let body = lookup_body(specs);
            frame::request(
                op.opcode(),
                datatype::RAW,
                partition,
                opaque,
                NO_CAS,
                Sections { key: &wire_key, value: &body, ..Default::default() },
            )
        }
        KvOperation::MutateIn { specs, cas, expiry, .. } => {
            let extras = if *expiry != 0 {
                expiry.to_be_bytes().to_vec()
            } else {
                Vec::new()
            };
            let body = mutation_body(specs);
            frame::request(
                op.opcode(),
                datatype::RAW,
                partition,
                opaque,
                *cas,
                Sections { extras: &extras, key: &wire_key, value: &body },
            )
        }
    };

    tracing::trace!(
        operation = op.name(),
        opaque,
        partition,
        frame_len = frame.len(),
        "encoded request"
    );

    frame
}

/// Increment/decrement extras
///
/// Without an initial value, initial is written as 0 and expiry as the
/// not-exists sentinel so the server reports not-found rather than
/// creating the counter.
pub fn counter_extras(counter: &Counter) -> [u8; 20] {
    let mut extras = [0u8; 20];
    let mut buf = &mut extras[..];
    buf.put_u64(counter.delta());
    match counter.initial() {
        Some(initial) => {
            buf.put_u64(initial);
            buf.put_u32(counter.expiry());
        }
        None => {
            buf.put_u64(0);
            buf.put_u32(COUNTER_NOT_EXISTS_EXPIRY);
        }
    }
    extras
}

fn document_extras(expiry: u32) -> [u8; 8] {
    let mut extras = [0u8; 8];
    let mut buf = &mut extras[..];
    buf.put_u32(JSON_COMMON_FLAGS);
    buf.put_u32(expiry);
    extras
}

fn lookup_body(specs: &[LookupSpec]) -> BytesMut {
    let size: usize = specs.iter().map(|s| 4 + s.path.len()).sum();
    let mut body = BytesMut::with_capacity(size);
    for spec in specs {
        body.put_u8(spec.opcode() as u8);
        body.put_u8(path_flags::NONE);
        body.put_u16(spec.path.len() as u16);
        body.put_slice(spec.path.as_bytes());
    }
    body
}

fn mutation_body(specs: &[MutationSpec]) -> BytesMut {
    let size: usize = specs.iter().map(|s| 8 + s.path.len() + s.value.len()).sum();
    let mut body = BytesMut::with_capacity(size);
    for spec in specs {
        let flags = if spec.create_parents {
            path_flags::CREATE_PARENTS
        } else {
            path_flags::NONE
        };
        body.put_u8(spec.opcode() as u8);
        body.put_u8(flags);
        body.put_u16(spec.path.len() as u16);
        body.put_u32(spec.value.len() as u32);
        body.put_slice(spec.path.as_bytes());
        body.put_slice(&spec.value);
    }
    body
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a response frame answering `op`
pub fn decode(op: &KvOperation, bytes: &[u8], ctx: &ChannelContext) -> Result<KvResponse> {
    let frame = Frame::parse(bytes)?;
    let header = frame.header;

    if !header.is_response() {
        return Err(KvError::Protocol(format!(
            "Expected a response frame, got magic 0x{:02x}",
            header.magic
        )));
    }
    if header.opcode != op.opcode() as u8 {
        return Err(KvError::Protocol(format!(
            "Response opcode 0x{:02x} does not answer {} (0x{:02x})",
            header.opcode,
            op.name(),
            op.opcode() as u8
        )));
    }
    if header.datatype & datatype::SNAPPY != 0 {
        return Err(KvError::Protocol(
            "Compressed response received but compression was not negotiated".to_string(),
        ));
    }

    let status = header.status();
    let body = decode_body(op, status, &frame)?;

    let error_context = if !status.is_success()
        && !status.is_multi_path_failure()
        && !frame.value.is_empty()
    {
        Some(String::from_utf8_lossy(frame.value).into_owned())
    } else {
        None
    };

    let mutation_token = if op.is_mutation()
        && status.is_success()
        && ctx.mutation_tokens_enabled
        && frame.extras.len() >= MUTATION_TOKEN_EXTRAS_LEN
    {
        let mut extras = frame.extras;
        Some(MutationToken {
            partition: op.key().partition(),
            partition_uuid: extras.get_u64(),
            sequence_number: extras.get_u64(),
            bucket: ctx.bucket.clone(),
        })
    } else {
        None
    };

    tracing::trace!(
        operation = op.name(),
        opaque = header.opaque,
        ?status,
        "decoded response"
    );

    Ok(KvResponse {
        opaque: header.opaque,
        status,
        cas: header.cas,
        body,
        mutation_token,
        error_context,
    })
}

fn decode_body(op: &KvOperation, status: ResponseStatus, frame: &Frame<'_>) -> Result<ResponseBody> {
    match op {
        KvOperation::Get { .. } => {
            if !status.is_success() {
                return Ok(ResponseBody::Empty);
            }
            let flags = if frame.extras.len() >= 4 {
                let mut extras = frame.extras;
                extras.get_u32()
            } else {
                0
            };
            Ok(ResponseBody::Content {
                flags,
                content: Bytes::copy_from_slice(frame.value),
            })
        }
        KvOperation::Insert { .. } | KvOperation::Upsert { .. } => Ok(ResponseBody::Empty),
        KvOperation::Increment { .. } | KvOperation::Decrement { .. } => {
            if !status.is_success() || frame.value.is_empty() {
                return Ok(ResponseBody::Counter(0));
            }
            if frame.value.len() < 8 {
                return Err(KvError::Protocol(format!(
                    "Counter value truncated: expected 8 bytes, got {}",
                    frame.value.len()
                )));
            }
            let mut value = frame.value;
            Ok(ResponseBody::Counter(value.get_u64()))
        }
        KvOperation::GetMeta { .. } => {
            // Fewer than 4 bytes means the flag is unknown: not deleted.
            let deleted = if frame.extras.len() >= 4 {
                let mut extras = frame.extras;
                extras.get_u32() != 0
            } else {
                false
            };
            Ok(ResponseBody::Meta { deleted })
        }
        KvOperation::LookupIn { specs, .. } => {
            if status.is_success() || status.is_multi_path_failure() {
                Ok(ResponseBody::Lookup(decode_lookup_results(frame.value, specs.len())?))
            } else {
                Ok(ResponseBody::Empty)
            }
        }
        KvOperation::MutateIn { specs, .. } => {
            if status.is_success() {
                Ok(ResponseBody::Mutation(decode_mutation_results(frame.value, specs.len())?))
            } else if status.is_multi_path_failure() {
                let mut value = frame.value;
                if value.remaining() < 3 {
                    return Err(KvError::Protocol(format!(
                        "Multi-path failure body truncated: expected 3 bytes, got {}",
                        value.remaining()
                    )));
                }
                let index = value.get_u8();
                let status = ResponseStatus::from_u16(value.get_u16());
                if index as usize >= specs.len() {
                    return Err(KvError::Protocol(format!(
                        "Failing spec index {} out of range ({} specs)",
                        index,
                        specs.len()
                    )));
                }
                Ok(ResponseBody::MutationFailed { index, status })
            } else {
                Ok(ResponseBody::Empty)
            }
        }
    }
}

fn decode_lookup_results(mut value: &[u8], expected: usize) -> Result<Vec<SubdocField>> {
    let mut fields = Vec::with_capacity(expected);
    while value.has_remaining() {
        if value.remaining() < 6 {
            return Err(KvError::Protocol(format!(
                "Lookup result {} truncated in its header",
                fields.len()
            )));
        }
        let status = ResponseStatus::from_u16(value.get_u16());
        let len = value.get_u32() as usize;
        if value.remaining() < len {
            return Err(KvError::Protocol(format!(
                "Lookup result {} declares {} bytes, {} remain",
                fields.len(),
                len,
                value.remaining()
            )));
        }
        fields.push(SubdocField {
            status,
            value: Bytes::copy_from_slice(&value[..len]),
        });
        value.advance(len);
    }

    if fields.len() != expected {
        return Err(KvError::Protocol(format!(
            "Expected {} lookup results, got {}",
            expected,
            fields.len()
        )));
    }
    Ok(fields)
}

fn decode_mutation_results(mut value: &[u8], spec_count: usize) -> Result<Vec<SubdocMutationResult>> {
    let mut results = Vec::new();
    while value.has_remaining() {
        if value.remaining() < 7 {
            return Err(KvError::Protocol(
                "Mutation result truncated in its header".to_string(),
            ));
        }
        let index = value.get_u8();
        let status = ResponseStatus::from_u16(value.get_u16());
        let len = value.get_u32() as usize;
        if index as usize >= spec_count {
            return Err(KvError::Protocol(format!(
                "Mutation result index {} out of range ({} specs)",
                index, spec_count
            )));
        }
        if value.remaining() < len {
            return Err(KvError::Protocol(format!(
                "Mutation result {} declares {} bytes, {} remain",
                index,
                len,
                value.remaining()
            )));
        }
        results.push(SubdocMutationResult {
            index,
            status,
            value: Bytes::copy_from_slice(&value[..len]),
        });
        value.advance(len);
    }
    Ok(results)
}
