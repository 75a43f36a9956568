//! Frame layout
//!
//! Writing and bounds-checked reading of the fixed 24-byte header and the
//! three variable body sections.
//!
//! ```text
//! ┌───────┬────────┬─────────┬──────────┬──────────┬───────────────────┐
//! │Magic 1│Opcode 1│KeyLen 2 │ExtLen 1  │DataType 1│Partition/Status 2 │
//! ├───────┴────────┴─────────┴──────────┴──────────┴───────────────────┤
//! │ Total body length (4)                                              │
//! ├────────────────────────────────────────────────────────────────────┤
//! │ Opaque (4)                                                         │
//! ├────────────────────────────────────────────────────────────────────┤
//! │ CAS (8)                                                            │
//! ├────────────────────────────────────────────────────────────────────┤
//! │ Extras (ExtLen) │ Key (KeyLen) │ Value (BodyLen - ExtLen - KeyLen) │
//! └────────────────────────────────────────────────────────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{KvError, Result};
use super::opcode::{Opcode, REQUEST_MAGIC, RESPONSE_MAGIC};
use super::status::ResponseStatus;

/// Fixed header size
pub const HEADER_SIZE: usize = 24;

/// Maximum body size accepted on decode (20 MB plus room for metadata)
pub const MAX_BODY_SIZE: u32 = 21 * 1024 * 1024;

/// Decoded fixed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u8,
    pub opcode: u8,
    pub key_len: u16,
    pub extras_len: u8,
    pub datatype: u8,
    /// Partition id on requests, status code on responses
    pub partition_or_status: u16,
    pub body_len: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl FrameHeader {
    /// Parse the header from the first 24 bytes of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(KvError::Protocol(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let header = FrameHeader {
            magic: buf.get_u8(),
            opcode: buf.get_u8(),
            key_len: buf.get_u16(),
            extras_len: buf.get_u8(),
            datatype: buf.get_u8(),
            partition_or_status: buf.get_u16(),
            body_len: buf.get_u32(),
            opaque: buf.get_u32(),
            cas: buf.get_u64(),
        };

        if header.magic != REQUEST_MAGIC && header.magic != RESPONSE_MAGIC {
            return Err(KvError::Protocol(format!(
                "Unknown magic byte: 0x{:02x}",
                header.magic
            )));
        }
        if header.body_len > MAX_BODY_SIZE {
            return Err(KvError::Protocol(format!(
                "Body too large: {} bytes (max {})",
                header.body_len, MAX_BODY_SIZE
            )));
        }
        if header.extras_len as usize + header.key_len as usize > header.body_len as usize {
            return Err(KvError::Protocol(format!(
                "Inconsistent header: extras ({}) + key ({}) exceed body length {}",
                header.extras_len, header.key_len, header.body_len
            )));
        }

        Ok(header)
    }

    pub fn is_response(&self) -> bool {
        self.magic == RESPONSE_MAGIC
    }

    /// Status of a response frame
    pub fn status(&self) -> ResponseStatus {
        ResponseStatus::from_u16(self.partition_or_status)
    }

    /// Length of the value section implied by the header
    pub fn value_len(&self) -> usize {
        self.body_len as usize - self.extras_len as usize - self.key_len as usize
    }

    /// Header plus body
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.body_len as usize
    }
}

/// A parsed frame borrowing its sections from the input buffer
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    pub extras: &'a [u8],
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parse a complete frame. Bytes past the declared body are ignored.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let header = FrameHeader::parse(bytes)?;

        let total_len = header.frame_len();
        if bytes.len() < total_len {
            return Err(KvError::Protocol(format!(
                "Incomplete body: expected {} bytes, got {}",
                total_len,
                bytes.len()
            )));
        }

        let body = &bytes[HEADER_SIZE..total_len];
        let (extras, rest) = body.split_at(header.extras_len as usize);
        let (key, value) = rest.split_at(header.key_len as usize);

        Ok(Frame {
            header,
            extras,
            key,
            value,
        })
    }
}

/// Length of the first complete frame in `buf`, if one is fully buffered.
///
/// Lets a transport split a byte stream into frames before handing them
/// to the core.
pub fn complete_frame_len(buf: &[u8]) -> Result<Option<usize>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }
    let header = FrameHeader::parse(buf)?;
    if buf.len() < header.frame_len() {
        Ok(None)
    } else {
        Ok(Some(header.frame_len()))
    }
}

/// Variable sections of a frame being written
#[derive(Debug, Clone, Copy, Default)]
pub struct Sections<'a> {
    pub extras: &'a [u8],
    pub key: &'a [u8],
    pub value: &'a [u8],
}

/// Write a request frame
pub fn request(
    opcode: Opcode,
    datatype: u8,
    partition: u16,
    opaque: u32,
    cas: u64,
    sections: Sections<'_>,
) -> Bytes {
    write_frame(
        REQUEST_MAGIC,
        opcode as u8,
        datatype,
        partition,
        opaque,
        cas,
        sections,
    )
}

/// Write a response frame (used by servers and test doubles)
pub fn response(
    opcode: u8,
    datatype: u8,
    status: ResponseStatus,
    opaque: u32,
    cas: u64,
    sections: Sections<'_>,
) -> Bytes {
    write_frame(
        RESPONSE_MAGIC,
        opcode,
        datatype,
        status.as_u16(),
        opaque,
        cas,
        sections,
    )
}

fn write_frame(
    magic: u8,
    opcode: u8,
    datatype: u8,
    partition_or_status: u16,
    opaque: u32,
    cas: u64,
    sections: Sections<'_>,
) -> Bytes {
    debug_assert!(sections.extras.len() <= u8::MAX as usize);
    debug_assert!(sections.key.len() <= u16::MAX as usize);

    let body_len = sections.extras.len() + sections.key.len() + sections.value.len();

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + body_len);
    frame.put_u8(magic);
    frame.put_u8(opcode);
    frame.put_u16(sections.key.len() as u16);
    frame.put_u8(sections.extras.len() as u8);
    frame.put_u8(datatype);
    frame.put_u16(partition_or_status);
    frame.put_u32(body_len as u32);
    frame.put_u32(opaque);
    frame.put_u64(cas);
    frame.put_slice(sections.extras);
    frame.put_slice(sections.key);
    frame.put_slice(sections.value);

    frame.freeze()
}
