//! Opcode definitions
//!
//! Command identifiers carried in byte 1 of every frame, plus the
//! per-spec opcodes used inside multi-path subdocument bodies.

/// Magic byte of a client request frame
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte of a server response frame
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Top-level frame opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Upsert = 0x01,
    Insert = 0x02,
    Increment = 0x05,
    Decrement = 0x06,
    GetMeta = 0xa0,
    SubdocMultiLookup = 0xd0,
    SubdocMultiMutation = 0xd1,
}

impl Opcode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Opcode::Get),
            0x01 => Some(Opcode::Upsert),
            0x02 => Some(Opcode::Insert),
            0x05 => Some(Opcode::Increment),
            0x06 => Some(Opcode::Decrement),
            0xa0 => Some(Opcode::GetMeta),
            0xd0 => Some(Opcode::SubdocMultiLookup),
            0xd1 => Some(Opcode::SubdocMultiMutation),
            _ => None,
        }
    }
}

/// Opcodes of individual specs inside a multi-path subdocument body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SubdocOpcode {
    Get = 0xc5,
    Exists = 0xc6,
    DictUpsert = 0xc8,
    Delete = 0xcd,
    GetCount = 0xd2,
}

impl SubdocOpcode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0xc5 => Some(SubdocOpcode::Get),
            0xc6 => Some(SubdocOpcode::Exists),
            0xc8 => Some(SubdocOpcode::DictUpsert),
            0xcd => Some(SubdocOpcode::Delete),
            0xd2 => Some(SubdocOpcode::GetCount),
            _ => None,
        }
    }
}

/// Data type bits (byte 5 of the header)
pub mod datatype {
    pub const RAW: u8 = 0x00;
    pub const JSON: u8 = 0x01;
    pub const SNAPPY: u8 = 0x02;
}

/// Path flags of a subdocument spec
pub mod path_flags {
    pub const NONE: u8 = 0x00;
    pub const CREATE_PARENTS: u8 = 0x01;
}
