//! Response status codes
//!
//! The 2-byte status a server writes into the partition slot of a
//! response header, and inside each per-spec subdocument result.

/// Server response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    Success,
    NotFound,
    Exists,
    TooBig,
    InvalidArgs,
    NotStored,
    DeltaBadValue,
    NotMyVbucket,
    Locked,
    AuthError,
    UnknownCommand,
    OutOfMemory,
    Busy,
    TemporaryFailure,
    SubdocPathNotFound,
    SubdocPathMismatch,
    SubdocPathInvalid,
    SubdocPathTooBig,
    SubdocDocTooDeep,
    SubdocValueCantInsert,
    SubdocDocNotJson,
    SubdocNumRange,
    SubdocDeltaInvalid,
    SubdocPathExists,
    SubdocValueTooDeep,
    SubdocInvalidCombo,
    SubdocMultiPathFailure,
    SubdocSuccessDeleted,
    SubdocMultiPathFailureDeleted,
    Unknown(u16),
}

impl ResponseStatus {
    pub fn from_u16(code: u16) -> Self {
        match code {
            0x0000 => ResponseStatus::Success,
            0x0001 => ResponseStatus::NotFound,
            0x0002 => ResponseStatus::Exists,
            0x0003 => ResponseStatus::TooBig,
            0x0004 => ResponseStatus::InvalidArgs,
            0x0005 => ResponseStatus::NotStored,
            0x0006 => ResponseStatus::DeltaBadValue,
            0x0007 => ResponseStatus::NotMyVbucket,
            0x0009 => ResponseStatus::Locked,
            0x0020 => ResponseStatus::AuthError,
            0x0081 => ResponseStatus::UnknownCommand,
            0x0082 => ResponseStatus::OutOfMemory,
            0x0085 => ResponseStatus::Busy,
            0x0086 => ResponseStatus::TemporaryFailure,
            0x00c0 => ResponseStatus::SubdocPathNotFound,
            0x00c1 => ResponseStatus::SubdocPathMismatch,
            0x00c2 => ResponseStatus::SubdocPathInvalid,
            0x00c3 => ResponseStatus::SubdocPathTooBig,
            0x00c4 => ResponseStatus::SubdocDocTooDeep,
            0x00c5 => ResponseStatus::SubdocValueCantInsert,
            0x00c6 => ResponseStatus::SubdocDocNotJson,
            0x00c7 => ResponseStatus::SubdocNumRange,
            0x00c8 => ResponseStatus::SubdocDeltaInvalid,
            0x00c9 => ResponseStatus::SubdocPathExists,
            0x00ca => ResponseStatus::SubdocValueTooDeep,
            0x00cb => ResponseStatus::SubdocInvalidCombo,
            0x00cc => ResponseStatus::SubdocMultiPathFailure,
            0x00cd => ResponseStatus::SubdocSuccessDeleted,
            0x00d3 => ResponseStatus::SubdocMultiPathFailureDeleted,
            other => ResponseStatus::Unknown(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            ResponseStatus::Success => 0x0000,
            ResponseStatus::NotFound => 0x0001,
            ResponseStatus::Exists => 0x0002,
            ResponseStatus::TooBig => 0x0003,
            ResponseStatus::InvalidArgs => 0x0004,
            ResponseStatus::NotStored => 0x0005,
            ResponseStatus::DeltaBadValue => 0x0006,
            ResponseStatus::NotMyVbucket => 0x0007,
            ResponseStatus::Locked => 0x0009,
            ResponseStatus::AuthError => 0x0020,
            ResponseStatus::UnknownCommand => 0x0081,
            ResponseStatus::OutOfMemory => 0x0082,
            ResponseStatus::Busy => 0x0085,
            ResponseStatus::TemporaryFailure => 0x0086,
            ResponseStatus::SubdocPathNotFound => 0x00c0,
            ResponseStatus::SubdocPathMismatch => 0x00c1,
            ResponseStatus::SubdocPathInvalid => 0x00c2,
            ResponseStatus::SubdocPathTooBig => 0x00c3,
            ResponseStatus::SubdocDocTooDeep => 0x00c4,
            ResponseStatus::SubdocValueCantInsert => 0x00c5,
            ResponseStatus::SubdocDocNotJson => 0x00c6,
            ResponseStatus::SubdocNumRange => 0x00c7,
            ResponseStatus::SubdocDeltaInvalid => 0x00c8,
            ResponseStatus::SubdocPathExists => 0x00c9,
            ResponseStatus::SubdocValueTooDeep => 0x00ca,
            ResponseStatus::SubdocInvalidCombo => 0x00cb,
            ResponseStatus::SubdocMultiPathFailure => 0x00cc,
            ResponseStatus::SubdocSuccessDeleted => 0x00cd,
            ResponseStatus::SubdocMultiPathFailureDeleted => 0x00d3,
            ResponseStatus::Unknown(code) => code,
        }
    }

    /// Plain success, or success on a tombstoned document
    pub fn is_success(self) -> bool {
        matches!(
            self,
            ResponseStatus::Success | ResponseStatus::SubdocSuccessDeleted
        )
    }

    /// Multi-path response where at least one spec failed; the body still
    /// carries per-spec results.
    pub fn is_multi_path_failure(self) -> bool {
        matches!(
            self,
            ResponseStatus::SubdocMultiPathFailure | ResponseStatus::SubdocMultiPathFailureDeleted
        )
    }

    /// Statuses a server returns for transient conditions
    pub fn is_temporary(self) -> bool {
        matches!(
            self,
            ResponseStatus::TemporaryFailure | ResponseStatus::Busy | ResponseStatus::NotMyVbucket
        )
    }
}
