//! Protocol Module
//!
//! The binary key-value wire protocol: typed operations in, request frames
//! out; response frames in, typed results out. No I/O and no state.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────────────────┬────────┬─────┬───────┐
//! │      Header (24)         │ Extras │ Key │ Value │
//! └──────────────────────────┴────────┴─────┴───────┘
//! ```
//! The header declares each section's length; body length always equals
//! extras + key + value.
//!
//! ### Operations
//! - 0x00: GET
//! - 0x01: UPSERT (SET)
//! - 0x02: INSERT (ADD)
//! - 0x05: INCREMENT
//! - 0x06: DECREMENT
//! - 0xa0: GET_META
//! - 0xd0: LOOKUP_IN  (multi-path subdocument lookup)
//! - 0xd1: MUTATE_IN  (multi-path subdocument mutation)
//!
//! ### Channel Capabilities
//! Keys are collection-qualified and mutation tokens are decoded only when
//! the [`ChannelContext`] handed to the call says the channel negotiated
//! them.

mod codec;
mod context;
mod frame;
mod opcode;
mod operation;
mod response;
mod status;

pub use codec::{counter_extras, decode, encode};
pub use context::{encode_key, partition_for_key, ChannelContext, CollectionId};
pub use frame::{complete_frame_len, Frame, FrameHeader, Sections, HEADER_SIZE, MAX_BODY_SIZE};
pub use opcode::{datatype, path_flags, Opcode, SubdocOpcode, REQUEST_MAGIC, RESPONSE_MAGIC};
pub use operation::{
    Cas, Counter, DocKey, KvOperation, LookupKind, LookupSpec, MutationKind, MutationSpec,
    COUNTER_NOT_EXISTS_EXPIRY, JSON_COMMON_FLAGS, MAX_KEY_LEN, MAX_PATH_LEN, MAX_SPECS,
    MAX_VALUE_LEN, NO_CAS,
};
pub use response::{KvResponse, MutationToken, ResponseBody, SubdocField, SubdocMutationResult};
pub use status::ResponseStatus;

/// Low-level frame writers, for servers and test doubles
pub mod frames {
    pub use super::frame::{request, response};
}
