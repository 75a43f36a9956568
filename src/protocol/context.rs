//! Channel capabilities and key routing
//!
//! What a connection negotiated, how keys are qualified with a collection
//! id, and which partition a key hashes to.

use bytes::{BufMut, Bytes, BytesMut};

/// Capabilities negotiated by one channel
///
/// Passed into every encode/decode call; two channels of the same client
/// may disagree, so nothing here is cached across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelContext {
    /// Keys are prefixed with a LEB128 collection id
    pub collections_enabled: bool,

    /// Mutation responses carry a partition uuid and sequence number
    pub mutation_tokens_enabled: bool,

    /// Bucket the channel is bound to
    pub bucket: String,
}

impl ChannelContext {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            collections_enabled: false,
            mutation_tokens_enabled: false,
            bucket: bucket.into(),
        }
    }

    pub fn with_collections(mut self, enabled: bool) -> Self {
        self.collections_enabled = enabled;
        self
    }

    pub fn with_mutation_tokens(mut self, enabled: bool) -> Self {
        self.mutation_tokens_enabled = enabled;
        self
    }
}

/// Numeric collection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CollectionId(pub u32);

impl CollectionId {
    /// The `_default._default` collection
    pub const DEFAULT: CollectionId = CollectionId(0);

    /// Unsigned LEB128 encoding of the id
    pub fn leb128(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5);
        let mut value = self.0;
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }
}

/// Key bytes as they go on the wire for this channel
pub fn encode_key(key: &str, collection: CollectionId, ctx: &ChannelContext) -> Bytes {
    if !ctx.collections_enabled {
        return Bytes::copy_from_slice(key.as_bytes());
    }
    let prefix = collection.leb128();
    let mut buf = BytesMut::with_capacity(prefix.len() + key.len());
    buf.put_slice(&prefix);
    buf.put_slice(key.as_bytes());
    buf.freeze()
}

/// Partition (vbucket) owning `key`
pub fn partition_for_key(key: &[u8], num_partitions: u16) -> u16 {
    if num_partitions == 0 {
        return 0;
    }
    let crc = crc32fast::hash(key);
    let hashed = (crc >> 16) & 0x7fff;
    (hashed % num_partitions as u32) as u16
}
