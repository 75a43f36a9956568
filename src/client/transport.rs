//! Transport boundary
//!
//! The core hands encoded frames to a transport and is handed raw response
//! frames back through [`KvClient::handle_response`](super::KvClient::handle_response).
//! Sockets, reconnection and TLS live on the other side of this trait.

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{KvError, Result};

/// Outbound half of a connection
pub trait Transport: Send + Sync {
    /// Queue one complete request frame for writing
    fn send(&self, frame: Bytes) -> Result<()>;
}

/// Transport that queues frames on a crossbeam channel for a writer thread
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: Sender<Bytes>,
}

impl ChannelTransport {
    pub fn new(sender: Sender<Bytes>) -> Self {
        Self { sender }
    }

    /// Transport plus the receiving end a writer drains
    pub fn unbounded() -> (Self, Receiver<Bytes>) {
        let (sender, receiver) = channel::unbounded();
        (Self::new(sender), receiver)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: Bytes) -> Result<()> {
        self.sender
            .send(frame)
            .map_err(|_| KvError::Transport("outbound channel closed".to_string()))
    }
}
