//! Bounded request channels between the algorithm layer and the transport.
//!
//! One channel per direction and site, and per-site FIFO order is exactly
//! the channel order. On the client side a slow consumer makes
//! `forward_outgoing_request` wait. The server fan-out only uses
//! `try_forward_outgoing_request` and evicts a site whose channel is full.
//!
//! ```text
//! JupiterClient ──RequestForwarder──► transport ──► SessionManager::submit
//!                                                        │
//! JupiterClient ◄──RequestReceiver◄── transport ◄── fan-out per site
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use jupiter_ot::Request;

use crate::protocol::ProtocolError;

/// Statistics for monitoring one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    pub forwarded: u64,
    pub dropped: u64,
}

/// Counters shared by every clone of a forwarder; no lock on the hot path.
#[derive(Default)]
struct AtomicForwarderStats {
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

/// Sending half. Cheap to clone; all clones feed the same receiver.
#[derive(Clone)]
pub struct RequestForwarder {
    sender: mpsc::Sender<Request>,
    stats: Arc<AtomicForwarderStats>,
    capacity: usize,
}

/// Receiving half, owned by whoever drains the channel.
pub struct RequestReceiver {
    receiver: mpsc::Receiver<Request>,
}

/// A reserved slot; sending through it cannot fail.
pub struct ForwardPermit<'a> {
    permit: mpsc::Permit<'a, Request>,
    stats: &'a AtomicForwarderStats,
}

/// Create a bounded channel holding up to `capacity` requests in flight.
pub fn request_channel(capacity: usize) -> (RequestForwarder, RequestReceiver) {
    let capacity = capacity.max(1);
    let (sender, receiver) = mpsc::channel(capacity);
    (
        RequestForwarder {
            sender,
            stats: Arc::new(AtomicForwarderStats::default()),
            capacity,
        },
        RequestReceiver { receiver },
    )
}

impl RequestForwarder {
    /// Queue `request` for transmission, waiting while the channel is full.
    pub async fn forward_outgoing_request(&self, request: Request) -> Result<(), ProtocolError> {
        match self.sender.send(request).await {
            Ok(()) => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }

    /// Queue `request` without waiting.
    pub fn try_forward_outgoing_request(&self, request: Request) -> Result<(), ProtocolError> {
        match self.sender.try_send(request) {
            Ok(()) => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(ProtocolError::ChannelFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }

    /// Wait for a free slot. Lets callers secure capacity before they mutate
    /// algorithm state for the request they are about to send.
    pub async fn reserve(&self) -> Result<ForwardPermit<'_>, ProtocolError> {
        let permit = self
            .sender
            .reserve()
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)?;
        Ok(ForwardPermit {
            permit,
            stats: &self.stats,
        })
    }

    pub fn try_reserve(&self) -> Result<ForwardPermit<'_>, ProtocolError> {
        let permit = self.sender.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => ProtocolError::ChannelFull,
            mpsc::error::TrySendError::Closed(()) => ProtocolError::ConnectionClosed,
        })?;
        Ok(ForwardPermit {
            permit,
            stats: &self.stats,
        })
    }

    /// Whether the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> ForwarderStats {
        ForwarderStats {
            forwarded: self.stats.forwarded.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

impl ForwardPermit<'_> {
    pub fn send(self, request: Request) {
        self.permit.send(request);
        self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
    }
}

impl RequestReceiver {
    /// Next request in send order; `None` once every forwarder is gone.
    pub async fn get_next_outgoing_request(&mut self) -> Option<Request> {
        self.receiver.recv().await
    }

    /// Next request if one is already queued.
    pub fn try_next_outgoing_request(&mut self) -> Option<Request> {
        self.receiver.try_recv().ok()
    }

    /// Number of requests waiting in the channel.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
