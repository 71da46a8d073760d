//! Editor-side end of a Jupiter pair.
//!
//! Local edits are applied to the replica right away and stamped for the
//! server; requests from the server are transformed against whatever local
//! edits it has not seen yet and then applied.
//!
//! A client is driven by one task at a time (`&mut self` everywhere), which
//! serializes local edits and remote deliveries.

use jupiter_ot::{Algorithm, Operation, Request, Side, SiteId, TextDocument, VectorTime};

use crate::error::SessionError;
use crate::forwarder::{RequestForwarder, RequestReceiver};
use crate::protocol::JoinSnapshot;
use crate::queue::SynchronizedQueue;

pub struct JupiterClient {
    site_id: SiteId,
    algorithm: Algorithm,
    document: TextDocument,
    forwarder: RequestForwarder,
}

impl JupiterClient {
    /// A client whose replica starts at `text` with a fresh clock.
    pub fn new(site_id: SiteId, text: &str, forwarder: RequestForwarder) -> Self {
        Self {
            site_id,
            algorithm: Algorithm::new(site_id, SiteId::server(), Side::Client),
            document: TextDocument::new(text),
            forwarder,
        }
    }

    /// A client joining a running session from the server's snapshot.
    pub fn from_snapshot(
        site_id: SiteId,
        snapshot: &JoinSnapshot,
        forwarder: RequestForwarder,
    ) -> Result<Self, SessionError> {
        let mut client = Self::new(site_id, &snapshot.text, forwarder);
        client.update_vector_time(&snapshot.vector_time)?;
        Ok(client)
    }

    /// Apply a local edit and queue it for the server, waiting for channel
    /// capacity first. If the edit does not fit the replica nothing is sent.
    pub async fn send(&mut self, op: Operation) -> Result<Request, SessionError> {
        let permit = self.forwarder.reserve().await?;
        self.document.apply(&op)?;
        let request = self.algorithm.generate_request(op);
        permit.send(request.clone());
        Ok(request)
    }

    /// Align the clock with a running session. Only valid before the first
    /// local edit.
    pub fn update_vector_time(&mut self, timestamp: &VectorTime) -> Result<(), SessionError> {
        Ok(self.algorithm.update_vector_time(timestamp)?)
    }

    /// Integrate every request already waiting on `incoming`.
    pub fn receive_queued(&mut self, incoming: &mut RequestReceiver) -> Result<usize, SessionError> {
        let mut received = 0;
        while let Some(request) = incoming.try_next_outgoing_request() {
            self.receive_operation(&request)?;
            received += 1;
        }
        Ok(received)
    }

    pub fn text(&self) -> String {
        self.document.text()
    }

    pub fn document(&self) -> &TextDocument {
        &self.document
    }

    /// Local edits the server has not acknowledged yet.
    pub fn pending_len(&self) -> usize {
        self.algorithm.pending_len()
    }
}

impl SynchronizedQueue for JupiterClient {
    fn site_id(&self) -> SiteId {
        self.site_id
    }

    /// Like `send`, but fails with a full channel instead of waiting.
    fn send_operation(&mut self, op: Operation) -> Result<Request, SessionError> {
        let permit = self.forwarder.try_reserve()?;
        self.document.apply(&op)?;
        let request = self.algorithm.generate_request(op);
        permit.send(request.clone());
        Ok(request)
    }

    fn receive_operation(&mut self, request: &Request) -> Result<Operation, SessionError> {
        let op = self.algorithm.receive_request(request)?;
        self.document.apply(&op)?;
        Ok(op)
    }

    fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }
}
