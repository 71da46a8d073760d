//! The Jupiter state machine: one instance per (document, site pair).
//!
//! A client holds one `Algorithm` paired with the server; the server holds
//! the mirror image (a proxy) for every client. Both sides keep the requests
//! they generated until the other side's timestamps show them integrated, and
//! transform every incoming request through that pending list in FIFO order.
//!
//! ```text
//!      client (Side::Client)               server proxy (Side::Server)
//!  ┌───────────────────────────┐       ┌───────────────────────────┐
//!  │ vt {client: n, server: m} │ ────► │ vt {server: m', client: n'}│
//!  │ pending [c_k .. c_n)      │ ◄──── │ pending [s_j .. s_m')     │
//!  └───────────────────────────┘       └───────────────────────────┘
//! ```

use std::collections::VecDeque;

use crate::error::TransformationError;
use crate::operation::{Operation, Priority};
use crate::request::Request;
use crate::vector_time::VectorTime;
use crate::SiteId;

/// Which end of a client/server pair an algorithm sits on. Decides who wins
/// insert ties so both ends agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    /// Priorities for (pending local op, incoming remote op). Client
    /// operations always go first on a tie.
    fn priorities(self) -> (Priority, Priority) {
        match self {
            Side::Client => (Priority::High, Priority::Low),
            Side::Server => (Priority::Low, Priority::High),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingOperation {
    operation: Operation,
    /// Own component of the vector time the request was generated at.
    sequence: u64,
}

#[derive(Debug, Clone)]
pub struct Algorithm {
    site_id: SiteId,
    peer_id: SiteId,
    side: Side,
    vector_time: VectorTime,
    /// Local requests the peer has not acknowledged yet, oldest first.
    pending: VecDeque<PendingOperation>,
    /// Highest own-component acknowledgement seen so far.
    acknowledged: u64,
}

impl Algorithm {
    pub fn new(site_id: SiteId, peer_id: SiteId, side: Side) -> Self {
        Self::with_vector_time(site_id, peer_id, side, VectorTime::new())
    }

    /// Start from an existing clock, e.g. the snapshot handed out on late join.
    pub fn with_vector_time(
        site_id: SiteId,
        peer_id: SiteId,
        side: Side,
        mut vector_time: VectorTime,
    ) -> Self {
        vector_time.track(site_id);
        vector_time.track(peer_id);
        let acknowledged = vector_time.get(&site_id);
        Self {
            site_id,
            peer_id,
            side,
            vector_time,
            pending: VecDeque::new(),
            acknowledged,
        }
    }

    /// Stamp a local operation for transmission.
    ///
    /// The caller must already have applied `op` to its replica. Several
    /// requests may be outstanding at once.
    pub fn generate_request(&mut self, op: Operation) -> Request {
        let timestamp = self.vector_time.clone();
        let sequence = timestamp.get(&self.site_id);
        self.pending.push_back(PendingOperation {
            operation: op.clone(),
            sequence,
        });
        self.vector_time.increment(self.site_id);
        Request::new(op, timestamp, self.site_id)
    }

    /// Whether `request` was already integrated (a duplicate delivery).
    pub fn is_reflected(&self, request: &Request) -> bool {
        request.site_id() == self.peer_id
            && request.timestamp().get(&self.peer_id) < self.vector_time.get(&self.peer_id)
    }

    /// Integrate a request from the peer and return the operation to apply
    /// to the local replica. Duplicates yield `NoOp` and change nothing.
    pub fn receive_request(&mut self, request: &Request) -> Result<Operation, TransformationError> {
        if request.site_id() != self.peer_id {
            return Err(TransformationError::WrongPeer {
                expected: self.peer_id,
                found: request.site_id(),
            });
        }

        let timestamp = request.timestamp();
        let received = timestamp.get(&self.peer_id);
        let expected = self.vector_time.get(&self.peer_id);
        if received < expected {
            log::debug!(
                "{}: dropping duplicate request #{received} from {}",
                self.site_id,
                self.peer_id
            );
            return Ok(Operation::NoOp);
        }
        if received > expected {
            return Err(TransformationError::OutOfOrder {
                site: self.peer_id,
                expected,
                received,
            });
        }

        self.discard_acknowledged(timestamp.get(&self.site_id))?;

        let (existing_priority, incoming_priority) = self.side.priorities();
        let mut incoming = request.operation().clone();
        let mut rewritten = Vec::with_capacity(self.pending.len());
        for pending in &self.pending {
            let existing = pending.operation.transform(&incoming, existing_priority)?;
            incoming = incoming.transform(&pending.operation, incoming_priority)?;
            rewritten.push(existing);
        }
        // Commit only once every transform succeeded.
        for (pending, operation) in self.pending.iter_mut().zip(rewritten) {
            pending.operation = operation;
        }

        self.vector_time.increment(self.peer_id);
        log::trace!(
            "{}: integrated request #{received} from {} as {incoming}",
            self.site_id,
            self.peer_id
        );
        Ok(incoming)
    }

    /// Drop local requests the peer has integrated (`sequence < acknowledged`).
    fn discard_acknowledged(&mut self, acknowledged: u64) -> Result<(), TransformationError> {
        let generated = self.vector_time.get(&self.site_id);
        if acknowledged > generated {
            return Err(TransformationError::AcknowledgedUnknown {
                acknowledged,
                generated,
            });
        }
        if acknowledged < self.acknowledged {
            return Err(TransformationError::StaleAcknowledgement {
                previous: self.acknowledged,
                acknowledged,
            });
        }
        while self
            .pending
            .front()
            .is_some_and(|pending| pending.sequence < acknowledged)
        {
            self.pending.pop_front();
        }
        self.acknowledged = acknowledged;
        Ok(())
    }

    /// Align the clock with a running session before the first request
    /// flows. Only allowed while nothing is pending.
    pub fn update_vector_time(&mut self, timestamp: &VectorTime) -> Result<(), TransformationError> {
        if !self.pending.is_empty() {
            return Err(TransformationError::PendingRequests(self.pending.len()));
        }
        let mut vector_time = timestamp.clone();
        vector_time.track(self.site_id);
        vector_time.track(self.peer_id);
        self.acknowledged = vector_time.get(&self.site_id);
        self.vector_time = vector_time;
        log::debug!("{}: vector time set to {}", self.site_id, self.vector_time);
        Ok(())
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    pub fn peer_id(&self) -> SiteId {
        self.peer_id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn vector_time(&self) -> &VectorTime {
        &self.vector_time
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pending local operations in FIFO order, as transformed so far.
    pub fn pending_operations(&self) -> impl Iterator<Item = &Operation> {
        self.pending.iter().map(|p| &p.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextDocument;

    fn pair() -> (Algorithm, Algorithm) {
        let client = SiteId::from_u128(1);
        let server = SiteId::server();
        (
            Algorithm::new(client, server, Side::Client),
            Algorithm::new(server, client, Side::Server),
        )
    }

    #[test]
    fn test_generate_increments_own_component() {
        let (mut client, _) = pair();
        let first = client.generate_request(Operation::insert(0, "a"));
        let second = client.generate_request(Operation::insert(1, "b"));
        assert_eq!(first.sequence().1, 0);
        assert_eq!(second.sequence().1, 1);
        assert_eq!(client.vector_time().get(&client.site_id()), 2);
        assert_eq!(client.pending_len(), 2);
    }

    #[test]
    fn test_sequential_request_needs_no_transform() {
        let (mut client, mut proxy) = pair();
        let req = client.generate_request(Operation::insert(2, "x"));
        let op = proxy.receive_request(&req).unwrap();
        assert_eq!(op, Operation::insert(2, "x"));
        assert_eq!(proxy.vector_time().get(&client.site_id()), 1);
    }

    #[test]
    fn test_concurrent_inserts_converge_client_first() {
        let (mut client, mut proxy) = pair();
        let mut client_doc = TextDocument::new("abcd");
        let mut server_doc = TextDocument::new("abcd");

        let c_op = Operation::insert(0, "c");
        client_doc.apply(&c_op).unwrap();
        let c_req = client.generate_request(c_op);

        let s_op = Operation::insert(0, "s");
        server_doc.apply(&s_op).unwrap();
        let s_req = proxy.generate_request(s_op);

        let at_server = proxy.receive_request(&c_req).unwrap();
        server_doc.apply(&at_server).unwrap();
        let at_client = client.receive_request(&s_req).unwrap();
        client_doc.apply(&at_client).unwrap();

        assert_eq!(client_doc.text(), "csabcd");
        assert_eq!(server_doc.text(), "csabcd");
    }

    #[test]
    fn test_acknowledgement_discards_pending() {
        let (mut client, mut proxy) = pair();
        let req = client.generate_request(Operation::insert(0, "a"));
        proxy.receive_request(&req).unwrap();

        // The proxy's next request carries the acknowledgement.
        let reply = proxy.generate_request(Operation::insert(0, "b"));
        assert_eq!(reply.timestamp().get(&client.site_id()), 1);

        let op = client.receive_request(&reply).unwrap();
        assert_eq!(op, Operation::insert(0, "b"));
        assert_eq!(client.pending_len(), 0);
    }

    #[test]
    fn test_pipelined_requests_transform_in_order() {
        let (mut client, mut proxy) = pair();
        let mut client_doc = TextDocument::new("xyz");
        let mut server_doc = TextDocument::new("xyz");

        let mut requests = Vec::new();
        for op in [Operation::insert(3, "1"), Operation::insert(4, "2"), Operation::delete(0, "x")] {
            client_doc.apply(&op).unwrap();
            requests.push(client.generate_request(op));
        }

        let s_op = Operation::insert(1, "S");
        server_doc.apply(&s_op).unwrap();
        let s_req = proxy.generate_request(s_op);

        for req in &requests {
            let op = proxy.receive_request(req).unwrap();
            server_doc.apply(&op).unwrap();
        }
        let op = client.receive_request(&s_req).unwrap();
        client_doc.apply(&op).unwrap();

        assert_eq!(client_doc.text(), "Syz12");
        assert_eq!(server_doc.text(), client_doc.text());
    }

    #[test]
    fn test_duplicate_delivery_yields_noop() {
        let (mut client, mut proxy) = pair();
        let req = client.generate_request(Operation::insert(0, "a"));
        proxy.receive_request(&req).unwrap();
        assert!(proxy.is_reflected(&req));
        assert_eq!(proxy.receive_request(&req).unwrap(), Operation::NoOp);
        assert_eq!(proxy.vector_time().get(&client.site_id()), 1);
    }

    #[test]
    fn test_gap_is_rejected() {
        let (mut client, mut proxy) = pair();
        let _lost = client.generate_request(Operation::insert(0, "a"));
        let second = client.generate_request(Operation::insert(1, "b"));
        assert_eq!(
            proxy.receive_request(&second).unwrap_err(),
            TransformationError::OutOfOrder {
                site: client.site_id(),
                expected: 0,
                received: 1,
            }
        );
    }

    #[test]
    fn test_wrong_peer_is_rejected() {
        let (_, mut proxy) = pair();
        let mut stranger = Algorithm::new(SiteId::from_u128(99), SiteId::server(), Side::Client);
        let req = stranger.generate_request(Operation::insert(0, "a"));
        assert!(matches!(
            proxy.receive_request(&req),
            Err(TransformationError::WrongPeer { .. })
        ));
        assert!(!proxy.is_reflected(&req));
    }

    #[test]
    fn test_acknowledging_unknown_operations_fails() {
        let (client, mut proxy) = pair();
        let forged: VectorTime = [(client.site_id(), 0), (SiteId::server(), 5)].into_iter().collect();
        let req = Request::new(Operation::insert(0, "a"), forged, client.site_id());
        assert_eq!(
            proxy.receive_request(&req).unwrap_err(),
            TransformationError::AcknowledgedUnknown {
                acknowledged: 5,
                generated: 0,
            }
        );
    }

    #[test]
    fn test_update_vector_time_requires_empty_queue() {
        let (mut client, _) = pair();
        let snapshot: VectorTime = [(SiteId::server(), 7)].into_iter().collect();
        client.update_vector_time(&snapshot).unwrap();
        assert_eq!(client.vector_time().get(&SiteId::server()), 7);
        assert!(client.vector_time().contains(&client.site_id()));

        client.generate_request(Operation::insert(0, "a"));
        assert_eq!(
            client.update_vector_time(&snapshot).unwrap_err(),
            TransformationError::PendingRequests(1)
        );
    }

    #[test]
    fn test_seeded_pair_exchanges_requests() {
        let client_id = SiteId::from_u128(5);
        let snapshot: VectorTime = [(SiteId::server(), 12), (SiteId::from_u128(6), 3)]
            .into_iter()
            .collect();
        let mut proxy =
            Algorithm::with_vector_time(SiteId::server(), client_id, Side::Server, snapshot.clone());
        let mut client = Algorithm::new(client_id, SiteId::server(), Side::Client);
        client.update_vector_time(&snapshot).unwrap();

        let down = proxy.generate_request(Operation::insert(0, "s"));
        let up = client.generate_request(Operation::insert(0, "c"));
        assert_eq!(proxy.receive_request(&up).unwrap(), Operation::insert(0, "c"));
        assert_eq!(client.receive_request(&down).unwrap(), Operation::insert_with_origin(1, "s", 0));
        assert_eq!(proxy.pending_len(), 1);
    }
}
