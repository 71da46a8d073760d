//! The contract the editor layer programs against, and the server-side
//! proxy that implements it for one connected client.

use jupiter_ot::{Algorithm, Operation, Request, Side, SiteId, VectorTime};

use crate::error::SessionError;

/// One end of a synchronized client/server pair.
///
/// Both calls are synchronous state transitions; the only waiting happens
/// at the channel boundary, outside this trait.
pub trait SynchronizedQueue {
    /// Site this queue synchronizes with the other end for.
    fn site_id(&self) -> SiteId;

    /// Stamp a locally applied operation for the other end.
    fn send_operation(&mut self, op: Operation) -> Result<Request, SessionError>;

    /// Integrate a request from the other end and return what to apply locally.
    fn receive_operation(&mut self, request: &Request) -> Result<Operation, SessionError>;

    fn algorithm(&self) -> &Algorithm;
}

/// The server's algorithm for one client's stream.
#[derive(Debug, Clone)]
pub struct ProxyQueue {
    client: SiteId,
    algorithm: Algorithm,
}

impl ProxyQueue {
    /// Seed the proxy with the central vector time taken at join.
    pub fn new(client: SiteId, vector_time: VectorTime) -> Self {
        Self {
            client,
            algorithm: Algorithm::with_vector_time(SiteId::server(), client, Side::Server, vector_time),
        }
    }

    /// Whether `request` was already integrated through this proxy.
    pub fn is_reflected(&self, request: &Request) -> bool {
        self.algorithm.is_reflected(request)
    }

    /// Server operations not yet acknowledged by the client.
    pub fn pending_len(&self) -> usize {
        self.algorithm.pending_len()
    }
}

impl SynchronizedQueue for ProxyQueue {
    fn site_id(&self) -> SiteId {
        self.client
    }

    fn send_operation(&mut self, op: Operation) -> Result<Request, SessionError> {
        Ok(self.algorithm.generate_request(op))
    }

    fn receive_operation(&mut self, request: &Request) -> Result<Operation, SessionError> {
        Ok(self.algorithm.receive_request(request)?)
    }

    fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }
}
