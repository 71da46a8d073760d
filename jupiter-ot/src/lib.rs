//! # jupiter-ot — Jupiter operational transformation core
//!
//! Keeps replicas of one plain-text document convergent while several
//! sites edit it concurrently through a central server.
//!
//! ## Architecture
//!
//! ```text
//!   editor edit                                  remote Request
//!       │                                              │
//!       ▼                                              ▼
//! ┌─────────────┐  generate_request   ┌──────────────────────────┐
//! │ Operation   │ ──────────────────► │ Algorithm (one per pair) │
//! │ (closed set)│ ◄────────────────── │ vector time + pending    │
//! └──────┬──────┘   receive_request   └──────────────────────────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ TextDocument│  (rope replica, char positions)
//! └─────────────┘
//! ```
//!
//! Every client talks to the server only. The client's `Algorithm` and the
//! server's proxy `Algorithm` for that client form a two-party Jupiter pair;
//! the server sequences all edits, so pairwise convergence is enough for
//! every replica to end up with the same text.
//!
//! ## Modules
//!
//! - [`operation`] — Insert / Delete / Split / NoOp and their transforms
//! - [`vector_time`] — per-site logical clocks
//! - [`request`] — an operation stamped with its sender's vector time
//! - [`algorithm`] — the per-pair transformation state machine
//! - [`document`] — the text replica operations are applied to
//!
//! ```rust
//! use jupiter_ot::{Algorithm, Operation, Side, SiteId, TextDocument};
//!
//! let server = SiteId::server();
//! let alice = SiteId::new();
//!
//! let mut client = Algorithm::new(alice, server, Side::Client);
//! let mut proxy = Algorithm::new(server, alice, Side::Server);
//! let mut replica = TextDocument::new("abcd");
//!
//! let op = Operation::insert(0, "z");
//! replica.apply(&op).unwrap();
//! let request = client.generate_request(op);
//!
//! let integrated = proxy.receive_request(&request).unwrap();
//! assert_eq!(integrated, Operation::insert(0, "z"));
//! assert_eq!(replica.text(), "zabcd");
//! ```

pub mod algorithm;
pub mod document;
pub mod error;
pub mod operation;
pub mod request;
pub mod vector_time;

pub use algorithm::{Algorithm, Side};
pub use document::TextDocument;
pub use error::TransformationError;
pub use operation::{Operation, Priority};
pub use request::Request;
pub use vector_time::VectorTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a participant (client or server) in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SiteId(Uuid);

#[allow(clippy::new_without_default)]
impl SiteId {
    /// Random identifier for a new client site.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The server's own site identity (nil UUID), shared by every document.
    pub const fn server() -> Self {
        Self(Uuid::nil())
    }

    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Deterministic identifier, handy for fixtures and simulations.
    pub const fn from_u128(id: u128) -> Self {
        Self(Uuid::from_u128(id))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_server(&self) -> bool {
        self.0.is_nil()
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_server() {
            write!(f, "server")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Document identifier type.
pub type DocumentId = Uuid;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_site_is_nil() {
        assert!(SiteId::server().is_server());
        assert_eq!(SiteId::server().as_uuid(), Uuid::nil());
        assert_eq!(SiteId::server().to_string(), "server");
    }

    #[test]
    fn test_client_sites_are_distinct() {
        let a = SiteId::new();
        let b = SiteId::new();
        assert_ne!(a, b);
        assert!(!a.is_server());
    }

    #[test]
    fn test_fixed_site_ids_order() {
        assert!(SiteId::from_u128(1) < SiteId::from_u128(2));
        assert_eq!(SiteId::from_u128(7), SiteId::from_uuid(Uuid::from_u128(7)));
    }
}
