//! # jupiter-collab — sessions, transport channels and wire format for Jupiter
//!
//! Runs the client/server halves of the Jupiter protocol on top of
//! [`jupiter_ot`]: one central server per document, one proxy per connected
//! client, bounded request channels in between.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  RequestForwarder   ┌──────────────────────┐
//! │ JupiterClient │ ──────────────────► │ SessionManager       │
//! │ (per site)    │                     │  └─ doc_id ─► Mutex< │
//! └──────┬────────┘  RequestReceiver    │   JupiterDocument-   │
//!        │         ◄──────────────────  │   Server >           │
//!        ▼                              └──────────┬───────────┘
//! ┌───────────────┐                                │
//! │ TextDocument  │                     ┌──────────┴───────────┐
//! │ (replica)     │                     │ CentralState +       │
//! └───────────────┘                     │ ProxyQueue per site  │
//!                                       └──────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded WireMessage)
//! - [`forwarder`] — Bounded per-site request channels
//! - [`queue`] — The `SynchronizedQueue` contract and the server-side `ProxyQueue`
//! - [`server`] — Central state and fan-out for one document
//! - [`session`] — Arena of open documents with join/leave lifecycle
//! - [`client`] — Editor-side client bound to a local replica
//!
//! The transport that moves encoded messages between machines is not part
//! of this crate; it only needs to keep each site's messages in order.

pub mod client;
pub mod error;
pub mod forwarder;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod session;

// Re-exports for convenience
pub use client::JupiterClient;
pub use error::SessionError;
pub use forwarder::{request_channel, ForwardPermit, ForwarderStats, RequestForwarder, RequestReceiver};
pub use protocol::{JoinSnapshot, MessageType, ProtocolError, WireMessage};
pub use queue::{ProxyQueue, SynchronizedQueue};
pub use server::{CentralState, JupiterDocumentServer};
pub use session::{MessageOutcome, SessionConfig, SessionManager, SessionStats, SiteEndpoint};
