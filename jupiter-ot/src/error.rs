//! Errors raised by the transformation core.
//!
//! None of these are recoverable locally: they mean two replicas disagree
//! about history and the session layer has to resynchronize the document
//! from a fresh snapshot.

use thiserror::Error;

use crate::SiteId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformationError {
    #[error("position overflow while transforming {0}")]
    PositionOverflow(&'static str),

    #[error("range {start}..{end} out of bounds for text of {len} chars")]
    SliceOutOfRange { start: usize, end: usize, len: usize },

    #[error("position {position} out of bounds for document of {len} chars")]
    OutOfBounds { position: usize, len: usize },

    #[error("delete at {position} expected {expected:?} but document holds {found:?}")]
    DeleteMismatch {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("request from {found} delivered to the algorithm paired with {expected}")]
    WrongPeer { expected: SiteId, found: SiteId },

    #[error("request #{received} from {site} arrived before #{expected}")]
    OutOfOrder {
        site: SiteId,
        expected: u64,
        received: u64,
    },

    #[error("request acknowledges {acknowledged} local operations but only {generated} were generated")]
    AcknowledgedUnknown { acknowledged: u64, generated: u64 },

    #[error("acknowledgement moved backwards from {previous} to {acknowledged}")]
    StaleAcknowledgement { previous: u64, acknowledged: u64 },

    #[error("cannot reset vector time with {0} local requests still pending")]
    PendingRequests(usize),
}
