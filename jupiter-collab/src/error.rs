//! Session-level errors.

use thiserror::Error;
use uuid::Uuid;

use jupiter_ot::{SiteId, TransformationError};

use crate::protocol::ProtocolError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("document {0} is not open")]
    UnknownDocument(Uuid),

    #[error("site {site_id} is not registered for document {doc_id}")]
    UnknownSite { doc_id: Uuid, site_id: SiteId },

    #[error("site {site_id} already joined document {doc_id}")]
    SiteAlreadyJoined { doc_id: Uuid, site_id: SiteId },

    #[error("document {doc_id} already has the maximum of {max} sites")]
    DocumentFull { doc_id: Uuid, max: usize },

    #[error("the server site id cannot join as a client")]
    ReservedSite,

    /// Replicas disagree; the document has to be resynchronized.
    #[error("transformation failed: {0}")]
    Transformation(#[from] TransformationError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Whether recovering requires a fresh snapshot of the document.
    pub fn requires_resync(&self) -> bool {
        matches!(self, SessionError::Transformation(_))
    }
}
