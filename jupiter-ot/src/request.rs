//! An operation stamped with the vector time it was generated at.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::operation::Operation;
use crate::vector_time::VectorTime;
use crate::SiteId;

/// Immutable once built; receivers only ever derive new operations from it.
///
/// `timestamp` is the sender's vector time *before* the request was counted,
/// so `timestamp[site_id]` is the request's zero-based sequence number and
/// `(site_id, timestamp[site_id])` identifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    operation: Operation,
    timestamp: VectorTime,
    site_id: SiteId,
}

impl Request {
    pub fn new(operation: Operation, timestamp: VectorTime, site_id: SiteId) -> Self {
        Self {
            operation,
            timestamp,
            site_id,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn timestamp(&self) -> &VectorTime {
        &self.timestamp
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    /// Deduplication key.
    pub fn sequence(&self) -> (SiteId, u64) {
        (self.site_id, self.timestamp.get(&self.site_id))
    }

    pub fn into_operation(self) -> Operation {
        self.operation
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} at {}", self.operation, self.site_id, self.timestamp)
    }
}
