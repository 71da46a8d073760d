//! Binary wire protocol between editor sites and the document server.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────────────────────────┐
//! │ msg_type │ site_id   │ doc_id   │ payload                      │
//! │ 1 byte   │ 16 bytes  │ 16 bytes │ Request / JoinSnapshot / ∅   │
//! └──────────┴───────────┴──────────┴──────────────────────────────┘
//! ```
//!
//! A site announces itself with `Join`, receives exactly one `Snapshot`
//! (document text + the vector time to seed its algorithm with), then
//! exchanges `Request` messages until it sends `Leave`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use jupiter_ot::{Request, SiteId, VectorTime};

/// Message types for the session protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Site asks to take part in a document session
    Join = 1,
    /// Server's answer to a join: text + vector time snapshot
    Snapshot = 2,
    /// A Jupiter request, in either direction
    Request = 3,
    /// Site leaves the document session
    Leave = 4,
}

/// State handed to a late joiner. Its algorithm must be seeded with
/// `vector_time` (see `update_vector_time`) before any request flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSnapshot {
    pub text: String,
    pub vector_time: VectorTime,
}

/// Top-level protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub msg_type: MessageType,
    /// Sender for `Join`/`Request`/`Leave`, recipient for `Snapshot`
    pub site_id: SiteId,
    pub doc_id: Uuid,
    pub payload: Vec<u8>,
}

impl WireMessage {
    /// `initial_text` seeds the document only if this join opens it.
    pub fn join(site_id: SiteId, doc_id: Uuid, initial_text: &str) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::Join,
            site_id,
            doc_id,
            payload: encode_payload(&initial_text)?,
        })
    }

    pub fn snapshot(site_id: SiteId, doc_id: Uuid, snapshot: &JoinSnapshot) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::Snapshot,
            site_id,
            doc_id,
            payload: encode_payload(snapshot)?,
        })
    }

    /// Wrap a request; the site id is taken from the request itself.
    pub fn request(doc_id: Uuid, request: &Request) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::Request,
            site_id: request.site_id(),
            doc_id,
            payload: encode_payload(request)?,
        })
    }

    pub fn leave(site_id: SiteId, doc_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Leave,
            site_id,
            doc_id,
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_payload(self)
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode_payload(bytes)
    }

    /// Parse the initial text carried by a join.
    pub fn to_initial_text(&self) -> Result<String, ProtocolError> {
        if self.msg_type != MessageType::Join {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }

    /// Parse a request payload.
    pub fn to_request(&self) -> Result<Request, ProtocolError> {
        if self.msg_type != MessageType::Request {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }

    /// Parse a snapshot payload.
    pub fn to_snapshot(&self) -> Result<JoinSnapshot, ProtocolError> {
        if self.msg_type != MessageType::Snapshot {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }
}

fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

fn decode_payload<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    Ok(value)
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    /// The other end of a request channel is gone
    ConnectionClosed,
    /// A bounded request channel has no free slot
    ChannelFull,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "Invalid message type"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::ChannelFull => write!(f, "Request channel full"),
        }
    }
}

impl std::error::Error for ProtocolError {}
