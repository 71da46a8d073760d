//! Arena of live document sessions.
//!
//! ```text
//! SessionManager
//!   └── documents: doc_id ──► Mutex<DocumentSession>
//!                                ├── JupiterDocumentServer (central state + proxies)
//!                                └── outgoing: site_id ──► RequestForwarder
//! ```
//!
//! Each document is guarded by exactly one lock. Joining (snapshot + proxy
//! registration) and integrating a request (transform + fan-out) both run
//! entirely under it, so no request can slip between a late joiner's
//! snapshot and the registration of its proxy. Different documents share
//! nothing and proceed in parallel.
//!
//! A document is created by its first join and closed when its last site
//! leaves or on an explicit `close`. Fan-out never waits on a slow reader:
//! a site whose channel is full is evicted and has to rejoin.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use jupiter_ot::{Request, SiteId, VectorTime};

use crate::error::SessionError;
use crate::forwarder::{request_channel, RequestForwarder, RequestReceiver};
use crate::protocol::{JoinSnapshot, MessageType, ProtocolError, WireMessage};
use crate::server::JupiterDocumentServer;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound of every per-site outgoing request channel
    pub channel_capacity: usize,
    /// Maximum sites per document
    pub max_sites_per_document: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            max_sites_per_document: 100,
        }
    }
}

/// Session statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub documents_opened: u64,
    pub documents_closed: u64,
    pub active_documents: usize,
    pub requests_integrated: u64,
    pub requests_forwarded: u64,
    pub requests_dropped: u64,
    pub sites_evicted: u64,
}

/// What a joining site gets back: the state to seed its client with and
/// the channel the server's requests for it arrive on.
pub struct SiteEndpoint {
    pub site_id: SiteId,
    pub doc_id: Uuid,
    pub snapshot: JoinSnapshot,
    pub incoming: RequestReceiver,
}

/// Result of handling one wire message.
pub enum MessageOutcome {
    /// Reply with the snapshot; requests for the site arrive on `incoming`
    Joined {
        reply: WireMessage,
        incoming: RequestReceiver,
    },
    /// Request integrated and forwarded to this many sites
    Forwarded(usize),
    Left,
}

struct DocumentSession {
    server: JupiterDocumentServer,
    outgoing: HashMap<SiteId, RequestForwarder>,
    /// Set once the document left the arena; a session that observes it
    /// must not be used any more.
    closed: bool,
}

/// Owns every open document. Cloning yields another handle to the same
/// arena.
#[derive(Clone)]
pub struct SessionManager {
    config: SessionConfig,
    documents: Arc<RwLock<HashMap<Uuid, Arc<Mutex<DocumentSession>>>>>,
    stats: Arc<RwLock<SessionStats>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            documents: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(SessionStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SessionConfig::default())
    }

    /// Add `site` to `doc_id`, opening the document with `initial_text` if
    /// it is not open yet.
    pub async fn join(
        &self,
        doc_id: Uuid,
        site: SiteId,
        initial_text: &str,
    ) -> Result<SiteEndpoint, SessionError> {
        if site.is_server() {
            return Err(SessionError::ReservedSite);
        }

        loop {
            let session = self.open_document(doc_id, initial_text).await;
            let mut doc = session.lock().await;
            if doc.closed {
                // Closed between lookup and lock; the next lookup opens a fresh one.
                continue;
            }

            let max = self.config.max_sites_per_document.max(1);
            if doc.server.site_count() >= max {
                log::warn!("Site {site} refused on doc {doc_id}: {max} sites already joined");
                return Err(SessionError::DocumentFull { doc_id, max });
            }

            let snapshot = doc.server.add_proxy_client(site)?;
            let (forwarder, incoming) = request_channel(self.config.channel_capacity);
            doc.outgoing.insert(site, forwarder);

            return Ok(SiteEndpoint {
                site_id: site,
                doc_id,
                snapshot,
                incoming,
            });
        }
    }

    /// Integrate a request from `site` and forward the result to every
    /// other site of the document. Returns the number of sites reached.
    ///
    /// Forwarding never waits. A destination whose channel is full or
    /// closed is evicted from the document: its proxy and channel are
    /// dropped, so its receiver drains what was queued and then ends. The
    /// site has to join again to get a fresh snapshot.
    pub async fn submit(
        &self,
        doc_id: Uuid,
        site: SiteId,
        request: Request,
    ) -> Result<usize, SessionError> {
        let session = self.document(doc_id).await?;
        let mut doc = session.lock().await;
        if doc.closed {
            return Err(SessionError::UnknownDocument(doc_id));
        }

        if doc
            .server
            .proxy(&site)
            .is_some_and(|proxy| proxy.is_reflected(&request))
        {
            log::debug!("Duplicate request #{} from {site} on doc {doc_id}", request.sequence().1);
            self.stats.write().await.requests_dropped += 1;
            return Ok(0);
        }

        let outgoing = match doc.server.on_client_request(site, &request) {
            Ok(outgoing) => outgoing,
            Err(e) => {
                if e.requires_resync() {
                    log::error!("Doc {doc_id} needs resynchronization: request from {site} failed: {e}");
                }
                self.stats.write().await.requests_dropped += 1;
                return Err(e);
            }
        };

        let mut forwarded = 0;
        let mut failed = 0;
        let mut evicted = Vec::new();
        for (destination, forwarded_request) in outgoing {
            let Some(forwarder) = doc.outgoing.get(&destination) else {
                log::warn!("No channel for site {destination} on doc {doc_id}");
                failed += 1;
                evicted.push(destination);
                continue;
            };
            match forwarder.try_forward_outgoing_request(forwarded_request) {
                Ok(()) => forwarded += 1,
                Err(e) => {
                    log::warn!("Evicting site {destination} from doc {doc_id}: {e}");
                    failed += 1;
                    evicted.push(destination);
                }
            }
        }

        // An evicted site lost a request and must rejoin to resynchronize.
        for destination in &evicted {
            let _ = doc.server.remove_proxy_client(*destination);
            doc.outgoing.remove(destination);
        }
        drop(doc);

        let mut stats = self.stats.write().await;
        stats.requests_integrated += 1;
        stats.requests_forwarded += forwarded as u64;
        stats.requests_dropped += failed;
        stats.sites_evicted += evicted.len() as u64;
        Ok(forwarded)
    }

    /// Remove `site` from the document; the last site to leave closes it.
    pub async fn leave(&self, doc_id: Uuid, site: SiteId) -> Result<(), SessionError> {
        let session = self.document(doc_id).await?;
        let mut doc = session.lock().await;
        if doc.closed {
            return Err(SessionError::UnknownDocument(doc_id));
        }

        doc.server.remove_proxy_client(site)?;
        doc.outgoing.remove(&site);
        if doc.server.is_empty() {
            doc.closed = true;
            drop(doc);
            self.discard(doc_id, &session).await;
        }
        Ok(())
    }

    /// Close a document regardless of who is still joined. Their request
    /// channels end.
    pub async fn close(&self, doc_id: Uuid) -> Result<(), SessionError> {
        let session = self.document(doc_id).await?;
        let mut doc = session.lock().await;
        if doc.closed {
            return Err(SessionError::UnknownDocument(doc_id));
        }
        doc.closed = true;
        doc.outgoing.clear();
        drop(doc);
        self.discard(doc_id, &session).await;
        Ok(())
    }

    /// Dispatch one decoded wire message from a site.
    pub async fn handle_message(&self, msg: &WireMessage) -> Result<MessageOutcome, SessionError> {
        match msg.msg_type {
            MessageType::Join => {
                let initial_text = msg.to_initial_text()?;
                let endpoint = self.join(msg.doc_id, msg.site_id, &initial_text).await?;
                let reply = WireMessage::snapshot(msg.site_id, msg.doc_id, &endpoint.snapshot)?;
                Ok(MessageOutcome::Joined {
                    reply,
                    incoming: endpoint.incoming,
                })
            }
            MessageType::Request => {
                let request = msg.to_request()?;
                if request.site_id() != msg.site_id {
                    log::warn!(
                        "Rejecting frame from site {}: request is from {}",
                        msg.site_id,
                        request.site_id()
                    );
                    return Err(ProtocolError::InvalidMessageType.into());
                }
                let forwarded = self.submit(msg.doc_id, msg.site_id, request).await?;
                Ok(MessageOutcome::Forwarded(forwarded))
            }
            MessageType::Leave => {
                self.leave(msg.doc_id, msg.site_id).await?;
                Ok(MessageOutcome::Left)
            }
            MessageType::Snapshot => {
                log::debug!("Ignoring snapshot sent by site {}", msg.site_id);
                Err(ProtocolError::InvalidMessageType.into())
            }
        }
    }

    pub async fn document_text(&self, doc_id: Uuid) -> Result<String, SessionError> {
        let session = self.document(doc_id).await?;
        let doc = session.lock().await;
        Ok(doc.server.text())
    }

    pub async fn document_vector_time(&self, doc_id: Uuid) -> Result<VectorTime, SessionError> {
        let session = self.document(doc_id).await?;
        let doc = session.lock().await;
        Ok(doc.server.vector_time().clone())
    }

    pub async fn sites(&self, doc_id: Uuid) -> Result<Vec<SiteId>, SessionError> {
        let session = self.document(doc_id).await?;
        let doc = session.lock().await;
        Ok(doc.server.sites().copied().collect())
    }

    pub async fn active_documents(&self) -> Vec<Uuid> {
        self.documents.read().await.keys().copied().collect()
    }

    pub async fn stats(&self) -> SessionStats {
        self.stats.read().await.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn document(&self, doc_id: Uuid) -> Result<Arc<Mutex<DocumentSession>>, SessionError> {
        self.documents
            .read()
            .await
            .get(&doc_id)
            .cloned()
            .ok_or(SessionError::UnknownDocument(doc_id))
    }

    /// Get or create the session for `doc_id`.
    async fn open_document(&self, doc_id: Uuid, initial_text: &str) -> Arc<Mutex<DocumentSession>> {
        let mut documents = self.documents.write().await;
        if let Some(session) = documents.get(&doc_id) {
            return session.clone();
        }

        let session = Arc::new(Mutex::new(DocumentSession {
            server: JupiterDocumentServer::new(doc_id, initial_text),
            outgoing: HashMap::new(),
            closed: false,
        }));
        documents.insert(doc_id, session.clone());
        let active = documents.len();
        drop(documents);

        let mut stats = self.stats.write().await;
        stats.documents_opened += 1;
        stats.active_documents = active;
        log::info!("Document {doc_id} opened ({active} active)");
        session
    }

    /// Remove a closed session from the arena unless it was replaced already.
    async fn discard(&self, doc_id: Uuid, session: &Arc<Mutex<DocumentSession>>) {
        let mut documents = self.documents.write().await;
        if documents
            .get(&doc_id)
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            documents.remove(&doc_id);
        }
        let active = documents.len();
        drop(documents);

        let mut stats = self.stats.write().await;
        stats.documents_closed += 1;
        stats.active_documents = active;
        log::info!("Document {doc_id} closed ({active} active)");
    }
}
