//! Central authority for one shared document.
//!
//! Architecture:
//! ```text
//! Client A ──► ProxyQueue(A) ──┐                      ┌──► ProxyQueue(B) ──► Client B
//!                              ├── CentralState ──────┤
//! Client C ──► ProxyQueue(C) ──┘   (text + clock)     └──► ProxyQueue(C) ──► Client C
//! ```
//!
//! A request from one client is integrated through that client's proxy,
//! applied to the authoritative text, then re-issued through every other
//! client's proxy. All of this is one step: the caller must hold the
//! document's lock for the whole of `on_client_request` and `add_proxy_client`.

use std::collections::BTreeMap;

use uuid::Uuid;

use jupiter_ot::{Operation, Request, SiteId, TextDocument, TransformationError, VectorTime};

use crate::error::SessionError;
use crate::protocol::JoinSnapshot;
use crate::queue::{ProxyQueue, SynchronizedQueue};

/// The server's own view of the document.
///
/// One vector time component per client counts the requests integrated
/// from it; the server component counts every operation sequenced.
#[derive(Debug, Clone)]
pub struct CentralState {
    vector_time: VectorTime,
    document: TextDocument,
}

impl CentralState {
    pub fn new(initial_text: &str) -> Self {
        let mut vector_time = VectorTime::new();
        vector_time.track(SiteId::server());
        Self {
            vector_time,
            document: TextDocument::new(initial_text),
        }
    }

    /// Apply `op` from `site` to the authoritative text and count it.
    pub fn integrate(&mut self, site: SiteId, op: &Operation) -> Result<(), TransformationError> {
        self.document.apply(op)?;
        self.vector_time.increment(site);
        self.vector_time.increment(SiteId::server());
        Ok(())
    }

    pub fn snapshot(&self) -> JoinSnapshot {
        JoinSnapshot {
            text: self.document.text(),
            vector_time: self.vector_time.clone(),
        }
    }

    pub fn vector_time(&self) -> &VectorTime {
        &self.vector_time
    }

    pub fn document(&self) -> &TextDocument {
        &self.document
    }
}

/// Central state plus one proxy per connected client.
pub struct JupiterDocumentServer {
    doc_id: Uuid,
    central: CentralState,
    proxies: BTreeMap<SiteId, ProxyQueue>,
}

impl JupiterDocumentServer {
    pub fn new(doc_id: Uuid, initial_text: &str) -> Self {
        Self {
            doc_id,
            central: CentralState::new(initial_text),
            proxies: BTreeMap::new(),
        }
    }

    /// Register a late-joining site.
    ///
    /// The proxy is seeded with the returned snapshot's vector time and the
    /// client must call `update_vector_time` with the same value before it
    /// sends or receives anything.
    pub fn add_proxy_client(&mut self, site: SiteId) -> Result<JoinSnapshot, SessionError> {
        if site.is_server() {
            return Err(SessionError::ReservedSite);
        }
        if self.proxies.contains_key(&site) {
            return Err(SessionError::SiteAlreadyJoined {
                doc_id: self.doc_id,
                site_id: site,
            });
        }

        self.central.vector_time.track(site);
        let snapshot = self.central.snapshot();
        self.proxies
            .insert(site, ProxyQueue::new(site, snapshot.vector_time.clone()));

        log::info!(
            "Site {site} joined doc {} at {} ({} sites)",
            self.doc_id,
            snapshot.vector_time,
            self.proxies.len()
        );
        Ok(snapshot)
    }

    /// Drop a site's proxy. Later requests from it are rejected.
    pub fn remove_proxy_client(&mut self, site: SiteId) -> Result<(), SessionError> {
        match self.proxies.remove(&site) {
            Some(proxy) => {
                if proxy.pending_len() > 0 {
                    log::debug!(
                        "Site {site} left doc {} with {} unacknowledged operations",
                        self.doc_id,
                        proxy.pending_len()
                    );
                }
                log::info!("Site {site} left doc {} ({} sites)", self.doc_id, self.proxies.len());
                Ok(())
            }
            None => Err(SessionError::UnknownSite {
                doc_id: self.doc_id,
                site_id: site,
            }),
        }
    }

    /// Integrate a client's request and produce the request each other
    /// site has to receive, in site order.
    ///
    /// Duplicates produce nothing. A request from an unregistered site is
    /// logged and rejected without touching any state.
    pub fn on_client_request(
        &mut self,
        site: SiteId,
        request: &Request,
    ) -> Result<Vec<(SiteId, Request)>, SessionError> {
        let Some(proxy) = self.proxies.get_mut(&site) else {
            log::warn!(
                "Dropping request #{} from unregistered site {site} on doc {}",
                request.sequence().1,
                self.doc_id
            );
            return Err(SessionError::UnknownSite {
                doc_id: self.doc_id,
                site_id: site,
            });
        };

        if proxy.is_reflected(request) {
            log::debug!("Duplicate request #{} from {site} ignored", request.sequence().1);
            return Ok(Vec::new());
        }

        let op = proxy.receive_operation(request)?;
        self.central.integrate(site, &op)?;
        if op.is_noop() {
            return Ok(Vec::new());
        }

        let destinations: Vec<SiteId> = self.proxies.keys().copied().filter(|s| *s != site).collect();
        let mut outgoing = Vec::with_capacity(destinations.len());
        for destination in destinations {
            let forwarded = self.send_transformed_operation(op.clone(), destination)?;
            outgoing.push((destination, forwarded));
        }

        log::debug!(
            "Doc {}: integrated {op} from {site}, forwarding to {} sites",
            self.doc_id,
            outgoing.len()
        );
        Ok(outgoing)
    }

    /// Issue an operation already applied to the central text to one site.
    pub fn send_transformed_operation(
        &mut self,
        op: Operation,
        destination: SiteId,
    ) -> Result<Request, SessionError> {
        let proxy = self
            .proxies
            .get_mut(&destination)
            .ok_or(SessionError::UnknownSite {
                doc_id: self.doc_id,
                site_id: destination,
            })?;
        proxy.send_operation(op)
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    pub fn text(&self) -> String {
        self.central.document.text()
    }

    pub fn vector_time(&self) -> &VectorTime {
        &self.central.vector_time
    }

    pub fn central(&self) -> &CentralState {
        &self.central
    }

    pub fn proxy(&self, site: &SiteId) -> Option<&ProxyQueue> {
        self.proxies.get(site)
    }

    pub fn sites(&self) -> impl Iterator<Item = &SiteId> {
        self.proxies.keys()
    }

    pub fn site_count(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
