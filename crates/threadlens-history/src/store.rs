//! The [`HistoryStore`]: multi-session catalogue with optimistic entries.
//!
//! The store holds one [`HistoryEntry`] per session. An entry begins life in
//! one of two ways:
//!
//! - **optimistic**: created the instant a query is submitted, keyed by a
//!   client-generated placeholder until the server assigns an id;
//! - **confirmed**: synchronized from the backend listing endpoint.
//!
//! When the server assignment arrives, the optimistic entry is *replaced*
//! by the confirmed one (never duplicated), preserving the transcript it
//! accumulated while pending. Live-stream writes (`record_active`) always
//! apply regardless of which entry is currently viewed, and hydration
//! fetches merge rather than overwrite when they race with the stream.

use parking_lot::Mutex;
use tracing::{debug, warn};

use threadlens_core::session::{Message, QueryParams, Session, SessionKey};

use crate::client::{HistoryClient, HistoryListing, SessionDetail};

/// Summary projection of a session, lazily hydrated for viewing.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    /// Correlation key: local placeholder or server-assigned id.
    pub key: SessionKey,
    /// Listing title (derived from the originating question).
    pub title: String,
    /// Creation timestamp, as the backend formats it.
    pub created_at: String,
    /// Originating params, when known.
    pub params: Option<QueryParams>,
    /// Transcript mirror. Empty until hydrated or written by the live stream.
    pub transcript: Vec<Message>,
    /// Whether the full transcript has been loaded.
    pub hydrated: bool,
    /// Whether this entry is still awaiting server confirmation.
    pub pending: bool,
}

#[derive(Default)]
struct Inner {
    entries: Vec<HistoryEntry>,
    viewed: Option<SessionKey>,
}

impl Inner {
    fn position(&self, key: &SessionKey) -> Option<usize> {
        self.entries.iter().position(|e| e.key == *key)
    }

    fn position_by_id(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.key.assigned_id() == Some(id))
    }
}

/// Ordered catalogue of sessions, shared between the live controller and
/// any number of viewing surfaces.
#[derive(Default)]
pub struct HistoryStore {
    inner: Mutex<Inner>,
}

impl HistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an optimistic entry for a just-submitted session and mark
    /// it as viewed.
    pub fn begin_pending(&self, session: &Session) {
        let entry = HistoryEntry {
            key: session.key.clone(),
            title: session.title().to_string(),
            created_at: session.created_at.to_rfc3339(),
            params: Some(session.params.clone()),
            transcript: session.transcript().to_vec(),
            hydrated: true,
            pending: true,
        };
        let mut inner = self.inner.lock();
        match inner.position(&entry.key) {
            Some(pos) => inner.entries[pos] = entry.clone(),
            None => inner.entries.insert(0, entry.clone()),
        }
        inner.viewed = Some(entry.key);
    }

    /// Mirror one transcript append from the active session.
    ///
    /// Applies regardless of what is currently viewed. Creates a pending
    /// entry if none exists yet for `key`.
    pub fn record_active(&self, key: &SessionKey, message: Message) {
        let mut inner = self.inner.lock();
        match inner.position(key) {
            Some(pos) => inner.entries[pos].transcript.push(message),
            None => inner.entries.insert(
                0,
                HistoryEntry {
                    key: key.clone(),
                    title: String::new(),
                    created_at: String::new(),
                    params: None,
                    transcript: vec![message],
                    hydrated: true,
                    pending: key.assigned_id().is_none(),
                },
            ),
        }
    }

    /// Promote the optimistic entry keyed by `local` to the server-assigned
    /// id.
    ///
    /// If a refresh already produced a confirmed entry for `id`, the two
    /// collapse into one: the confirmed entry keeps the server's title and
    /// timestamp, and inherits the live transcript accumulated while
    /// pending (the live transcript is the complete record of this run).
    pub fn confirm_assignment(&self, local: &SessionKey, id: &str) {
        let mut inner = self.inner.lock();
        let local_pos = inner.position(local);
        let server_pos = inner.position_by_id(id);

        match (local_pos, server_pos) {
            (Some(lp), Some(sp)) => {
                let pending = inner.entries.remove(lp);
                let sp = if lp < sp { sp - 1 } else { sp };
                let confirmed = &mut inner.entries[sp];
                if !pending.transcript.is_empty() {
                    confirmed.transcript = pending.transcript;
                    confirmed.hydrated = true;
                }
                if confirmed.params.is_none() {
                    confirmed.params = pending.params;
                }
                confirmed.pending = false;
                debug!(%id, "collapsed optimistic entry into server-confirmed entry");
            }
            (Some(lp), None) => {
                let entry = &mut inner.entries[lp];
                entry.key = SessionKey::Assigned(id.to_string());
                entry.pending = false;
            }
            (None, Some(sp)) => inner.entries[sp].pending = false,
            (None, None) => {
                warn!(%id, "assignment for unknown session, creating entry");
                inner.entries.insert(
                    0,
                    HistoryEntry {
                        key: SessionKey::Assigned(id.to_string()),
                        title: String::new(),
                        created_at: String::new(),
                        params: None,
                        transcript: Vec::new(),
                        hydrated: true,
                        pending: false,
                    },
                );
            }
        }

        if inner.viewed.as_ref() == Some(local) {
            inner.viewed = Some(SessionKey::Assigned(id.to_string()));
        }
    }

    /// Replace the summary list with the backend's authoritative listing.
    ///
    /// Fetch failures degrade to an empty list. Entries whose id survives
    /// the refresh keep their accumulated transcript; pending local entries
    /// are preserved ahead of the listing until their assignment arrives.
    pub async fn refresh(&self, client: &HistoryClient) {
        let listed = match client.list().await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, "history listing fetch failed, degrading to empty list");
                Vec::new()
            }
        };
        self.merge_listing(listed);
    }

    fn merge_listing(&self, listed: Vec<HistoryListing>) {
        let mut inner = self.inner.lock();
        let previous = std::mem::take(&mut inner.entries);
        let mut next: Vec<HistoryEntry> = previous.iter().filter(|e| e.pending).cloned().collect();

        for listing in listed {
            let carried = previous
                .iter()
                .find(|e| e.key.assigned_id() == Some(listing.session_uuid.as_str()));
            next.push(HistoryEntry {
                key: SessionKey::Assigned(listing.session_uuid),
                title: listing.title,
                created_at: listing.created_at,
                params: carried.and_then(|e| e.params.clone()),
                transcript: carried.map(|e| e.transcript.clone()).unwrap_or_default(),
                hydrated: carried.is_some_and(|e| e.hydrated),
                pending: false,
            });
        }

        if let Some(viewed) = inner.viewed.clone() {
            if !next.iter().any(|e| e.key == viewed) {
                inner.viewed = None;
            }
        }
        inner.entries = next;
    }

    /// Mark `id` as the viewed session (last call wins) and return its
    /// hydrated snapshot.
    ///
    /// Hydration happens outside the lock so it never blocks live event
    /// delivery; if live writes land while the fetch is in flight, the live
    /// transcript wins and the fetched data only fills gaps. A failed fetch
    /// degrades to the unhydrated snapshot.
    pub async fn select(&self, id: &str, client: &HistoryClient) -> Option<HistoryEntry> {
        let needs_hydration = {
            let mut inner = self.inner.lock();
            let pos = inner.position_by_id(id)?;
            inner.viewed = Some(inner.entries[pos].key.clone());
            !inner.entries[pos].hydrated
        };

        if needs_hydration {
            match client.fetch_session(id).await {
                Ok(detail) => self.apply_detail(id, detail),
                Err(e) => warn!(%id, error = %e, "hydration failed, returning summary snapshot"),
            }
        }

        let inner = self.inner.lock();
        inner.position_by_id(id).map(|pos| inner.entries[pos].clone())
    }

    fn apply_detail(&self, id: &str, detail: SessionDetail) {
        let mut inner = self.inner.lock();
        let Some(pos) = inner.position_by_id(id) else {
            return;
        };
        let entry = &mut inner.entries[pos];
        // Merge, not overwrite: the live stream may have written while the
        // fetch was in flight, and its transcript is the fresher record.
        if entry.transcript.is_empty() {
            entry.transcript = detail.messages;
        }
        if entry.params.is_none() {
            entry.params = detail.params;
        }
        if entry.title.is_empty() {
            entry.title = detail.title;
        }
        entry.hydrated = true;
    }

    /// Snapshot of all entries, in display order.
    #[must_use]
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.lock().entries.clone()
    }

    /// The currently viewed session, if any.
    #[must_use]
    pub fn viewed(&self) -> Option<SessionKey> {
        self.inner.lock().viewed.clone()
    }

    /// Snapshot of one entry by server-assigned id.
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<HistoryEntry> {
        let inner = self.inner.lock();
        inner.position_by_id(id).map(|pos| inner.entries[pos].clone())
    }
}
