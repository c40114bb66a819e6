//! Process-wide keyed session state.
//!
//! [`SessionStore`] keeps one entry per requester in a `DashMap`. Every
//! operation on a requester runs under that key's shard lock and never across
//! an `.await`, so operations on the same requester are linearizable while
//! different requesters proceed independently.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Outcome, SessionState};
use crate::catalog::CatalogResult;

/// Opaque identity of a requester (chat user, console user, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequesterId(String);

impl RequesterId {
    /// Creates a requester id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequesterId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RequesterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for RequesterId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// A submitted locator waiting for a variant choice, with the catalog
/// response its variant ids belong to.
#[derive(Debug, Clone)]
pub struct PendingLocator {
    /// The submitted locator.
    pub locator: String,
    /// Catalog returned for that submission.
    pub catalog: Arc<CatalogResult>,
}

/// Why a download could not be started for a requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginRefusal {
    /// Nothing was submitted, or the pending locator was already consumed.
    NoPendingLocator,
    /// The requester already has a download running.
    DownloadInProgress,
}

#[derive(Debug)]
struct ActiveDownload {
    variant_id: String,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct SessionEntry {
    pending: Option<PendingLocator>,
    state: SessionState,
    active: Option<ActiveDownload>,
    last_outcome: Option<Outcome>,
}

impl SessionEntry {
    fn settle_state(&mut self) {
        self.state = if self.active.is_some() {
            SessionState::Downloading
        } else if self.pending.is_some() {
            SessionState::AwaitingSelection
        } else {
            SessionState::Idle
        };
    }
}

/// Per-requester session state shared by all concurrent sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<RequesterId, SessionEntry>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `locator` as pending, overwriting any earlier one.
    pub fn set_pending_locator(
        &self,
        requester: &RequesterId,
        locator: impl Into<String>,
        catalog: Arc<CatalogResult>,
    ) {
        let mut entry = self.sessions.entry(requester.clone()).or_default();
        let replaced = entry
            .pending
            .replace(PendingLocator {
                locator: locator.into(),
                catalog,
            })
            .is_some();
        entry.settle_state();
        debug!(requester = %requester, replaced, "pending locator recorded");
    }

    /// Returns and clears the pending locator.
    pub fn take_pending_locator(&self, requester: &RequesterId) -> Option<PendingLocator> {
        let mut entry = self.sessions.get_mut(requester)?;
        let pending = entry.pending.take();
        entry.settle_state();
        pending
    }

    /// True when a locator is waiting for a variant choice.
    #[must_use]
    pub fn has_pending(&self, requester: &RequesterId) -> bool {
        self.sessions
            .get(requester)
            .is_some_and(|entry| entry.pending.is_some())
    }

    /// Drops any pending locator without starting a download.
    pub fn clear_pending(&self, requester: &RequesterId) {
        if let Some(mut entry) = self.sessions.get_mut(requester) {
            entry.pending = None;
            entry.settle_state();
        }
    }

    /// Current state of the requester's session.
    #[must_use]
    pub fn state(&self, requester: &RequesterId) -> SessionState {
        self.sessions
            .get(requester)
            .map_or(SessionState::Idle, |entry| entry.state)
    }

    /// Outcome of the requester's most recent download attempt.
    #[must_use]
    pub fn last_outcome(&self, requester: &RequesterId) -> Option<Outcome> {
        self.sessions.get(requester).and_then(|entry| entry.last_outcome)
    }

    /// Variant currently downloading for the requester, if any.
    #[must_use]
    pub fn active_variant(&self, requester: &RequesterId) -> Option<String> {
        self.sessions
            .get(requester)
            .and_then(|entry| entry.active.as_ref().map(|a| a.variant_id.clone()))
    }

    /// Atomically consumes the pending locator and marks the session as
    /// downloading.
    ///
    /// A refused begin leaves the entry untouched.
    ///
    /// # Errors
    ///
    /// Returns [`BeginRefusal::DownloadInProgress`] if a download is already
    /// running, or [`BeginRefusal::NoPendingLocator`] if nothing is pending.
    pub fn begin_download(
        &self,
        requester: &RequesterId,
        variant_id: &str,
    ) -> Result<(PendingLocator, CancellationToken), BeginRefusal> {
        let mut entry = self
            .sessions
            .get_mut(requester)
            .ok_or(BeginRefusal::NoPendingLocator)?;

        if entry.active.is_some() {
            return Err(BeginRefusal::DownloadInProgress);
        }
        let pending = entry
            .pending
            .take()
            .ok_or(BeginRefusal::NoPendingLocator)?;

        let cancel = CancellationToken::new();
        entry.active = Some(ActiveDownload {
            variant_id: variant_id.to_string(),
            cancel: cancel.clone(),
        });
        entry.settle_state();
        Ok((pending, cancel))
    }

    /// Clears the active download and records its outcome.
    pub fn finish_download(&self, requester: &RequesterId, outcome: Outcome) {
        if let Some(mut entry) = self.sessions.get_mut(requester) {
            entry.active = None;
            entry.last_outcome = Some(outcome);
            entry.settle_state();
        }
        debug!(requester = %requester, ?outcome, "download finished");
    }

    /// Cancels the requester's in-flight download and drops any pending
    /// locator. Returns true if a download was running.
    pub fn cancel(&self, requester: &RequesterId) -> bool {
        let Some(mut entry) = self.sessions.get_mut(requester) else {
            return false;
        };
        entry.pending = None;
        let had_download = entry.active.as_ref().is_some_and(|active| {
            active.cancel.cancel();
            true
        });
        entry.settle_state();
        had_download
    }

    /// Number of requesters the store has seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no requester has interacted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::SizeCeiling;

    fn empty_catalog() -> Arc<CatalogResult> {
        Arc::new(CatalogResult::classify(None, Vec::new(), SizeCeiling::new(1)))
    }

    #[test]
    fn test_set_then_take_clears() {
        let store = SessionStore::new();
        let alice = RequesterId::from("alice");
        store.set_pending_locator(&alice, "https://a.test/1", empty_catalog());
        assert!(store.has_pending(&alice));
        assert_eq!(store.state(&alice), SessionState::AwaitingSelection);

        let taken = store.take_pending_locator(&alice).unwrap();
        assert_eq!(taken.locator, "https://a.test/1");
        assert!(!store.has_pending(&alice));
        assert!(store.take_pending_locator(&alice).is_none());
        assert_eq!(store.state(&alice), SessionState::Idle);
    }

    #[test]
    fn test_later_submission_overwrites() {
        let store = SessionStore::new();
        let alice = RequesterId::from("alice");
        store.set_pending_locator(&alice, "https://a.test/1", empty_catalog());
        store.set_pending_locator(&alice, "https://a.test/2", empty_catalog());
        assert_eq!(
            store.take_pending_locator(&alice).unwrap().locator,
            "https://a.test/2"
        );
    }

    #[test]
    fn test_requesters_are_independent() {
        let store = SessionStore::new();
        let alice = RequesterId::from("alice");
        let bob = RequesterId::from(42_i64);
        store.set_pending_locator(&alice, "https://a.test/1", empty_catalog());
        assert!(!store.has_pending(&bob));
        assert!(store.take_pending_locator(&bob).is_none());
        assert!(store.has_pending(&alice));
        assert_eq!(bob.as_str(), "42");
    }

    #[test]
    fn test_begin_download_requires_pending() {
        let store = SessionStore::new();
        let alice = RequesterId::from("alice");
        assert_eq!(
            store.begin_download(&alice, "18").unwrap_err(),
            BeginRefusal::NoPendingLocator
        );
    }

    #[test]
    fn test_begin_download_refuses_second_active() {
        let store = SessionStore::new();
        let alice = RequesterId::from("alice");
        store.set_pending_locator(&alice, "https://a.test/1", empty_catalog());
        let (_pending, _token) = store.begin_download(&alice, "18").unwrap();
        assert_eq!(store.state(&alice), SessionState::Downloading);
        assert_eq!(store.active_variant(&alice).as_deref(), Some("18"));

        store.set_pending_locator(&alice, "https://a.test/2", empty_catalog());
        assert_eq!(store.state(&alice), SessionState::Downloading);
        assert_eq!(
            store.begin_download(&alice, "22").unwrap_err(),
            BeginRefusal::DownloadInProgress
        );
        assert!(store.has_pending(&alice), "refusal must not consume the pending locator");

        store.finish_download(&alice, Outcome::Delivered);
        assert_eq!(store.state(&alice), SessionState::AwaitingSelection);
        assert_eq!(store.last_outcome(&alice), Some(Outcome::Delivered));
    }

    #[test]
    fn test_cancel_fires_token_and_clears_pending() {
        let store = SessionStore::new();
        let alice = RequesterId::from("alice");
        store.set_pending_locator(&alice, "https://a.test/1", empty_catalog());
        let (_pending, token) = store.begin_download(&alice, "18").unwrap();
        store.set_pending_locator(&alice, "https://a.test/2", empty_catalog());

        assert!(store.cancel(&alice));
        assert!(token.is_cancelled());
        assert!(!store.has_pending(&alice));

        store.finish_download(&alice, Outcome::Cancelled);
        assert_eq!(store.state(&alice), SessionState::Idle);
    }

    #[test]
    fn test_cancel_without_download() {
        let store = SessionStore::new();
        let alice = RequesterId::from("alice");
        assert!(!store.cancel(&alice));
        store.set_pending_locator(&alice, "https://a.test/1", empty_catalog());
        assert!(!store.cancel(&alice));
        assert_eq!(store.state(&alice), SessionState::Idle);
    }

    #[test]
    fn test_concurrent_updates_on_distinct_keys() {
        use std::thread;

        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (0..8_i64)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let id = RequesterId::from(i);
                    for n in 0..100 {
                        store.set_pending_locator(
                            &id,
                            format!("https://a.test/{n}"),
                            empty_catalog(),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 8);
        for i in 0..8_i64 {
            let pending = store.take_pending_locator(&RequesterId::from(i)).unwrap();
            assert_eq!(pending.locator, "https://a.test/99");
        }
    }
}
