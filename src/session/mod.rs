//! Acquisition session engine.
//!
//! [`AcquisitionSession`] walks each requester from locator submission to
//! variant listing, variant selection, download, and finally delivery or
//! cleanup. Per-requester state lives in the [`SessionStore`]; everything
//! else about a download is scoped to the `select_variant` call that runs it.
//!
//! # State machine
//!
//! ```text
//! Idle --submit_locator--> AwaitingSelection --select_variant--> Downloading
//! Downloading --> Delivered | Rejected | Failed | Cancelled --> Idle
//! ```
//!
//! # Storage guarantee
//!
//! Each download writes into its own [`ArtifactWorkspace`]. Every exit path
//! out of `Downloading` releases it: delivered files are released by the
//! [`DeliveryGate`], every other path releases the workspace directly, and a
//! dropped future releases it through `Drop`.
//!
//! # Concurrency
//!
//! Downloads across requesters run concurrently, bounded by a semaphore
//! sized from [`EngineConfig::max_concurrent_downloads`]. Raw progress events
//! travel over an unbounded channel to a dedicated relay task that throttles
//! them into milestones, so transport latency never stalls the download.

mod error;
mod store;

pub use error::SessionError;
pub use store::{BeginRefusal, PendingLocator, RequesterId, SessionStore};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::artifact::{Artifact, ArtifactWorkspace};
use crate::catalog::{Bucket, CatalogResult, VariantCatalog};
use crate::config::{ConfigError, EngineConfig};
use crate::delivery::DeliveryGate;
use crate::extract::{DownloadRequest, ExtractError, MediaExtractor, ProgressEvent};
use crate::progress::ProgressThrottle;
use crate::transport::render::format_milestone;
use crate::transport::{DeliveryAck, Transport};

/// Where a requester currently is in the acquisition flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing pending.
    #[default]
    Idle,
    /// A catalog was shown and a variant choice is expected.
    AwaitingSelection,
    /// A download is queued or running.
    Downloading,
}

/// Terminal result of one download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The artifact reached the transport.
    Delivered,
    /// The variant or the stored file exceeded the ceiling.
    Rejected,
    /// The download or delivery failed.
    Failed,
    /// The requester cancelled.
    Cancelled,
}

impl Outcome {
    fn of(result: &Result<DeliveryAck, SessionError>) -> Self {
        match result {
            Ok(_) => Self::Delivered,
            Err(SessionError::VariantTooLarge { .. }) => Self::Rejected,
            Err(SessionError::Cancelled) => Self::Cancelled,
            Err(_) => Self::Failed,
        }
    }
}

/// Marks the requester's download finished when dropped, so an aborted
/// `select_variant` future never leaves the session stuck in `Downloading`.
struct ActiveSlot<'a> {
    store: &'a SessionStore,
    requester: &'a RequesterId,
    settled: bool,
}

impl ActiveSlot<'_> {
    fn settle(mut self, outcome: Outcome) {
        self.store.finish_download(self.requester, outcome);
        self.settled = true;
    }
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.store.finish_download(self.requester, Outcome::Cancelled);
        }
    }
}

/// Orchestrates every requester's locator → variant → download journey.
pub struct AcquisitionSession {
    catalog: VariantCatalog,
    extractor: Arc<dyn MediaExtractor>,
    transport: Arc<dyn Transport>,
    gate: DeliveryGate,
    store: SessionStore,
    work_dir: PathBuf,
    admission: Arc<Semaphore>,
}

impl fmt::Debug for AcquisitionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionSession")
            .field("catalog", &self.catalog)
            .field("work_dir", &self.work_dir)
            .field("sessions", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl AcquisitionSession {
    /// Creates an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` is invalid.
    #[instrument(level = "debug", skip(extractor, transport))]
    pub fn new(
        config: &EngineConfig,
        extractor: Arc<dyn MediaExtractor>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        debug!(
            extractor = extractor.name(),
            ceiling = config.ceiling.bytes(),
            max_concurrent_downloads = config.max_concurrent_downloads,
            "creating acquisition session engine"
        );

        Ok(Self {
            catalog: VariantCatalog::new(Arc::clone(&extractor), config.ceiling),
            extractor,
            gate: DeliveryGate::new(Arc::clone(&transport)),
            transport,
            store: SessionStore::new(),
            work_dir: config.work_dir.clone(),
            admission: Arc::new(Semaphore::new(config.max_concurrent_downloads)),
        })
    }

    /// The shared per-requester store.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Current state of a requester's session.
    #[must_use]
    pub fn state(&self, requester: &RequesterId) -> SessionState {
        self.store.state(requester)
    }

    /// Outcome of a requester's most recent download attempt.
    #[must_use]
    pub fn last_outcome(&self, requester: &RequesterId) -> Option<Outcome> {
        self.store.last_outcome(requester)
    }

    /// Lists the variants behind `locator` and records it as pending.
    ///
    /// On failure no locator is left pending for the requester, including
    /// one from an earlier submission.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ExtractionFailed`] if the extractor fails.
    #[instrument(skip(self), fields(requester = %requester))]
    pub async fn submit_locator(
        &self,
        requester: &RequesterId,
        locator: &str,
    ) -> Result<Arc<CatalogResult>, SessionError> {
        self.notify(requester, "Fetching the list of formats...").await;

        let catalog = match self.catalog.list_variants(locator).await {
            Ok(catalog) => Arc::new(catalog),
            Err(source) => {
                warn!(error = %source, "catalog lookup failed");
                self.store.clear_pending(requester);
                let error = SessionError::ExtractionFailed { source };
                self.notify(requester, &error.requester_message()).await;
                return Err(error);
            }
        };

        self.store.set_pending_locator(requester, locator.trim(), Arc::clone(&catalog));
        info!(
            available = catalog.available.len(),
            rejected = catalog.rejected.len(),
            "awaiting variant selection"
        );

        if let Err(e) = self.transport.render_catalog(requester, &catalog).await {
            warn!(error = %e, "failed to render catalog");
        }
        Ok(catalog)
    }

    /// Downloads the chosen variant of the pending locator and delivers it.
    ///
    /// Runs until the attempt reaches a terminal outcome. The requester is
    /// notified of any failure before this returns.
    ///
    /// # Errors
    ///
    /// Returns the [`SessionError`] that ended the attempt.
    #[instrument(skip(self), fields(requester = %requester))]
    pub async fn select_variant(
        &self,
        requester: &RequesterId,
        variant_id: &str,
    ) -> Result<DeliveryAck, SessionError> {
        let (pending, cancel) = match self.store.begin_download(requester, variant_id) {
            Ok(begun) => begun,
            Err(refusal) => {
                let error = SessionError::from(refusal);
                debug!(error = %error, "selection refused");
                self.notify(requester, &error.requester_message()).await;
                return Err(error);
            }
        };
        let slot = ActiveSlot {
            store: &self.store,
            requester,
            settled: false,
        };

        let result = self.acquire(requester, &pending, variant_id, &cancel).await;

        let outcome = Outcome::of(&result);
        slot.settle(outcome);
        match &result {
            Ok(ack) => {
                info!(reference = %ack.reference, "artifact delivered");
                self.notify(requester, "File sent!").await;
            }
            Err(error) => {
                info!(?outcome, error = %error, "download attempt ended");
                self.notify(requester, &error.requester_message()).await;
            }
        }
        result
    }

    /// Cancels the requester's in-flight download and drops any pending
    /// locator. Returns true if a download was running.
    #[instrument(skip(self), fields(requester = %requester))]
    pub fn cancel(&self, requester: &RequesterId) -> bool {
        let cancelled = self.store.cancel(requester);
        if cancelled {
            info!("cancellation requested");
        }
        cancelled
    }

    async fn acquire(
        &self,
        requester: &RequesterId,
        pending: &PendingLocator,
        variant_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DeliveryAck, SessionError> {
        let ceiling = self.catalog.ceiling();

        // Listed sizes are re-checked here: the requester may name a rejected id directly.
        let Some((variant, bucket)) = pending.catalog.find(variant_id) else {
            return Err(SessionError::UnknownVariant {
                variant_id: variant_id.to_string(),
            });
        };
        if bucket == Bucket::Rejected || !ceiling.admits(variant.size_bytes) {
            return Err(SessionError::too_large(
                variant_id,
                variant.size_bytes.unwrap_or_default(),
                ceiling,
            ));
        }

        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::Cancelled),
            permit = Arc::clone(&self.admission).acquire_owned() => permit
                .map_err(|_| SessionError::download_failed("download admission closed"))?,
        };

        self.notify(requester, "Starting download...").await;

        let workspace = ArtifactWorkspace::create(&self.work_dir, requester.as_str())
            .await
            .map_err(|e| SessionError::download_failed(format!("cannot create work directory: {e}")))?;

        let request = DownloadRequest {
            locator: pending.locator.clone(),
            variant_id: variant_id.to_string(),
            dest_dir: workspace.path().to_path_buf(),
        };

        let (path, size_bytes) = match self.fetch(requester, &request, cancel).await {
            Ok(fetched) => fetched,
            Err(error) => {
                release_workspace(workspace).await;
                return Err(error);
            }
        };

        if !path.starts_with(workspace.path()) {
            warn!(path = %path.display(), "download landed outside its workspace; removing");
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to remove stray download");
            }
            release_workspace(workspace).await;
            return Err(SessionError::download_failed(
                "download was written outside its work directory",
            ));
        }

        if size_bytes > ceiling.bytes() {
            warn!(size_bytes, ceiling = ceiling.bytes(), "downloaded file exceeds ceiling");
            release_workspace(workspace).await;
            return Err(SessionError::too_large(variant_id, size_bytes, ceiling));
        }

        self.notify(requester, "Download finished. Sending file...").await;

        // A cancel accepted while the notification was in flight still wins.
        if cancel.is_cancelled() {
            debug!("cancelled before delivery");
            release_workspace(workspace).await;
            return Err(SessionError::Cancelled);
        }

        let artifact = Artifact::new(
            workspace,
            path,
            size_bytes,
            variant_id,
            pending.catalog.title.clone(),
        );
        self.gate
            .deliver(requester, artifact)
            .await
            .map_err(|source| SessionError::DeliveryFailed { source })
    }

    /// Runs the download capability with progress relayed to the requester,
    /// then measures the stored file.
    async fn fetch(
        &self,
        requester: &RequesterId,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, u64), SessionError> {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let relay = tokio::spawn(relay_progress(
            Arc::clone(&self.transport),
            requester.clone(),
            progress_rx,
        ));

        let downloaded = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ExtractError::Cancelled),
            result = self.extractor.download(request, progress_tx, cancel.clone()) => result,
        };

        // The sender is gone once the download future is, so the relay drains and exits.
        match relay.await {
            Ok(sent) => debug!(milestones = sent, "progress relay finished"),
            Err(e) => warn!(error = %e, "progress relay task failed"),
        }

        let media = downloaded.map_err(|e| {
            if e.is_cancelled() {
                SessionError::Cancelled
            } else {
                SessionError::download_failed(e.to_string())
            }
        })?;

        let size_bytes = tokio::fs::metadata(&media.path)
            .await
            .map_err(|e| {
                SessionError::download_failed(format!(
                    "downloaded file not found at {}: {e}",
                    media.path.display()
                ))
            })?
            .len();

        if media.reported_size.is_some_and(|reported| reported != size_bytes) {
            debug!(
                reported = ?media.reported_size,
                measured = size_bytes,
                "reported size differs from stored size"
            );
        }
        info!(path = %media.path.display(), size_bytes, "download stored");
        Ok((media.path, size_bytes))
    }

    async fn notify(&self, requester: &RequesterId, text: &str) {
        if let Err(e) = self.transport.notify(requester, text).await {
            warn!(requester = %requester, error = %e, "failed to send notification");
        }
    }
}

/// Drains raw progress events through a [`ProgressThrottle`] and forwards
/// each milestone. Returns the number of milestones sent.
async fn relay_progress(
    transport: Arc<dyn Transport>,
    requester: RequesterId,
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
) -> usize {
    let mut throttle = ProgressThrottle::new();
    let mut sent = 0;
    while let Some(event) = events.recv().await {
        let Some(milestone) = throttle.observe(&event) else {
            continue;
        };
        match transport.notify(&requester, &format_milestone(&milestone)).await {
            Ok(()) => sent += 1,
            Err(e) => warn!(requester = %requester, error = %e, "failed to send progress"),
        }
    }
    sent
}

async fn release_workspace(workspace: ArtifactWorkspace) {
    let dir = workspace.path().to_path_buf();
    if let Err(e) = workspace.release().await {
        warn!(dir = %dir.display(), error = %e, "failed to release artifact workspace");
    }
}
