//! Scripted extractor and recording transport shared by integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mediafetch_core::{
    AcquisitionSession, Artifact, CatalogResult, DeliveryAck, DownloadRequest, DownloadedMedia,
    EngineConfig, ExtractError, MediaExtractor, MediaInfo, ProgressEvent, RawVariant,
    RequesterId, SizeCeiling, Transport, TransportError,
};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

pub const MIB: u64 = 1024 * 1024;

/// What a scripted download does after emitting its progress events.
#[derive(Debug, Clone)]
pub enum DownloadBehavior {
    /// Writes a file of `file_size` bytes and returns it.
    Complete,
    /// Writes a partial file, then blocks until cancelled.
    WaitForCancel,
    /// Writes a partial file, then fails with the given tool stderr.
    Fail(String),
    /// Writes the file into the given directory instead of `dest_dir`.
    EscapeTo(PathBuf),
    /// Writes a partial file, then hangs without watching the token.
    IgnoreCancel,
}

/// Extractor that replays a fixed listing and a scripted download.
pub struct ScriptedExtractor {
    title: Option<String>,
    variants: Vec<RawVariant>,
    progress: Vec<ProgressEvent>,
    file_size: u64,
    reported_size: Option<u64>,
    behavior: DownloadBehavior,
    fail_extract: AtomicBool,
    pub extract_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub started: Notify,
    last_dest: Mutex<Option<PathBuf>>,
}

impl ScriptedExtractor {
    /// Scenario A listing: `18` at 30 MB and `22` at 80 MB.
    pub fn scenario() -> Self {
        Self {
            title: Some("Sample clip".to_string()),
            variants: vec![
                RawVariant::new("18", "mp4", "360p", Some(30 * MIB)),
                RawVariant::new("22", "mp4", "720p", Some(80 * MIB)),
            ],
            progress: Vec::new(),
            file_size: 1024,
            reported_size: Some(1024),
            behavior: DownloadBehavior::Complete,
            fail_extract: AtomicBool::new(false),
            extract_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            started: Notify::new(),
            last_dest: Mutex::new(None),
        }
    }

    pub fn with_behavior(mut self, behavior: DownloadBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_progress(mut self, progress: Vec<ProgressEvent>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_file_size(mut self, file_size: u64, reported_size: Option<u64>) -> Self {
        self.file_size = file_size;
        self.reported_size = reported_size;
        self
    }

    pub fn failing(self) -> Self {
        self.fail_extract.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail_extract.store(fail, Ordering::SeqCst);
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn last_dest(&self) -> Option<PathBuf> {
        self.last_dest.lock().unwrap().clone()
    }
}

async fn write_sized(path: &Path, size: u64) {
    let file = tokio::fs::File::create(path).await.unwrap();
    file.set_len(size).await.unwrap();
}

#[async_trait]
impl MediaExtractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(&self, locator: &str) -> Result<MediaInfo, ExtractError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_extract.load(Ordering::SeqCst) {
            return Err(ExtractError::tool_failed(
                "scripted",
                1,
                format!("ERROR: Private video {locator}"),
            ));
        }
        Ok(MediaInfo {
            title: self.title.clone(),
            variants: self.variants.clone(),
        })
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        progress: mpsc::UnboundedSender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Result<DownloadedMedia, ExtractError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_dest.lock().unwrap() = Some(request.dest_dir.clone());

        for event in &self.progress {
            let _ = progress.send(*event);
        }

        let name = format!("clip [{}].mp4", request.variant_id);
        match &self.behavior {
            DownloadBehavior::Complete => {
                let path = request.dest_dir.join(name);
                write_sized(&path, self.file_size).await;
                self.started.notify_one();
                Ok(DownloadedMedia {
                    path,
                    reported_size: self.reported_size,
                })
            }
            DownloadBehavior::WaitForCancel => {
                write_sized(&request.dest_dir.join(format!("{name}.part")), 512).await;
                self.started.notify_one();
                cancel.cancelled().await;
                Err(ExtractError::Cancelled)
            }
            DownloadBehavior::Fail(stderr) => {
                write_sized(&request.dest_dir.join(format!("{name}.part")), 512).await;
                self.started.notify_one();
                Err(ExtractError::tool_failed("scripted", 1, stderr.clone()))
            }
            DownloadBehavior::IgnoreCancel => {
                write_sized(&request.dest_dir.join(format!("{name}.part")), 512).await;
                self.started.notify_one();
                std::future::pending::<()>().await;
                Err(ExtractError::Cancelled)
            }
            DownloadBehavior::EscapeTo(dir) => {
                let path = dir.join(name);
                write_sized(&path, self.file_size).await;
                self.started.notify_one();
                Ok(DownloadedMedia {
                    path,
                    reported_size: self.reported_size,
                })
            }
        }
    }
}

/// Record of one delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub requester: RequesterId,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub existed: bool,
}

/// Transport that records every message and delivery.
#[derive(Default)]
pub struct RecordingTransport {
    messages: Mutex<Vec<(RequesterId, String)>>,
    catalogs: Mutex<Vec<(RequesterId, usize)>>,
    deliveries: Mutex<Vec<DeliveryRecord>>,
    pub fail_notify: bool,
    pub fail_delivery: bool,
    pause_on: Option<String>,
    /// Signalled when a notification matching `pause_on` arrives.
    pub paused: Notify,
    /// Lets the paused notification return.
    pub resume: Notify,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_notify() -> Self {
        Self {
            fail_notify: true,
            ..Self::default()
        }
    }

    pub fn failing_delivery() -> Self {
        Self {
            fail_delivery: true,
            ..Self::default()
        }
    }

    /// Blocks inside `notify` for `text` until [`Self::resume`] is signalled.
    pub fn pausing_on(text: &str) -> Self {
        Self {
            pause_on: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn texts(&self, requester: &RequesterId) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(who, _)| who == requester)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn milestones(&self, requester: &RequesterId) -> Vec<String> {
        self.texts(requester)
            .into_iter()
            .filter(|text| text.starts_with("Downloading:"))
            .collect()
    }

    pub fn catalogs_rendered(&self) -> usize {
        self.catalogs.lock().unwrap().len()
    }

    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn notify(&self, requester: &RequesterId, text: &str) -> Result<(), TransportError> {
        self.messages
            .lock()
            .unwrap()
            .push((requester.clone(), text.to_string()));
        if self.pause_on.as_deref() == Some(text) {
            self.paused.notify_one();
            self.resume.notified().await;
        }
        if self.fail_notify {
            return Err(TransportError::rejected("chat unavailable"));
        }
        Ok(())
    }

    async fn render_catalog(
        &self,
        requester: &RequesterId,
        catalog: &CatalogResult,
    ) -> Result<(), TransportError> {
        self.catalogs
            .lock()
            .unwrap()
            .push((requester.clone(), catalog.len()));
        Ok(())
    }

    async fn deliver_artifact(
        &self,
        requester: &RequesterId,
        artifact: &Artifact,
    ) -> Result<DeliveryAck, TransportError> {
        self.deliveries.lock().unwrap().push(DeliveryRecord {
            requester: requester.clone(),
            path: artifact.path().to_path_buf(),
            size_bytes: artifact.size_bytes(),
            existed: artifact.path().exists(),
        });
        if self.fail_delivery {
            return Err(TransportError::rejected("file rejected by chat"));
        }
        Ok(DeliveryAck::new(format!("msg-{}", artifact.variant_id())))
    }
}

/// Engine with a 50 MB ceiling writing under `work_dir`.
pub fn engine(
    extractor: &Arc<ScriptedExtractor>,
    transport: &Arc<RecordingTransport>,
    work_dir: &Path,
    max_concurrent_downloads: usize,
) -> AcquisitionSession {
    let config = EngineConfig {
        ceiling: SizeCeiling::from_mib(50),
        work_dir: work_dir.to_path_buf(),
        max_concurrent_downloads,
    };
    let extractor: Arc<dyn MediaExtractor> = extractor.clone();
    let transport: Arc<dyn Transport> = transport.clone();
    AcquisitionSession::new(&config, extractor, transport).unwrap()
}

/// Number of entries left under `dir` (0 when every workspace was released).
pub fn entries(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(read) => read.count(),
        Err(_) => 0,
    }
}

/// Percent progress event against a 100-byte total.
pub fn pct(percent: u64) -> ProgressEvent {
    ProgressEvent::new(percent, Some(100), Some(2.0 * MIB as f64))
}
