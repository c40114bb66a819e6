//! Extraction and download capability consumed by the session engine.
//!
//! The engine never talks to a media site directly. It depends on a
//! [`MediaExtractor`] that can (a) list the encoding variants behind a locator
//! and (b) download one variant into a directory while pushing
//! [`ProgressEvent`]s onto a channel.
//!
//! # Architecture
//!
//! - [`MediaExtractor`] - Async trait implemented by capability adapters
//! - [`MediaInfo`] / [`RawVariant`] - Unclassified metadata from one extraction
//! - [`DownloadRequest`] / [`DownloadedMedia`] - Download input and result
//! - [`YtDlpExtractor`] - Adapter driving the external `yt-dlp` executable

mod error;
mod ytdlp;

pub use error::ExtractError;
pub use ytdlp::{DEFAULT_YTDLP_PROGRAM, YtDlpExtractor};

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use crate::progress::ProgressEvent;

/// One variant exactly as the extractor reported it, before size filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVariant {
    /// Identifier scoped to this extraction response.
    pub id: String,
    /// Container or file extension (e.g. `mp4`, `webm`).
    pub container: String,
    /// Human readable quality note (e.g. `720p`).
    pub label: String,
    /// Size in bytes, when known ahead of download.
    pub size_bytes: Option<u64>,
}

impl RawVariant {
    /// Creates a raw variant record.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        container: impl Into<String>,
        label: impl Into<String>,
        size_bytes: Option<u64>,
    ) -> Self {
        Self {
            id: id.into(),
            container: container.into(),
            label: label.into(),
            size_bytes,
        }
    }
}

/// Metadata returned by a single extraction call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaInfo {
    /// Title of the media, if the source provides one.
    pub title: Option<String>,
    /// Variants in the order the extractor reported them.
    pub variants: Vec<RawVariant>,
}

/// Parameters for a single variant download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Source locator.
    pub locator: String,
    /// Variant identifier from the catalog response.
    pub variant_id: String,
    /// Directory that must receive every byte the download writes.
    pub dest_dir: PathBuf,
}

/// Result of a finished download.
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    /// Path of the stored file.
    pub path: PathBuf,
    /// Size the extractor reported. Not trusted for the ceiling check.
    pub reported_size: Option<u64>,
}

/// Capability that lists and downloads media variants.
///
/// # Object Safety
///
/// This trait uses `async_trait` so the engine can hold an
/// `Arc<dyn MediaExtractor>` and tests can swap in scripted fakes.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Returns the extractor's name for logging (e.g. "yt-dlp").
    fn name(&self) -> &str;

    /// Lists the variants behind `locator`. Called once per catalog request.
    async fn extract(&self, locator: &str) -> Result<MediaInfo, ExtractError>;

    /// Downloads one variant into `request.dest_dir`.
    ///
    /// Progress is pushed onto `progress`; send failures must be ignored.
    /// When `cancel` fires the implementation stops transferring bytes and
    /// returns [`ExtractError::Cancelled`].
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: mpsc::UnboundedSender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Result<DownloadedMedia, ExtractError>;
}
