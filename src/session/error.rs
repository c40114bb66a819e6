//! Error taxonomy for acquisition sessions.
//!
//! Every variant is terminal for the current attempt and is reported to the
//! requester; none is retried automatically and none affects other sessions.

use thiserror::Error;

use super::store::BeginRefusal;
use crate::catalog::SizeCeiling;
use crate::extract::ExtractError;
use crate::transport::TransportError;
use crate::transport::render::format_size;

/// Errors surfaced by [`AcquisitionSession`](super::AcquisitionSession).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Listing the variants behind a locator failed.
    #[error("extraction failed: {source}")]
    ExtractionFailed {
        /// The extractor's error.
        #[source]
        source: ExtractError,
    },

    /// A variant was selected without a pending locator.
    #[error("no pending locator; submit a locator first")]
    NoPendingLocator,

    /// A variant was selected while another download is still running.
    #[error("a download is already in progress")]
    DownloadInProgress,

    /// The selected id is not part of the catalog response it was chosen from.
    #[error("variant {variant_id} is not in the current listing")]
    UnknownVariant {
        /// The requested variant id.
        variant_id: String,
    },

    /// The selected variant, or the downloaded file, exceeds the ceiling.
    #[error("variant {variant_id} is {size_bytes} bytes, over the {ceiling} limit")]
    VariantTooLarge {
        /// The offending variant.
        variant_id: String,
        /// Listed or measured size in bytes.
        size_bytes: u64,
        /// The delivery ceiling.
        ceiling: SizeCeiling,
    },

    /// The download capability failed.
    #[error("download failed: {reason}")]
    DownloadFailed {
        /// Failure reason reported to the requester.
        reason: String,
    },

    /// The transport refused the finished artifact.
    #[error("delivery failed: {source}")]
    DeliveryFailed {
        /// The transport's error.
        #[source]
        source: TransportError,
    },

    /// The requester cancelled the download.
    #[error("download cancelled")]
    Cancelled,
}

impl SessionError {
    /// Creates a download failure.
    pub fn download_failed(reason: impl Into<String>) -> Self {
        Self::DownloadFailed {
            reason: reason.into(),
        }
    }

    /// Creates an oversize error.
    pub fn too_large(variant_id: impl Into<String>, size_bytes: u64, ceiling: SizeCeiling) -> Self {
        Self::VariantTooLarge {
            variant_id: variant_id.into(),
            size_bytes,
            ceiling,
        }
    }

    /// Message sent to the requester for this error.
    #[must_use]
    pub fn requester_message(&self) -> String {
        match self {
            Self::ExtractionFailed { source } => format!(
                "Could not process the link. Try another video.\nError: {source}"
            ),
            Self::NoPendingLocator => "Send a video link first.".to_string(),
            Self::DownloadInProgress => {
                "A download is already running. Send /cancel to stop it.".to_string()
            }
            Self::UnknownVariant { variant_id } => format!(
                "Format #{variant_id} is not in the last listing. Send the link again."
            ),
            Self::VariantTooLarge {
                size_bytes,
                ceiling,
                ..
            } => format!(
                "The file is too large to send ({} > {ceiling}). Try a lower quality format.",
                format_size(Some(*size_bytes))
            ),
            Self::DownloadFailed { reason } => {
                format!("Download failed. Try another format.\nError: {reason}")
            }
            Self::DeliveryFailed { source } => format!("Failed to send the file: {source}"),
            Self::Cancelled => "Download cancelled.".to_string(),
        }
    }
}

impl From<BeginRefusal> for SessionError {
    fn from(refusal: BeginRefusal) -> Self {
        match refusal {
            BeginRefusal::NoPendingLocator => Self::NoPendingLocator,
            BeginRefusal::DownloadInProgress => Self::DownloadInProgress,
        }
    }
}
