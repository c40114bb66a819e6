//! Boundary between the session engine and the chat/message transport.
//!
//! The engine only ever issues three calls on the transport: plain
//! notifications, catalog rendering and final artifact delivery. Parsing of
//! incoming messages stays on the transport side; [`console`] holds the
//! line-oriented command parser used by the `mediafetch` binary.

pub mod console;
pub mod render;

pub use console::{Command, ConsoleTransport, parse_command};

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::artifact::Artifact;
use crate::catalog::CatalogResult;
use crate::session::RequesterId;

/// Errors reported by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport refused the message or file.
    #[error("transport rejected the request: {reason}")]
    Rejected {
        /// Reason given by the transport.
        reason: String,
    },

    /// Local IO failed while writing a message or copying a file.
    #[error("transport IO error at {path}: {source}")]
    Io {
        /// Path (or stream name) where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Acknowledgement returned by a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAck {
    /// Transport-specific reference to the delivered file (message id, path, ...).
    pub reference: String,
}

impl DeliveryAck {
    /// Creates an acknowledgement.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

/// Outbound operations the engine issues against the transport.
///
/// # Object Safety
///
/// Uses `async_trait` so the engine can hold an `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a text notification to the requester.
    async fn notify(&self, requester: &RequesterId, text: &str) -> Result<(), TransportError>;

    /// Shows the classified variant listing to the requester.
    async fn render_catalog(
        &self,
        requester: &RequesterId,
        catalog: &CatalogResult,
    ) -> Result<(), TransportError>;

    /// Sends the finished file to the requester.
    async fn deliver_artifact(
        &self,
        requester: &RequesterId,
        artifact: &Artifact,
    ) -> Result<DeliveryAck, TransportError>;
}
