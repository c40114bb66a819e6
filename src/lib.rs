//! Mediafetch Core Library
//!
//! This library provides the acquisition session engine behind the
//! `mediafetch` tool: a requester submits a media locator, picks one of the
//! encoding variants that fit under the delivery size ceiling, and receives
//! the downloaded file with live progress along the way.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`extract`] - Extraction/download capability contract and the `yt-dlp` adapter
//! - [`catalog`] - Variant listing and size-ceiling classification
//! - [`progress`] - Decile milestone throttling of raw progress events
//! - [`session`] - Per-requester state machine and keyed session store
//! - [`artifact`] - Per-download scratch storage with guaranteed release
//! - [`delivery`] - Hand-off of finished artifacts to the transport
//! - [`transport`] - Transport boundary, message rendering, console transport
//! - [`config`] - Engine configuration and validation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod delivery;
pub mod extract;
pub mod progress;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use artifact::{Artifact, ArtifactWorkspace};
pub use catalog::{Bucket, CatalogResult, SizeCeiling, Variant, VariantCatalog};
pub use config::{ConfigError, DEFAULT_CEILING_BYTES, DEFAULT_MAX_CONCURRENT_DOWNLOADS, EngineConfig};
pub use delivery::DeliveryGate;
pub use extract::{
    DownloadRequest, DownloadedMedia, ExtractError, MediaExtractor, MediaInfo, ProgressEvent,
    RawVariant, YtDlpExtractor,
};
pub use progress::{Milestone, ProgressThrottle};
pub use session::{AcquisitionSession, Outcome, RequesterId, SessionError, SessionState, SessionStore};
pub use transport::{ConsoleTransport, DeliveryAck, Transport, TransportError};
