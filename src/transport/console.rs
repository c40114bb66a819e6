//! Line-oriented console transport used by the `mediafetch` binary.
//!
//! Messages are written to any async writer (stdout in the binary), and
//! delivered artifacts are copied into an output directory before the
//! engine releases the scratch copy.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::render::{DOWNLOAD_COMMAND_PREFIX, format_catalog};
use super::{DeliveryAck, Transport, TransportError};
use crate::artifact::Artifact;
use crate::catalog::CatalogResult;
use crate::session::RequesterId;

/// Matches the first http(s) URL in a message.
#[allow(clippy::expect_used)]
static LOCATOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"']+"#).expect("locator regex is valid") // Static pattern, safe to panic
});

/// A command typed by the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start` or `/help`.
    Start,
    /// A message containing a media locator.
    Submit(String),
    /// `/download_<id>`.
    Select(String),
    /// `/cancel`.
    Cancel,
    /// Anything else.
    Unknown(String),
}

/// Parses one input line. Blank lines yield `None`.
#[must_use]
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let command = match line {
        "/start" | "/help" => Command::Start,
        "/cancel" => Command::Cancel,
        _ => {
            if let Some(id) = line.strip_prefix(DOWNLOAD_COMMAND_PREFIX) {
                let id = id.trim();
                if id.is_empty() {
                    Command::Unknown(line.to_string())
                } else {
                    Command::Select(id.to_string())
                }
            } else if let Some(found) = LOCATOR_PATTERN.find(line) {
                Command::Submit(found.as_str().trim_end_matches(['.', ',', ')', ']']).to_string())
            } else {
                Command::Unknown(line.to_string())
            }
        }
    };
    Some(command)
}

/// [`Transport`] that prints to a writer and copies files to a directory.
#[derive(Debug)]
pub struct ConsoleTransport<W> {
    out: Mutex<W>,
    output_dir: PathBuf,
}

impl ConsoleTransport<Stdout> {
    /// Creates a transport writing to stdout.
    #[must_use]
    pub fn stdout(output_dir: impl Into<PathBuf>) -> Self {
        Self::new(tokio::io::stdout(), output_dir)
    }
}

impl<W> ConsoleTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a transport writing to `out` and delivering into `output_dir`.
    pub fn new(out: W, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            out: Mutex::new(out),
            output_dir: output_dir.into(),
        }
    }

    /// Directory that receives delivered files.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Consumes the transport, returning the writer.
    pub fn into_writer(self) -> W {
        self.out.into_inner()
    }

    async fn write_message(&self, requester: &RequesterId, text: &str) -> Result<(), TransportError> {
        let mut out = self.out.lock().await;
        let message = format!("[{requester}] {text}\n");
        out.write_all(message.as_bytes())
            .await
            .map_err(|e| TransportError::io("<console>", e))?;
        out.flush()
            .await
            .map_err(|e| TransportError::io("<console>", e))
    }
}

#[async_trait]
impl<W> Transport for ConsoleTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn notify(&self, requester: &RequesterId, text: &str) -> Result<(), TransportError> {
        self.write_message(requester, text).await
    }

    async fn render_catalog(
        &self,
        requester: &RequesterId,
        catalog: &CatalogResult,
    ) -> Result<(), TransportError> {
        self.write_message(requester, &format_catalog(catalog)).await
    }

    async fn deliver_artifact(
        &self,
        requester: &RequesterId,
        artifact: &Artifact,
    ) -> Result<DeliveryAck, TransportError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| TransportError::io(&self.output_dir, e))?;

        let name = artifact.file_name().unwrap_or("download.bin");
        let dest = resolve_unique_path(&self.output_dir, name);
        debug!(from = %artifact.path().display(), to = %dest.display(), "copying artifact");

        tokio::fs::copy(artifact.path(), &dest)
            .await
            .map_err(|e| TransportError::io(&dest, e))?;

        info!(requester = %requester, path = %dest.display(), "artifact delivered");
        self.write_message(requester, &format!("Saved to {}", dest.display()))
            .await?;
        Ok(DeliveryAck::new(dest.display().to_string()))
    }
}

/// Returns `dir/filename`, or `dir/stem_N.ext` when that already exists.
fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let base = dir.join(filename);
    if !base.exists() {
        return base;
    }
    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    };
    (2..)
        .map(|i| dir.join(format!("{stem}_{i}{ext}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}
