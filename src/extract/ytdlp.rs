//! [`MediaExtractor`] adapter for the external `yt-dlp` executable.
//!
//! Metadata comes from `yt-dlp -J`, parsed with `serde_json`. Downloads run
//! with a custom `--progress-template` so every progress tick arrives on
//! stdout as one machine-readable line, and `--print after_move:filepath`
//! reports where the finished file was stored.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use super::{DownloadRequest, DownloadedMedia, ExtractError, MediaExtractor, MediaInfo, RawVariant};
use crate::progress::ProgressEvent;

/// Program name looked up on `PATH` when no explicit path is configured.
pub const DEFAULT_YTDLP_PROGRAM: &str = "yt-dlp";

/// Marker that prefixes progress lines produced by our progress template.
const PROGRESS_MARKER: &str = "mediafetch-progress";

/// Number of trailing stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 5;

/// Consecutive pipe read failures tolerated before a stream is abandoned.
const MAX_CONSECUTIVE_READ_ERRORS: usize = 3;

/// Output file name template, relative to the download directory.
const OUTPUT_TEMPLATE: &str = "%(title).80B [%(id)s].%(ext)s";

/// Extractor backed by the `yt-dlp` command line tool.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: String,
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpExtractor {
    /// Creates an extractor that runs `yt-dlp` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(DEFAULT_YTDLP_PROGRAM)
    }

    /// Creates an extractor that runs the given program.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the program this extractor invokes.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    #[instrument(skip(self), fields(program = %self.program))]
    async fn extract(&self, locator: &str) -> Result<MediaInfo, ExtractError> {
        let url = validate_locator(locator)?;
        debug!("requesting metadata");

        let output = self
            .command()
            .args(["-J", "--no-playlist", "--no-warnings", "--"])
            .arg(url.as_str())
            .output()
            .await
            .map_err(|e| ExtractError::spawn(&self.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::tool_failed(
                &self.program,
                output.status.code().unwrap_or(-1),
                tail_lines(&stderr, STDERR_TAIL_LINES),
            ));
        }

        let info = parse_media_info(locator, &output.stdout)?;
        info!(variants = info.variants.len(), "metadata extracted");
        Ok(info)
    }

    #[instrument(skip(self, progress, cancel), fields(program = %self.program, locator = %request.locator, variant_id = %request.variant_id))]
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: mpsc::UnboundedSender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Result<DownloadedMedia, ExtractError> {
        let url = validate_locator(&request.locator)?;

        let mut child = self
            .command()
            .arg("-f")
            .arg(&request.variant_id)
            .args(["--no-playlist", "--newline", "--no-simulate", "--progress"])
            .arg("--progress-template")
            .arg(progress_template())
            .args(["--print", "after_move:filepath", "-o"])
            .arg(request.dest_dir.join(OUTPUT_TEMPLATE))
            .arg("--")
            .arg(url.as_str())
            .spawn()
            .map_err(|e| ExtractError::spawn(&self.program, e))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ExtractError::spawn(
                &self.program,
                std::io::Error::other("child stdio was not captured"),
            ));
        };
        // `--print` may route progress to stderr, so that stream is scanned too.
        let mut stderr_task = AbortOnDrop(tokio::spawn(collect_tail(stderr, progress.clone())));

        let mut lines = LossyLines::new(stdout);
        let mut stored_path: Option<PathBuf> = None;
        let mut last_event: Option<ProgressEvent> = None;

        loop {
            let line = tokio::select! {
                () = cancel.cancelled() => {
                    debug!("cancellation requested; stopping yt-dlp");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill yt-dlp after cancellation");
                    }
                    return Err(ExtractError::Cancelled);
                }
                line = lines.next_line() => line,
            };

            let Some(line) = line else {
                break;
            };

            if let Some(event) = parse_progress_line(&line) {
                trace!(downloaded = event.downloaded_bytes, total = ?event.total_bytes, "progress");
                last_event = Some(event);
                // Receiver may already be gone; progress is best-effort.
                let _ = progress.send(event);
            } else if !line.trim().is_empty() {
                stored_path = Some(PathBuf::from(line.trim()));
            }
        }

        let waited = tokio::select! {
            () = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };
        let Some(status) = waited else {
            let _ = child.kill().await;
            return Err(ExtractError::Cancelled);
        };
        let status = status.map_err(|e| ExtractError::spawn(&self.program, e))?;
        let stderr_tail = (&mut stderr_task.0).await.unwrap_or_default();

        if !status.success() {
            return Err(ExtractError::tool_failed(
                &self.program,
                status.code().unwrap_or(-1),
                stderr_tail,
            ));
        }

        let path = match stored_path {
            Some(path) => path,
            None => find_output_file(&request.dest_dir)
                .await
                .ok_or_else(|| ExtractError::missing_output(&request.dest_dir))?,
        };

        let reported_size = last_event.and_then(|e| e.total_bytes.or(Some(e.downloaded_bytes)));
        info!(path = %path.display(), ?reported_size, "yt-dlp download finished");

        Ok(DownloadedMedia {
            path,
            reported_size,
        })
    }
}

/// Line reader over a child pipe that tolerates non-UTF-8 output.
///
/// The pipe must be drained to EOF or yt-dlp blocks on a full buffer, so bad
/// bytes are replaced and transient read errors are skipped.
struct LossyLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    errors: usize,
}

impl<R: AsyncRead + Unpin> LossyLines<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            errors: 0,
        }
    }

    /// Next line without its terminator, or `None` at EOF.
    async fn next_line(&mut self) -> Option<String> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => return None,
                Ok(_) => {
                    self.errors = 0;
                    let line = String::from_utf8_lossy(&self.buf);
                    return Some(line.trim_end_matches(['\r', '\n']).to_string());
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.errors += 1;
                    warn!(error = %e, attempt = self.errors, "failed to read yt-dlp output");
                    if self.errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        return None;
                    }
                }
            }
        }
    }
}

/// Aborts the stderr reader on drop. A grandchild (ffmpeg) may hold the pipe
/// open after yt-dlp is killed.
struct AbortOnDrop(JoinHandle<String>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Checks that the locator is an absolute http(s) URL with a host.
pub(crate) fn validate_locator(locator: &str) -> Result<Url, ExtractError> {
    let trimmed = locator.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::unsupported(locator));
    }
    let url = Url::parse(trimmed).map_err(|_| ExtractError::unsupported(locator))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ExtractError::unsupported(locator));
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    #[serde(default)]
    formats: Vec<FormatJson>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
    format_id: String,
    ext: Option<String>,
    format_note: Option<String>,
    resolution: Option<String>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

impl FormatJson {
    fn into_raw_variant(self) -> RawVariant {
        let label = self
            .format_note
            .filter(|note| !note.is_empty())
            .or(self.resolution)
            .unwrap_or_else(|| "N/A".to_string());
        let size_bytes = self
            .filesize
            .or(self.filesize_approx)
            .and_then(bytes_from_number);
        RawVariant::new(
            self.format_id,
            self.ext.unwrap_or_else(|| "unknown".to_string()),
            label,
            size_bytes,
        )
    }
}

fn parse_media_info(locator: &str, raw: &[u8]) -> Result<MediaInfo, ExtractError> {
    let info: InfoJson =
        serde_json::from_slice(raw).map_err(|e| ExtractError::parse(locator, e))?;
    if info.formats.is_empty() {
        return Err(ExtractError::no_variants(locator));
    }
    Ok(MediaInfo {
        title: info.title,
        variants: info
            .formats
            .into_iter()
            .map(FormatJson::into_raw_variant)
            .collect(),
    })
}

fn progress_template() -> String {
    format!(
        "download:{PROGRESS_MARKER} %(progress.downloaded_bytes)s %(progress.total_bytes)s \
         %(progress.total_bytes_estimate)s %(progress.speed)s"
    )
}

/// Parses one line produced by [`progress_template`]. yt-dlp prints `NA` for
/// fields it does not know.
fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace();
    let downloaded = fields.next().and_then(parse_number)?;
    let total = fields.next().and_then(parse_number);
    let estimate = fields.next().and_then(parse_number);
    let speed = fields.next().and_then(parse_number);

    Some(ProgressEvent::new(
        bytes_from_number(downloaded)?,
        total.or(estimate).and_then(bytes_from_number),
        speed,
    ))
}

fn parse_number(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bytes_from_number(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0).then(|| value.round() as u64)
}

async fn collect_tail<R: AsyncRead + Unpin>(
    reader: R,
    progress: mpsc::UnboundedSender<ProgressEvent>,
) -> String {
    let mut lines = LossyLines::new(reader);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Some(line) = lines.next_line().await {
        if let Some(event) = parse_progress_line(&line) {
            let _ = progress.send(event);
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}

/// Picks the largest finished file in `dir`, ignoring yt-dlp scratch files.
async fn find_output_file(dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut best: Option<(u64, PathBuf)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_scratch = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext, "part" | "ytdl" | "temp"));
        if is_scratch {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if meta.is_file() && best.as_ref().is_none_or(|(len, _)| meta.len() > *len) {
            best = Some((meta.len(), path));
        }
    }
    best.map(|(_, path)| path)
}
