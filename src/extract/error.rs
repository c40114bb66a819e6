//! Error types for the extraction capability.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by a [`MediaExtractor`](super::MediaExtractor).
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The locator is not a reference the extractor understands.
    #[error("unsupported locator: {locator}")]
    UnsupportedLocator {
        /// The rejected locator.
        locator: String,
    },

    /// Extraction succeeded but offered no downloadable variants.
    #[error("no variants available for {locator}")]
    NoVariants {
        /// The locator that produced an empty listing.
        locator: String,
    },

    /// The external tool could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The external tool exited unsuccessfully.
    #[error("{program} exited with status {status}: {stderr}")]
    ToolFailed {
        /// Program that failed.
        program: String,
        /// Exit code, or -1 when killed by a signal.
        status: i32,
        /// Trailing diagnostic output from the tool.
        stderr: String,
    },

    /// The tool's metadata output could not be parsed.
    #[error("could not parse metadata for {locator}: {source}")]
    Parse {
        /// The locator being extracted.
        locator: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The download finished but the produced file could not be located.
    #[error("download produced no output file in {dir}")]
    MissingOutput {
        /// Directory that was expected to contain the file.
        dir: PathBuf,
    },

    /// The download was stopped by a cancellation request.
    #[error("download cancelled")]
    Cancelled,
}

impl ExtractError {
    /// Creates an unsupported-locator error.
    pub fn unsupported(locator: impl Into<String>) -> Self {
        Self::UnsupportedLocator {
            locator: locator.into(),
        }
    }

    /// Creates a no-variants error.
    pub fn no_variants(locator: impl Into<String>) -> Self {
        Self::NoVariants {
            locator: locator.into(),
        }
    }

    /// Creates a spawn error.
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Creates a tool failure error.
    pub fn tool_failed(program: impl Into<String>, status: i32, stderr: impl Into<String>) -> Self {
        Self::ToolFailed {
            program: program.into(),
            status,
            stderr: stderr.into(),
        }
    }

    /// Creates a metadata parse error.
    pub fn parse(locator: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Parse {
            locator: locator.into(),
            source,
        }
    }

    /// Creates a missing-output error.
    pub fn missing_output(dir: impl Into<PathBuf>) -> Self {
        Self::MissingOutput { dir: dir.into() }
    }

    /// Returns true when the error is the result of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display_contains_locator() {
        let msg = ExtractError::unsupported("ftp://example.com/a").to_string();
        assert!(msg.contains("unsupported locator"), "got: {msg}");
        assert!(msg.contains("ftp://example.com/a"), "got: {msg}");
    }

    #[test]
    fn test_tool_failed_display_contains_status_and_stderr() {
        let msg = ExtractError::tool_failed("yt-dlp", 1, "ERROR: Video unavailable").to_string();
        assert!(msg.contains("yt-dlp"), "got: {msg}");
        assert!(msg.contains("status 1"), "got: {msg}");
        assert!(msg.contains("Video unavailable"), "got: {msg}");
    }

    #[test]
    fn test_is_cancelled() {
        assert!(ExtractError::Cancelled.is_cancelled());
        assert!(!ExtractError::no_variants("x").is_cancelled());
    }
}
