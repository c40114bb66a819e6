//! Engine configuration.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::{MIB, SizeCeiling};

/// Default delivery ceiling (50 MB, the chat platform's bot upload limit).
pub const DEFAULT_CEILING_BYTES: u64 = 50 * MIB;

/// Default number of downloads allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 4;

/// Minimum allowed download admission limit.
const MIN_CONCURRENT_DOWNLOADS: usize = 1;

/// Maximum allowed download admission limit.
const MAX_CONCURRENT_DOWNLOADS: usize = 32;

/// Error type for invalid engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A zero ceiling would reject every file.
    #[error("delivery ceiling must be greater than zero")]
    ZeroCeiling,

    /// Admission limit out of range.
    #[error(
        "invalid max concurrent downloads {value}: must be between {MIN_CONCURRENT_DOWNLOADS} and {MAX_CONCURRENT_DOWNLOADS}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The scratch directory path is empty.
    #[error("work directory must not be empty")]
    EmptyWorkDir,
}

/// Settings consumed by [`AcquisitionSession`](crate::session::AcquisitionSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum artifact size eligible for delivery.
    pub ceiling: SizeCeiling,
    /// Root directory for per-download scratch workspaces.
    pub work_dir: PathBuf,
    /// Downloads allowed to run at once across all requesters.
    pub max_concurrent_downloads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ceiling: SizeCeiling::new(DEFAULT_CEILING_BYTES),
            work_dir: std::env::temp_dir().join("mediafetch"),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ceiling.bytes() == 0 {
            return Err(ConfigError::ZeroCeiling);
        }
        if !(MIN_CONCURRENT_DOWNLOADS..=MAX_CONCURRENT_DOWNLOADS)
            .contains(&self.max_concurrent_downloads)
        {
            return Err(ConfigError::InvalidConcurrency {
                value: self.max_concurrent_downloads,
            });
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyWorkDir);
        }
        Ok(())
    }
}
