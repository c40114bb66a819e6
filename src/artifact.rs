//! Per-download scratch storage with guaranteed release.
//!
//! Every download writes into its own [`ArtifactWorkspace`] directory, so
//! releasing the workspace reclaims the finished file together with any
//! partial fragments the download tool left behind. Release happens
//! explicitly through [`ArtifactWorkspace::release`]; if a workspace is
//! dropped without being released (for example when its owning future is
//! aborted) `Drop` removes the directory synchronously.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

static WORKSPACE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Scratch directory owned by exactly one download.
#[derive(Debug)]
pub struct ArtifactWorkspace {
    dir: PathBuf,
    released: bool,
}

impl ArtifactWorkspace {
    /// Creates a fresh, uniquely named directory under `root`.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the directory cannot be created.
    pub async fn create(root: &Path, owner: &str) -> io::Result<Self> {
        let seq = WORKSPACE_SEQ.fetch_add(1, Ordering::SeqCst);
        let name = format!(
            "{}-{}-{seq}",
            sanitize_component(owner),
            std::process::id()
        );
        let dir = root.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "created artifact workspace");
        Ok(Self {
            dir,
            released: false,
        })
    }

    /// Directory that downloads must write into.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Removes the directory and everything in it.
    ///
    /// A directory that is already gone counts as released.
    ///
    /// # Errors
    ///
    /// Returns the IO error if removal fails for any other reason.
    pub async fn release(mut self) -> io::Result<()> {
        let result = match tokio::fs::remove_dir_all(&self.dir).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
        if result.is_ok() {
            debug!(dir = %self.dir.display(), "released artifact workspace");
            self.released = true;
        }
        result
    }
}

impl Drop for ArtifactWorkspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(dir = %self.dir.display(), "released artifact workspace on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "failed to release artifact workspace"),
        }
    }
}

/// A completed download, measured after it landed on storage.
#[derive(Debug)]
pub struct Artifact {
    workspace: ArtifactWorkspace,
    path: PathBuf,
    size_bytes: u64,
    variant_id: String,
    title: Option<String>,
}

impl Artifact {
    /// Wraps a downloaded file that lives inside `workspace`.
    #[must_use]
    pub fn new(
        workspace: ArtifactWorkspace,
        path: PathBuf,
        size_bytes: u64,
        variant_id: impl Into<String>,
        title: Option<String>,
    ) -> Self {
        Self {
            workspace,
            path,
            size_bytes,
            variant_id: variant_id.into(),
            title,
        }
    }

    /// Path of the stored file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size measured on storage after the download finished.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Variant the file was downloaded as.
    #[must_use]
    pub fn variant_id(&self) -> &str {
        &self.variant_id
    }

    /// Media title, if known.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// File name of the stored file.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    /// Releases the artifact's storage.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the workspace cannot be removed.
    pub async fn release(self) -> io::Result<()> {
        self.workspace.release().await
    }
}

fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "requester".to_string()
    } else {
        cleaned
    }
}
