//! Scratch directory lifecycle
//!
//! Every candidate is graded inside one scratch directory that holds the
//! extracted sources, the compiled artifacts, and the produced outputs. The
//! directory is wiped when acquired, so nothing leaks from the previous
//! candidate, and removed on release or drop.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors that occur while managing the work directory
#[derive(Debug, Error)]
pub enum WorkDirError {
    #[error("failed to reset work directory {path}: {source}")]
    Reset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove work directory {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Join `name` onto `root`, rejecting absolute paths and traversal
pub fn checked_join(root: &Path, name: &str) -> Result<PathBuf, WorkDirError> {
    let traversal = Path::new(name)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir));
    if traversal || name.starts_with('/') || Path::new(name).is_absolute() {
        return Err(WorkDirError::InvalidPath(format!(
            "path traversal not allowed: {name}"
        )));
    }
    Ok(root.join(name))
}

/// A freshly created scratch directory owned by one grading run
///
/// # Cleanup
///
/// Call [`release()`](Self::release) when done. Dropping an unreleased
/// `WorkDir` removes the directory synchronously, so early returns and
/// panics still leave a clean slate for the next candidate. Call
/// [`keep()`](Self::keep) to leave the contents in place for inspection.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    active: bool,
}

impl WorkDir {
    /// Wipe and recreate the directory at `path`
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn acquire(path: impl AsRef<Path>) -> Result<Self, WorkDirError> {
        let path = path.as_ref().to_path_buf();

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => debug!("removed previous work directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(WorkDirError::Reset { path, source }),
        }
        if let Err(source) = tokio::fs::create_dir_all(&path).await {
            return Err(WorkDirError::Reset { path, source });
        }

        // Children run with this as their working directory; keep it absolute
        let path = tokio::fs::canonicalize(&path)
            .await
            .map_err(|source| WorkDirError::Reset {
                path: path.clone(),
                source,
            })?;

        debug!(?path, "work directory ready");
        Ok(Self { path, active: true })
    }

    /// Get the path of the directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path to a file inside the directory
    ///
    /// Returns an error if the name is absolute or contains `..`.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkDirError> {
        checked_join(&self.path, name)
    }

    /// Write a file into the directory
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), WorkDirError> {
        let path = self.file_path(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to work directory");
        Ok(())
    }

    /// Read a file from the directory
    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, WorkDirError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Check if a file exists in the directory
    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkDirError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Remove the directory
    #[must_use = "removal errors should be handled"]
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn release(mut self) -> Result<(), WorkDirError> {
        self.active = false;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                debug!("work directory removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkDirError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Leave the directory and its contents in place
    pub fn keep(mut self) -> PathBuf {
        self.active = false;
        std::mem::take(&mut self.path)
    }

    /// Check if the directory is still owned (not yet released or kept)
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if !self.active {
            return;
        }

        debug!(path = %self.path.display(), "work directory dropped without release, removing");
        if let Err(e) = std::fs::remove_dir_all(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove work directory");
        }
    }
}
