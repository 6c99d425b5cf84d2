//! # Temporary Workspace
//!
//! Every optimizer run writes into a temporary file created *next to* the
//! source, so the final replace is a same-volume rename. The artifact owns
//! that path plus the `<path>.bak` sibling some tools (optipng) leave
//! behind, and removes both when released.
//!
//! Release happens through [`TempArtifact::cleanup`], which reports real
//! deletion failures. If the artifact is dropped without being cleaned up
//! (a panic unwinding through the protocol), `Drop` removes the files on a
//! best-effort basis.

use crate::error::{OptimizeError, Result};
use crate::file_manager::FileManager;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension used when the source has none, or an unusable one
pub const DEFAULT_EXTENSION: &str = ".jpg";

/// Longest accepted extension, leading dot included
pub const MAX_EXTENSION_LEN: usize = 10;

/// Temporary output file exclusively owned by one optimizer run
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    released: bool,
}

impl TempArtifact {
    /// Dot-prefixed extension for the temp file, derived from the source
    pub fn extension_for(source: &Path) -> String {
        source
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().count() + 1 <= MAX_EXTENSION_LEN)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
    }

    /// Create a unique empty file in the source's directory.
    ///
    /// The open handle is returned only when `keep_open` is set (filter
    /// mode, where the protocol writes the tool's stdout through it);
    /// otherwise it is closed before returning.
    pub fn allocate(source: &Path, keep_open: bool) -> Result<(Self, Option<File>)> {
        let dir = source
            .parent()
            .ok_or_else(|| OptimizeError::Validation(format!("{} has no parent directory", source.display())))?;
        let suffix = Self::extension_for(source);

        let (file, path) = tempfile::Builder::new()
            .suffix(&suffix)
            .tempfile_in(dir)?
            .keep()
            .map_err(|e| OptimizeError::Io(e.error))?;

        debug!("Allocated temp artifact {}", path.display());
        let artifact = Self { path, released: false };

        if keep_open {
            Ok((artifact, Some(file)))
        } else {
            drop(file);
            Ok((artifact, None))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `<path>.bak` sibling written by some optimizers
    pub fn backup_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Remove the temp file and its `.bak` sibling.
    ///
    /// Missing files are fine; any other failure is returned, and the
    /// remaining file is still attempted.
    pub fn cleanup(mut self) -> Result<()> {
        self.released = true;
        let first = Self::remove(&self.path);
        let second = Self::remove(&self.backup_path());
        first.and(second)
    }

    fn remove(path: &Path) -> Result<()> {
        match FileManager::remove_if_exists(path) {
            Ok(true) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(source) => Err(OptimizeError::Cleanup {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for path in [self.path.clone(), self.backup_path()] {
            if let Err(e) = FileManager::remove_if_exists(&path) {
                warn!("Failed to remove temp artifact {} during unwind: {}", path.display(), e);
            }
        }
    }
}
