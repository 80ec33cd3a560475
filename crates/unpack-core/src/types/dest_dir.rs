//! Extraction root.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use crate::ExtractionError;
use crate::Result;

/// The directory an archive is extracted into.
///
/// Always an absolute, canonical path to an existing directory, so that
/// joined entry paths can be checked with a plain prefix comparison.
///
/// # Examples
///
/// ```no_run
/// use unpack_core::types::DestDir;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dest = DestDir::create("/tmp/extraction")?;
/// println!("Extracting to: {}", dest.as_path().display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestDir(PathBuf);

impl DestDir {
    /// Canonicalizes an existing directory.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Io`] with `NotFound` if nothing exists at
    /// `path` and `InvalidInput` if it is not a directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let canonical = path.canonicalize().map_err(|e| {
            io::Error::new(e.kind(), format!("{}: {e}", path.display()))
        })?;
        if !fs::metadata(&canonical)?.is_dir() {
            return Err(ExtractionError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a directory: {}", path.display()),
            )));
        }
        Ok(Self(canonical))
    }

    /// Like [`DestDir::new`], creating the directory and its parents first.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or is not a directory.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Self::new(path)
    }

    /// Canonical root path.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for DestDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}
