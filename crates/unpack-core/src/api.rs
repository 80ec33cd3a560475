//! High-level public API for archive extraction.

use std::path::Path;

use crate::Archive;
use crate::ExtractionOptions;
use crate::ExtractionReport;
use crate::ProgressCallback;
use crate::Result;
use crate::formats::ArchiveFormat;
use crate::formats::detect::detect_path;

/// Extracts an archive to the specified output directory.
///
/// The format is detected from the file contents. Entries whose paths
/// would escape `output_dir` are skipped with a warning and counted in the
/// report; any other error aborts the pass.
///
/// # Arguments
///
/// * `archive_path` - Path to the archive file
/// * `output_dir` - Directory where files will be extracted (created if missing)
/// * `options` - Overwrite policy, logging and chunking
///
/// # Errors
///
/// Returns an error if:
/// - Archive file cannot be opened
/// - Archive format is unknown or unsupported
/// - Archive metadata is corrupt, or an entry fails its CRC check
/// - An entry uses an unsupported compression method or is encrypted
/// - A destination file exists and overwrite is off
/// - I/O operations fail
///
/// # Examples
///
/// ```no_run
/// use unpack_core::ExtractionOptions;
/// use unpack_core::extract_archive;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let options = ExtractionOptions::default();
/// let report = extract_archive("archive.zip", "/tmp/output", &options)?;
/// println!("Extracted {} files", report.files_extracted);
/// # Ok(())
/// # }
/// ```
pub fn extract_archive<P: AsRef<Path>, Q: AsRef<Path>>(
    archive_path: P,
    output_dir: Q,
    options: &ExtractionOptions,
) -> Result<ExtractionReport> {
    Archive::open(archive_path)?.extract(output_dir, options)
}

/// Extracts an archive with progress reporting and cancellation.
///
/// `progress` sees every entry and every written chunk; returning `false`
/// from either callback stops the pass with
/// [`ExtractionError::Cancelled`](crate::ExtractionError::Cancelled).
/// Files written before cancellation are left in place.
///
/// # Errors
///
/// Same as [`extract_archive`], plus cancellation.
///
/// # Examples
///
/// ```no_run
/// use unpack_core::ExtractionOptions;
/// use unpack_core::extract_archive_with_progress;
/// use unpack_core::report::FnProgress;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut progress = FnProgress::new(|bytes| {
///     eprintln!("{bytes} bytes written");
///     true
/// });
/// extract_archive_with_progress(
///     "archive.tar.xz",
///     "/tmp/output",
///     &ExtractionOptions::default(),
///     &mut progress,
/// )?;
/// # Ok(())
/// # }
/// ```
pub fn extract_archive_with_progress<P: AsRef<Path>, Q: AsRef<Path>>(
    archive_path: P,
    output_dir: Q,
    options: &ExtractionOptions,
    progress: &mut dyn ProgressCallback,
) -> Result<ExtractionReport> {
    Archive::open(archive_path)?.extract_with_progress(output_dir, options, progress)
}

/// Detects the container format of the file at `path`.
///
/// Returns the format and the payload offset (non-zero only for
/// self-extracting executables).
///
/// # Errors
///
/// Returns an error if the file cannot be read or no signature matches.
pub fn detect_format<P: AsRef<Path>>(path: P) -> Result<(ArchiveFormat, u64)> {
    detect_path(path.as_ref())
}
