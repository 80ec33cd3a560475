//! Archive types and builders.

use std::fs::File;
use std::io::BufReader;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use std::path::PathBuf;

use crate::ExtractionError;
use crate::ExtractionOptions;
use crate::ExtractionReport;
use crate::NoopProgress;
use crate::ProgressCallback;
use crate::Result;
use crate::extraction;
use crate::formats::ArchiveFormat;
use crate::formats::detect::detect;
use crate::inspection::ArchiveManifest;
use crate::inspection::list_path;
use crate::types::DestDir;

/// An archive file whose format has been detected.
///
/// Opening only sniffs the format; the container is parsed again for every
/// listing or extraction pass, so an `Archive` holds no file handle.
///
/// # Examples
///
/// ```no_run
/// use unpack_core::Archive;
/// use unpack_core::ExtractionOptions;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let archive = Archive::open("setup.exe")?;
/// println!("{} payload at offset {}", archive.format(), archive.offset());
/// let report = archive.extract("/tmp/output", &ExtractionOptions::default())?;
/// println!("Extracted {} files", report.files_extracted);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Archive {
    path: PathBuf,
    format: ArchiveFormat,
    offset: u64,
}

impl Archive {
    /// Opens `path` and detects its format from the first bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or no signature matches.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_at(path, 0)
    }

    /// Opens an archive embedded at `offset` inside `path`.
    ///
    /// A self-extracting executable found at that position reports its own
    /// payload offset, relative to the start of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, `offset` is past its
    /// end, or no signature matches there.
    pub fn open_at<P: AsRef<Path>>(path: P, offset: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);
        let len = reader.get_ref().metadata()?.len();
        if offset > len {
            return Err(ExtractionError::InvalidArchive(format!(
                "offset {offset} is past the end of a {len}-byte file"
            )));
        }
        reader.seek(SeekFrom::Start(offset))?;
        let (format, payload) = detect(&mut reader)?;
        Ok(Self {
            path,
            format,
            offset: offset + payload,
        })
    }

    /// Returns the path to the archive file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the detected format.
    #[must_use]
    pub const fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Returns the position where the payload starts.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Lists the entries without extracting anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is not supported or the archive is
    /// corrupt.
    pub fn list(&self) -> Result<ArchiveManifest> {
        list_path(&self.path, self.format, self.offset)
    }

    /// Extracts the archive into `output_dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable error; see [`crate::extract_archive`].
    pub fn extract<P: AsRef<Path>>(
        &self,
        output_dir: P,
        options: &ExtractionOptions,
    ) -> Result<ExtractionReport> {
        self.extract_with_progress(output_dir, options, &mut NoopProgress)
    }

    /// Extracts the archive, reporting progress to `progress`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Cancelled`] if `progress` stops the pass,
    /// or the first unrecoverable error.
    pub fn extract_with_progress<P: AsRef<Path>>(
        &self,
        output_dir: P,
        options: &ExtractionOptions,
        progress: &mut dyn ProgressCallback,
    ) -> Result<ExtractionReport> {
        let dest = DestDir::create(output_dir.as_ref())?;
        extraction::extract_path(&self.path, self.format, self.offset, dest, options, progress)
    }
}

/// Builder for configuring archive extraction.
///
/// # Examples
///
/// ```no_run
/// use unpack_core::ArchiveBuilder;
/// use unpack_core::ExtractionOptions;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let report = ArchiveBuilder::new()
///     .archive("archive.tar.gz")
///     .output_dir("/tmp/output")
///     .options(ExtractionOptions::default().with_overwrite(true))
///     .extract()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    archive_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    options: Option<ExtractionOptions>,
    offset: u64,
}

impl ArchiveBuilder {
    /// Creates a new `ArchiveBuilder`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the archive file path.
    #[must_use]
    pub fn archive<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.archive_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn output_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the extraction options.
    #[must_use]
    pub fn options(mut self, options: ExtractionOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Sets the offset of an embedded archive.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Executes the extraction with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns an error if archive_path or output_dir are not set,
    /// or if extraction fails.
    pub fn extract(self) -> Result<ExtractionReport> {
        self.extract_with_progress(&mut NoopProgress)
    }

    /// Executes the extraction, reporting progress to `progress`.
    ///
    /// # Errors
    ///
    /// Returns an error if archive_path or output_dir are not set,
    /// or if extraction fails or is cancelled.
    pub fn extract_with_progress(
        self,
        progress: &mut dyn ProgressCallback,
    ) -> Result<ExtractionReport> {
        let archive_path = self.archive_path.ok_or_else(|| missing("archive path"))?;
        let output_dir = self.output_dir.ok_or_else(|| missing("output directory"))?;
        let options = self.options.unwrap_or_default();

        Archive::open_at(archive_path, self.offset)?.extract_with_progress(
            output_dir,
            &options,
            progress,
        )
    }
}

fn missing(what: &str) -> ExtractionError {
    ExtractionError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("{what} not set"),
    ))
}
