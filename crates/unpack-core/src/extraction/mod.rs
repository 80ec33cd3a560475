//! Extraction pipeline: container drivers feeding the materializer.
//!
//! ```text
//! detect -> { ZipArchive | TarArchive | codec + TarArchive } -> security::join -> Materializer
//! ```

mod engine;
mod stream;
mod tar;
mod zip;

use std::fs::File;
use std::io::BufReader;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;

use tracing::debug;

use crate::ExtractionError;
use crate::ExtractionOptions;
use crate::ExtractionReport;
use crate::ProgressCallback;
use crate::Result;
use crate::formats::ArchiveFormat;
use crate::formats::CompressionCodec;
use crate::formats::TarArchive;
use crate::formats::ZipArchive;
use crate::types::DestDir;
use engine::Materializer;

/// Runs one extraction pass over the archive at `archive_path`.
///
/// `offset` is where the payload starts (non-zero for archives embedded
/// after a stub). ZIP archives locate their directory from the end of the
/// file, so for them the offset is only cross-checked.
///
/// # Errors
///
/// Returns the first unrecoverable error. Rejected entry paths are not
/// errors; they are counted in the report.
pub(crate) fn extract_path(
    archive_path: &Path,
    format: ArchiveFormat,
    offset: u64,
    dest: DestDir,
    options: &ExtractionOptions,
    progress: &mut dyn ProgressCallback,
) -> Result<ExtractionReport> {
    let mut file = File::open(archive_path)?;
    let mut materializer = Materializer::new(dest, options, progress);
    debug!(
        archive = %archive_path.display(),
        format = %format,
        offset,
        dest = %materializer.root().display(),
        "starting extraction"
    );

    match format {
        ArchiveFormat::Zip | ArchiveFormat::SelfExtractingExe => {
            let mut archive = ZipArchive::new(BufReader::new(file))?;
            if offset != 0 && archive.base_offset() != offset {
                debug!(
                    expected = offset,
                    found = archive.base_offset(),
                    "zip payload offset differs from the detected one"
                );
            }
            zip::extract_zip(&mut archive, &mut materializer)?;
        }
        ArchiveFormat::Tar => {
            file.seek(SeekFrom::Start(offset))?;
            let mut archive = TarArchive::new(BufReader::new(file));
            tar::extract_tar(&mut archive, &mut materializer)?;
        }
        other => {
            let codec = CompressionCodec::from_format(other)
                .ok_or(ExtractionError::UnsupportedFormat(other))?;
            file.seek(SeekFrom::Start(offset))?;
            stream::extract_stream(file, codec, archive_path, &mut materializer)?;
        }
    }

    Ok(materializer.finish())
}
