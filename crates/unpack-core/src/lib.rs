//! Archive format detection, parsing and zip-slip safe extraction.
//!
//! `unpack-core` sniffs an archive's container format, parses ZIP central
//! directories (Zip64, extra fields, self-extracting stubs) and TAR streams
//! (USTAR, GNU long names, PAX records, sparse files), and materializes the
//! entries under a destination directory. Entry names that would escape
//! the destination are skipped; everything else is streamed to disk in
//! bounded chunks with progress reporting and cooperative cancellation.
//!
//! # Examples
//!
//! ```no_run
//! use unpack_core::ExtractionOptions;
//! use unpack_core::extract_archive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ExtractionOptions::default();
//! let report = extract_archive("archive.tar.gz", "/output/dir", &options)?;
//! println!("Extracted {} files", report.files_extracted);
//! # Ok(())
//! # }
//! ```
//!
//! Lower-level access to the parsers is available through [`formats`]:
//!
//! ```no_run
//! use std::fs::File;
//! use unpack_core::formats::ZipArchive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut archive = ZipArchive::new(File::open("archive.zip")?)?;
//! for entry in archive.entries() {
//!     println!("{} ({} bytes)", entry.name, entry.uncompressed_size);
//! }
//! let mut first = Vec::new();
//! archive.decompress(0, &mut first)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod archive;
pub mod config;
pub mod copy;
pub mod error;
mod extraction;
pub mod formats;
pub mod inspection;
pub mod io;
pub mod report;
pub mod security;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export main API types
pub use api::detect_format;
pub use api::extract_archive;
pub use api::extract_archive_with_progress;
pub use archive::Archive;
pub use archive::ArchiveBuilder;
pub use config::ExtractionOptions;
pub use error::ExtractionError;
pub use error::Result;
pub use inspection::ArchiveManifest;
pub use inspection::list_archive;
pub use report::ExtractionReport;
pub use report::NoopProgress;
pub use report::ProgressCallback;

// Re-export types module for easier access
pub use formats::ArchiveFormat;
pub use types::DestDir;
pub use types::EntryType;
pub use types::FileMode;
pub use types::SafePath;
