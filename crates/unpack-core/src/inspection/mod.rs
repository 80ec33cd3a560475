//! Archive inspection without extraction.
//!
//! # Examples
//!
//! ```no_run
//! use unpack_core::list_archive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manifest = list_archive("archive.tar.gz")?;
//! println!("Archive contains {} files", manifest.total_entries);
//! # Ok(())
//! # }
//! ```

pub mod list;
pub mod manifest;

pub use list::list_archive;
pub(crate) use list::list_path;
pub use manifest::ArchiveEntry;
pub use manifest::ArchiveManifest;
