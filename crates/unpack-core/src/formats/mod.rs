//! Archive format implementations.

pub(crate) mod common;
pub mod compression;
pub mod detect;
pub mod tar;
pub mod zip;

// Re-export main types for convenience
pub use common::decode_cp437;
pub use common::decode_name;
pub use compression::CompressionCodec;
pub use detect::ArchiveFormat;
pub use tar::TarArchive;
pub use tar::TarHeader;
pub use zip::ZipArchive;
pub use zip::ZipEntry;
