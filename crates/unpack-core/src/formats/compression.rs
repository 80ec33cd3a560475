//! Single-stream compression codecs.
//!
//! A `.gz`, `.bz2`, `.xz` or `.zst` file wraps exactly one byte stream,
//! which is either a TAR archive or a single plain file.
//!
//! # Supported Codecs
//!
//! - **Gzip** (.gz, .tgz), including multi-member streams
//! - **Bzip2** (.bz2, .tbz2)
//! - **Xz** (.xz, .txz)
//! - **Zstd** (.zst, .tzst)

use std::io::BufReader;
use std::io::Read;

use crate::Result;
use crate::formats::ArchiveFormat;

/// Compression codec of a single-stream file.
///
/// # Examples
///
/// ```
/// use unpack_core::formats::ArchiveFormat;
/// use unpack_core::formats::compression::CompressionCodec;
///
/// let codec = CompressionCodec::from_format(ArchiveFormat::Gzip).unwrap();
/// assert_eq!(codec.name(), "gzip");
/// assert_eq!(codec.extension(), "gz");
/// assert!(CompressionCodec::from_format(ArchiveFormat::Zip).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionCodec {
    /// Gzip (DEFLATE).
    Gzip,
    /// Bzip2 (Burrows-Wheeler).
    Bzip2,
    /// Xz (LZMA2).
    Xz,
    /// Zstandard.
    Zstd,
}

impl CompressionCodec {
    /// Codec for a detected single-stream format.
    #[must_use]
    pub const fn from_format(format: ArchiveFormat) -> Option<Self> {
        match format {
            ArchiveFormat::Gzip => Some(Self::Gzip),
            ArchiveFormat::Bzip2 => Some(Self::Bzip2),
            ArchiveFormat::Xz => Some(Self::Xz),
            ArchiveFormat::Zstd => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Typical file extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
            Self::Zstd => "zst",
        }
    }

    /// Short extensions that stand for `.tar.<ext>`.
    #[must_use]
    pub const fn tar_aliases(self) -> &'static [&'static str] {
        match self {
            Self::Gzip => &["tgz", "taz"],
            Self::Bzip2 => &["tbz", "tbz2", "tb2"],
            Self::Xz => &["txz"],
            Self::Zstd => &["tzst", "tzs"],
        }
    }

    /// Human-readable codec name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }

    /// Wraps `reader` in a streaming decoder.
    ///
    /// # Errors
    ///
    /// Returns an error if the decoder cannot be initialized.
    pub fn decoder<'a, R: Read + 'a>(self, reader: R) -> Result<Box<dyn Read + 'a>> {
        let decoder: Box<dyn Read + 'a> = match self {
            Self::Gzip => Box::new(flate2::read::MultiGzDecoder::new(BufReader::new(reader))),
            Self::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(BufReader::new(reader))),
            Self::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(BufReader::new(reader))),
            Self::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
        };
        Ok(decoder)
    }
}

const GZIP_FEXTRA: u8 = 0x04;
const GZIP_FNAME: u8 = 0x08;

/// Original file name stored in a gzip header (`FNAME`), if any.
///
/// `prefix` is the start of the file; names that do not fit in it are
/// ignored.
#[must_use]
pub fn gzip_original_name(prefix: &[u8]) -> Option<String> {
    if prefix.len() < 10 || prefix[..3] != [0x1f, 0x8b, 0x08] {
        return None;
    }
    let flags = prefix[3];
    if flags & GZIP_FNAME == 0 {
        return None;
    }
    let mut pos = 10;
    if flags & GZIP_FEXTRA != 0 {
        let len = usize::from(u16::from_le_bytes([*prefix.get(10)?, *prefix.get(11)?]));
        pos += 2 + len;
    }
    let rest = prefix.get(pos..)?;
    let end = rest.iter().position(|&b| b == 0)?;
    let name = String::from_utf8_lossy(&rest[..end]).into_owned();
    (!name.is_empty()).then_some(name)
}
