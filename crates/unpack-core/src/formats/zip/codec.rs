//! Compression-method dispatch for entry bodies.
//!
//! Every method is a byte-stream transform over the `compressed_size`
//! bytes that follow the local header. Decoders are pulled chunk by chunk,
//! so no entry is ever held whole in memory.

use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::{self};

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;

use crate::ExtractionError;
use crate::Result;

/// ZIP compression method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression.
    Stored,
    /// DEFLATE.
    Deflated,
    /// Enhanced DEFLATE.
    Deflate64,
    /// BZIP2.
    Bzip2,
    /// LZMA with the ZIP-specific property header.
    Lzma,
    /// Zstandard.
    Zstd,
    /// XZ container (LZMA2).
    Xz,
    /// PPMd variant I.
    Ppmd,
    /// Brotli.
    Brotli,
    /// WinZip AES marker; the real method lives in the AES extra field.
    Aes,
    /// Anything else.
    Unknown(u16),
}

impl CompressionMethod {
    /// Maps a method id to its variant.
    #[must_use]
    pub const fn from_u16(id: u16) -> Self {
        match id {
            0 => Self::Stored,
            8 => Self::Deflated,
            9 => Self::Deflate64,
            12 => Self::Bzip2,
            14 => Self::Lzma,
            20 | 93 => Self::Zstd,
            95 => Self::Xz,
            98 => Self::Ppmd,
            99 => Self::Aes,
            121 => Self::Brotli,
            other => Self::Unknown(other),
        }
    }

    /// Returns the method id as stored in headers.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
            Self::Deflate64 => 9,
            Self::Bzip2 => 12,
            Self::Lzma => 14,
            Self::Zstd => 93,
            Self::Xz => 95,
            Self::Ppmd => 98,
            Self::Aes => 99,
            Self::Brotli => 121,
            Self::Unknown(id) => id,
        }
    }

    /// Returns `true` if this build can decode the method.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            Self::Stored
                | Self::Deflated
                | Self::Deflate64
                | Self::Bzip2
                | Self::Lzma
                | Self::Zstd
                | Self::Xz
        )
    }
}

/// General-purpose flag: LZMA stream ends with an end-of-stream marker.
const FLAG_LZMA_EOS: u16 = 0x0002;

/// Wraps the raw entry data in the decoder for `method`.
///
/// `flags` and `uncompressed_size` are only consulted for LZMA, whose
/// ZIP framing differs from the standalone `.lzma` format.
pub(crate) fn decoder<'a, R>(
    method: CompressionMethod,
    flags: u16,
    uncompressed_size: u64,
    raw: R,
) -> Result<Box<dyn Read + 'a>>
where
    R: Read + 'a,
{
    let reader: Box<dyn Read + 'a> = match method {
        CompressionMethod::Stored => Box::new(raw),
        CompressionMethod::Deflated => Box::new(flate2::read::DeflateDecoder::new(raw)),
        CompressionMethod::Deflate64 => Box::new(deflate64::Deflate64Decoder::new(raw)),
        CompressionMethod::Bzip2 => Box::new(bzip2::read::BzDecoder::new(raw)),
        CompressionMethod::Xz => Box::new(xz2::read::XzDecoder::new(raw)),
        CompressionMethod::Zstd => Box::new(zstd::stream::read::Decoder::new(raw)?),
        CompressionMethod::Lzma => lzma_decoder(flags, uncompressed_size, raw)?,
        other => {
            return Err(ExtractionError::UnsupportedMethod {
                method: other.as_u16(),
            });
        }
    };
    Ok(reader)
}

/// ZIP stores LZMA as `major, minor, props_len: u16, props`, then the raw
/// stream. liblzma's `.lzma` decoder expects `props (5 bytes), size: u64`
/// instead, so the header is rewritten in front of the remaining data.
fn lzma_decoder<'a, R>(flags: u16, uncompressed_size: u64, mut raw: R) -> Result<Box<dyn Read + 'a>>
where
    R: Read + 'a,
{
    let _version = raw.read_u16::<LittleEndian>()?;
    let props_len = raw.read_u16::<LittleEndian>()?;
    if props_len != 5 {
        return Err(ExtractionError::InvalidArchive(format!(
            "unexpected LZMA properties length {props_len}"
        )));
    }
    let mut header = vec![0u8; 5];
    raw.read_exact(&mut header)?;
    let size = if flags & FLAG_LZMA_EOS == 0 {
        uncompressed_size
    } else {
        u64::MAX
    };
    header.extend_from_slice(&size.to_le_bytes());

    let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX).map_err(io::Error::other)?;
    let input = BufReader::new(Cursor::new(header).chain(raw));
    Ok(Box::new(xz2::bufread::XzDecoder::new_stream(input, stream)))
}
