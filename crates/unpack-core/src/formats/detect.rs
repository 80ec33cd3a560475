//! Archive format detection by magic signature.
//!
//! Only a bounded prefix of the stream is inspected, except for two cases
//! that need more: DMG images (trailer at the end of the file) and
//! self-extracting executables, where the ZIP payload is searched for
//! forward from the end of the PE image.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;

use byteorder::ByteOrder;
use byteorder::LittleEndian;
use tracing::debug;

use crate::ExtractionError;
use crate::Result;

/// Number of leading bytes read for signature matching.
const PREFIX_LEN: usize = 4096;

/// Chunk size used while scanning for an appended ZIP payload.
const SCAN_CHUNK: usize = 64 * 1024;

const ZIP_LOCAL_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const SEVENZ_MAGIC: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
const RAR_MAGIC: &[u8] = b"Rar!\x1A\x07";
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const BZIP2_MAGIC: &[u8] = b"BZh";
const XZ_MAGIC: &[u8] = &[0xFD, b'7', b'z', b'X', b'Z', 0x00];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];
const CAB_MAGIC: &[u8] = b"MSCF";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const DEB_MAGIC: &[u8] = b"!<arch>\ndebian-binary";
const RPM_MAGIC: &[u8] = &[0xED, 0xAB, 0xEE, 0xDB];
const WIM_MAGIC: &[u8] = b"MSWIM\0\0\0";
const DMG_TRAILER_MAGIC: &[u8] = b"koly";
const NSIS_MAGIC: &[u8] = b"\xEF\xBE\xAD\xDENullsoftInst";

/// Offset of the tar magic inside a 512-byte header block.
const TAR_MAGIC_OFFSET: usize = 257;

/// Archive container formats recognised by the sniffer.
///
/// Immutable once detected. Only [`Zip`](Self::Zip), [`Tar`](Self::Tar),
/// the single-stream compressors and [`SelfExtractingExe`](Self::SelfExtractingExe)
/// are extracted by this crate; the others are identified so callers can
/// route them to an external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// ZIP archive.
    Zip,
    /// Tar archive (uncompressed).
    Tar,
    /// Gzip stream.
    Gzip,
    /// Bzip2 stream.
    Bzip2,
    /// Zstandard stream.
    Zstd,
    /// XZ stream.
    Xz,
    /// 7-Zip archive.
    SevenZip,
    /// RAR archive.
    Rar,
    /// Windows Installer package (OLE compound file).
    Msi,
    /// Microsoft Cabinet.
    Cab,
    /// Debian package.
    Deb,
    /// RPM package.
    Rpm,
    /// Apple disk image.
    Dmg,
    /// Windows Imaging Format.
    Wim,
    /// Nullsoft installer.
    Nsis,
    /// PE executable with an appended ZIP payload.
    SelfExtractingExe,
    /// PE executable with no recognised payload.
    Exe,
}

impl ArchiveFormat {
    /// Returns the MIME type of this format.
    ///
    /// # Examples
    ///
    /// ```
    /// use unpack_core::formats::ArchiveFormat;
    ///
    /// assert_eq!(ArchiveFormat::Zip.mime(), "application/zip");
    /// assert_eq!(ArchiveFormat::Tar.mime(), "application/x-tar");
    /// ```
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Zip => "application/zip",
            Self::Tar => "application/x-tar",
            Self::Gzip => "application/gzip",
            Self::Bzip2 => "application/x-bzip2",
            Self::Zstd => "application/zstd",
            Self::Xz => "application/x-xz",
            Self::SevenZip => "application/x-7z-compressed",
            Self::Rar => "application/vnd.rar",
            Self::Msi => "application/x-msi",
            Self::Cab => "application/vnd.ms-cab-compressed",
            Self::Deb => "application/vnd.debian.binary-package",
            Self::Rpm => "application/x-rpm",
            Self::Dmg => "application/x-apple-diskimage",
            Self::Wim => "application/x-ms-wim",
            Self::Nsis => "application/x-nsis",
            Self::SelfExtractingExe => "application/x-msdownload",
            Self::Exe => "application/vnd.microsoft.portable-executable",
        }
    }

    /// Maps a MIME type back to a format.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        const ALL: [ArchiveFormat; 17] = [
            ArchiveFormat::Zip,
            ArchiveFormat::Tar,
            ArchiveFormat::Gzip,
            ArchiveFormat::Bzip2,
            ArchiveFormat::Zstd,
            ArchiveFormat::Xz,
            ArchiveFormat::SevenZip,
            ArchiveFormat::Rar,
            ArchiveFormat::Msi,
            ArchiveFormat::Cab,
            ArchiveFormat::Deb,
            ArchiveFormat::Rpm,
            ArchiveFormat::Dmg,
            ArchiveFormat::Wim,
            ArchiveFormat::Nsis,
            ArchiveFormat::SelfExtractingExe,
            ArchiveFormat::Exe,
        ];
        ALL.into_iter().find(|f| f.mime().eq_ignore_ascii_case(mime))
    }

    /// Returns a short human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::Gzip => "gz",
            Self::Bzip2 => "bz2",
            Self::Zstd => "zstd",
            Self::Xz => "xz",
            Self::SevenZip => "7z",
            Self::Rar => "rar",
            Self::Msi => "msi",
            Self::Cab => "cab",
            Self::Deb => "deb",
            Self::Rpm => "rpm",
            Self::Dmg => "dmg",
            Self::Wim => "wim",
            Self::Nsis => "nsis",
            Self::SelfExtractingExe => "sfx",
            Self::Exe => "exe",
        }
    }

    /// Returns `true` for formats that are a single compressed stream.
    #[must_use]
    pub const fn is_single_stream(self) -> bool {
        matches!(self, Self::Gzip | Self::Bzip2 | Self::Zstd | Self::Xz)
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detects the format of the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or no signature matches.
pub fn detect_path(path: &Path) -> Result<(ArchiveFormat, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    detect(&mut reader)
}

/// Classifies a stream into an archive format and a payload start offset.
///
/// The offset is non-zero only for [`ArchiveFormat::SelfExtractingExe`],
/// where it is the position of the first ZIP local header after the PE
/// image. The stream position is restored before returning.
///
/// # Errors
///
/// Returns [`ExtractionError::UnknownFormat`] when nothing matches, or an
/// I/O error if the stream cannot be read.
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
/// use unpack_core::formats::ArchiveFormat;
/// use unpack_core::formats::detect::detect;
///
/// let mut stream = Cursor::new(b"PK\x03\x04rest-of-zip".to_vec());
/// assert_eq!(detect(&mut stream).unwrap(), (ArchiveFormat::Zip, 0));
/// ```
pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<(ArchiveFormat, u64)> {
    let start = reader.stream_position()?;
    let result = detect_inner(reader, start);
    reader.seek(SeekFrom::Start(start))?;
    result
}

fn detect_inner<R: Read + Seek>(reader: &mut R, start: u64) -> Result<(ArchiveFormat, u64)> {
    let prefix = read_prefix(reader, PREFIX_LEN)?;

    if let Some(format) = match_prefix(&prefix) {
        debug!(format = %format, "detected archive format");
        return Ok((format, 0));
    }

    if prefix.starts_with(b"MZ") {
        return detect_pe(reader, start, &prefix);
    }

    if is_dmg(reader, start)? {
        return Ok((ArchiveFormat::Dmg, 0));
    }

    Err(ExtractionError::UnknownFormat)
}

/// Matches the fixed-offset signatures that need no further reads.
fn match_prefix(prefix: &[u8]) -> Option<ArchiveFormat> {
    let table: [(&[u8], ArchiveFormat); 13] = [
        (ZIP_LOCAL_MAGIC, ArchiveFormat::Zip),
        (ZIP_EMPTY_MAGIC, ArchiveFormat::Zip),
        (SEVENZ_MAGIC, ArchiveFormat::SevenZip),
        (RAR_MAGIC, ArchiveFormat::Rar),
        (XZ_MAGIC, ArchiveFormat::Xz),
        (ZSTD_MAGIC, ArchiveFormat::Zstd),
        (GZIP_MAGIC, ArchiveFormat::Gzip),
        (BZIP2_MAGIC, ArchiveFormat::Bzip2),
        (CAB_MAGIC, ArchiveFormat::Cab),
        (OLE_MAGIC, ArchiveFormat::Msi),
        (DEB_MAGIC, ArchiveFormat::Deb),
        (RPM_MAGIC, ArchiveFormat::Rpm),
        (WIM_MAGIC, ArchiveFormat::Wim),
    ];

    if let Some((_, format)) = table.iter().find(|(magic, _)| prefix.starts_with(magic)) {
        return Some(*format);
    }

    if has_tar_magic(prefix) {
        return Some(ArchiveFormat::Tar);
    }

    None
}

/// Returns `true` if `block` carries a USTAR (`ustar\0`) or GNU
/// (`ustar  \0`) magic at offset 257.
pub(crate) fn has_tar_magic(block: &[u8]) -> bool {
    let Some(magic) = block.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 8) else {
        return false;
    };
    &magic[..6] == b"ustar\0" || magic == b"ustar  \0"
}

/// Walks the PE headers to find where the image ends, then looks for an
/// NSIS header or an appended ZIP payload after it.
fn detect_pe<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    prefix: &[u8],
) -> Result<(ArchiveFormat, u64)> {
    let Some(image_end) = pe_image_end(reader, start, prefix)? else {
        return Ok((ArchiveFormat::Exe, 0));
    };

    reader.seek(SeekFrom::Start(start + image_end))?;
    let overlay = read_prefix(reader, 4 + NSIS_MAGIC.len())?;
    if overlay.get(4..) == Some(NSIS_MAGIC) {
        debug!(image_end, "detected NSIS installer");
        return Ok((ArchiveFormat::Nsis, 0));
    }

    match scan_forward(reader, start + image_end, ZIP_LOCAL_MAGIC)? {
        Some(position) => {
            let offset = position - start;
            debug!(offset, "detected ZIP payload appended to PE image");
            Ok((ArchiveFormat::SelfExtractingExe, offset))
        }
        None => Ok((ArchiveFormat::Exe, 0)),
    }
}

/// Returns the end of the last section's raw data, relative to `start`.
fn pe_image_end<R: Read + Seek>(reader: &mut R, start: u64, prefix: &[u8]) -> Result<Option<u64>> {
    if prefix.len() < 0x40 {
        return Ok(None);
    }
    let pe_offset = u64::from(LittleEndian::read_u32(&prefix[0x3C..0x40]));

    reader.seek(SeekFrom::Start(start + pe_offset))?;
    let coff = read_prefix(reader, 24)?;
    if coff.len() < 24 || &coff[..4] != b"PE\0\0" {
        return Ok(None);
    }
    let section_count = u64::from(LittleEndian::read_u16(&coff[6..8]));
    let optional_header_size = u64::from(LittleEndian::read_u16(&coff[20..22]));

    let table_offset = pe_offset + 24 + optional_header_size;
    reader.seek(SeekFrom::Start(start + table_offset))?;
    let table_len = usize::try_from(section_count * 40)
        .map_err(|_| ExtractionError::InvalidArchive("PE section table too large".into()))?;
    let table = read_prefix(reader, table_len)?;

    let image_end = table
        .chunks_exact(40)
        .map(|section| {
            let raw_size = u64::from(LittleEndian::read_u32(&section[16..20]));
            let raw_pointer = u64::from(LittleEndian::read_u32(&section[20..24]));
            raw_pointer + raw_size
        })
        .max()
        .unwrap_or(table_offset + section_count * 40);

    Ok(Some(image_end))
}

/// Scans forward from `from` for `needle`, returning its absolute position.
fn scan_forward<R: Read + Seek>(reader: &mut R, from: u64, needle: &[u8]) -> Result<Option<u64>> {
    reader.seek(SeekFrom::Start(from))?;
    let mut buffer = vec![0u8; SCAN_CHUNK];
    let mut window_start = from;
    let mut carried = 0usize;

    loop {
        let n = read_full(reader, &mut buffer[carried..])?;
        let filled = carried + n;
        if let Some(index) = buffer[..filled]
            .windows(needle.len())
            .position(|w| w == needle)
        {
            return Ok(Some(window_start + index as u64));
        }
        if n == 0 || filled < needle.len() {
            return Ok(None);
        }

        // Keep a signature-sized tail so matches spanning chunks are found.
        let keep = needle.len() - 1;
        buffer.copy_within(filled - keep..filled, 0);
        window_start += (filled - keep) as u64;
        carried = keep;
    }
}

/// DMG images carry a `koly` trailer in their last 512 bytes.
fn is_dmg<R: Read + Seek>(reader: &mut R, start: u64) -> Result<bool> {
    let end = reader.seek(SeekFrom::End(0))?;
    if end < start + 512 {
        return Ok(false);
    }
    reader.seek(SeekFrom::Start(end - 512))?;
    let trailer = read_prefix(reader, 4)?;
    Ok(trailer == DMG_TRAILER_MAGIC)
}

fn read_prefix<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let n = read_full(reader, &mut buf)?;
    buf.truncate(n);
    Ok(buf)
}

/// Reads until `buf` is full or EOF, returning the number of bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
