//! 512-byte header blocks.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use super::sparse::INLINE_PAIRS;
use super::sparse::SparseEntry;
use super::sparse::SparseMap;
use crate::ExtractionError;
use crate::Result;
use crate::formats::common::decode_name;
use crate::formats::common::unix_time;
use crate::types::EntryType;
use crate::types::FileMode;

/// Size of a tar block.
pub const BLOCK_SIZE: u64 = 512;

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
const USTAR_VERSION: &[u8; 2] = b"00";
const GNU_MAGIC: &[u8; 8] = b"ustar  \0";

/// Set of header variants that contributed to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Format(u8);

impl Format {
    /// Pre-POSIX header without magic.
    pub const V7: Self = Self(1);
    /// POSIX.1-1988 USTAR header.
    pub const USTAR: Self = Self(1 << 1);
    /// PAX extended records.
    pub const PAX: Self = Self(1 << 2);
    /// GNU header or GNU extensions (long names, old sparse).
    pub const GNU: Self = Self(1 << 3);

    /// Returns `true` if every variant in `other` is present.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Adds the variants of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::V7, "v7"),
            (Self::USTAR, "ustar"),
            (Self::PAX, "pax"),
            (Self::GNU, "gnu"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        f.write_str(&names.join("|"))
    }
}

/// Kind of a tar entry, carrying only the data valid for that kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TarEntryKind {
    /// Regular file (`0`, NUL, `7`), possibly sparse.
    File {
        /// Reconstruction map for sparse files.
        sparse: Option<SparseMap>,
    },
    /// Hard link (`1`) to an earlier entry.
    Hardlink {
        /// Name of the linked entry.
        target: String,
    },
    /// Symbolic link (`2`).
    Symlink {
        /// Link target text.
        target: String,
    },
    /// Character device (`3`).
    CharDevice {
        /// Major number.
        major: u32,
        /// Minor number.
        minor: u32,
    },
    /// Block device (`4`).
    BlockDevice {
        /// Major number.
        major: u32,
        /// Minor number.
        minor: u32,
    },
    /// Directory (`5`).
    Directory,
    /// Named pipe (`6`).
    Fifo,
    /// Typeflag without a meaning for extraction.
    Other {
        /// Raw typeflag.
        typeflag: u8,
    },
}

impl TarEntryKind {
    /// Kinds whose size field never describes data in the archive.
    pub(crate) const fn is_header_only(&self) -> bool {
        matches!(
            self,
            Self::Hardlink { .. }
                | Self::Symlink { .. }
                | Self::CharDevice { .. }
                | Self::BlockDevice { .. }
                | Self::Directory
                | Self::Fifo
        )
    }
}

/// A fully merged tar header: USTAR/GNU fields with GNU long names and PAX
/// records already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    /// Entry name.
    pub name: String,
    /// Entry kind.
    pub kind: TarEntryKind,
    /// Raw typeflag byte.
    pub typeflag: u8,
    /// Logical size (the reconstructed size for sparse files).
    pub size: u64,
    /// Raw mode field.
    pub mode: u32,
    /// Owner id.
    pub uid: u64,
    /// Group id.
    pub gid: u64,
    /// Owner name.
    pub uname: String,
    /// Group name.
    pub gname: String,
    /// Modification time.
    pub modified: SystemTime,
    /// Access time, from GNU headers or PAX.
    pub accessed: Option<SystemTime>,
    /// Status change time, from GNU headers or PAX.
    pub changed: Option<SystemTime>,
    /// `SCHILY.xattr.*` records, keyed without the prefix.
    pub xattrs: BTreeMap<String, String>,
    /// Every PAX record in effect for this entry.
    pub pax_records: BTreeMap<String, String>,
    /// Header variants that contributed.
    pub format: Format,
}

impl TarHeader {
    /// Portable mode: permission bits from the header, type from the
    /// typeflag.
    #[must_use]
    pub fn file_mode(&self) -> FileMode {
        let mut mode = FileMode::from_unix(self.mode);
        match self.kind {
            TarEntryKind::Directory => mode.insert(FileMode::DIR),
            TarEntryKind::Symlink { .. } => mode.insert(FileMode::SYMLINK),
            TarEntryKind::CharDevice { .. } => {
                mode.insert(FileMode::DEVICE);
                mode.insert(FileMode::CHAR_DEVICE);
            }
            TarEntryKind::BlockDevice { .. } => mode.insert(FileMode::DEVICE),
            TarEntryKind::Fifo => mode.insert(FileMode::NAMED_PIPE),
            TarEntryKind::File { .. } | TarEntryKind::Hardlink { .. } | TarEntryKind::Other { .. } => {}
        }
        mode
    }

    /// Sparse map, for sparse regular files.
    #[must_use]
    pub fn sparse(&self) -> Option<&SparseMap> {
        match &self.kind {
            TarEntryKind::File { sparse } => sparse.as_ref(),
            _ => None,
        }
    }

    /// Kind of filesystem object this entry describes.
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        match &self.kind {
            TarEntryKind::File { .. } => EntryType::File,
            TarEntryKind::Directory => EntryType::Directory,
            TarEntryKind::Symlink { target } => EntryType::Symlink {
                target: target.clone(),
            },
            TarEntryKind::Hardlink { target } => EntryType::Hardlink {
                target: target.clone(),
            },
            TarEntryKind::CharDevice { .. } => EntryType::Special {
                description: "character device",
            },
            TarEntryKind::BlockDevice { .. } => EntryType::Special {
                description: "block device",
            },
            TarEntryKind::Fifo => EntryType::Special {
                description: "named pipe",
            },
            TarEntryKind::Other { .. } => EntryType::Special {
                description: "unsupported tar entry",
            },
        }
    }
}

/// Fields decoded from one header block, before any extension is merged.
#[derive(Debug, Clone)]
pub(crate) struct RawHeader {
    pub name: String,
    pub linkname: String,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub size: u64,
    pub modified: SystemTime,
    pub typeflag: u8,
    pub uname: String,
    pub gname: String,
    pub devmajor: u32,
    pub devminor: u32,
    pub accessed: Option<SystemTime>,
    pub changed: Option<SystemTime>,
    pub format: Format,
    /// Inline GNU sparse pairs, the extension flag and the real size.
    pub gnu_sparse: Vec<SparseEntry>,
    pub gnu_extended: bool,
    pub gnu_realsize: u64,
}

/// Returns `true` if the block is all zeros.
pub(crate) fn is_zero_block(block: &[u8]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Verifies the stored checksum against both the unsigned and the signed
/// byte sum; some pre-POSIX writers used signed chars.
pub(crate) fn verify_checksum(block: &[u8; 512]) -> Result<()> {
    let stored = parse_octal(&block[148..156]).map_err(|_| ExtractionError::NotTarFile)?;
    let (unsigned, signed) = checksums(block);
    if stored == unsigned || stored == signed {
        Ok(())
    } else {
        Err(ExtractionError::NotTarFile)
    }
}

/// Unsigned and signed byte sums with the checksum field read as spaces.
pub(crate) fn checksums(block: &[u8; 512]) -> (i64, i64) {
    let mut unsigned = 0i64;
    let mut signed = 0i64;
    for (i, &b) in block.iter().enumerate() {
        let b = if (148..156).contains(&i) { b' ' } else { b };
        unsigned += i64::from(b);
        signed += i64::from(b as i8);
    }
    (unsigned, signed)
}

/// Decodes a checksummed header block.
pub(crate) fn parse_block(block: &[u8; 512]) -> Result<RawHeader> {
    let format = if &block[257..265] == GNU_MAGIC {
        Format::GNU
    } else if &block[257..263] == USTAR_MAGIC && &block[263..265] == USTAR_VERSION {
        Format::USTAR
    } else {
        Format::V7
    };

    let mut raw = RawHeader {
        name: cstr(&block[0..100]),
        linkname: cstr(&block[157..257]),
        mode: parse_numeric(&block[100..108])? as u32,
        uid: unsigned(parse_numeric(&block[108..116])?, "uid")?,
        gid: unsigned(parse_numeric(&block[116..124])?, "gid")?,
        size: unsigned(parse_numeric(&block[124..136])?, "size")?,
        modified: unix_time(parse_numeric(&block[136..148])?, 0),
        typeflag: block[156],
        uname: String::new(),
        gname: String::new(),
        devmajor: 0,
        devminor: 0,
        accessed: None,
        changed: None,
        format,
        gnu_sparse: Vec::new(),
        gnu_extended: false,
        gnu_realsize: 0,
    };

    if format != Format::V7 {
        raw.uname = cstr(&block[265..297]);
        raw.gname = cstr(&block[297..329]);
        raw.devmajor = parse_numeric(&block[329..337])? as u32;
        raw.devminor = parse_numeric(&block[337..345])? as u32;
    }

    if format == Format::USTAR {
        let prefix = cstr(&block[345..500]);
        if !prefix.is_empty() {
            raw.name = format!("{prefix}/{}", raw.name);
        }
    }

    if format == Format::GNU {
        raw.accessed = non_zero(parse_numeric(&block[345..357])?).map(|t| unix_time(t, 0));
        raw.changed = non_zero(parse_numeric(&block[357..369])?).map(|t| unix_time(t, 0));
        if raw.typeflag == b'S' {
            raw.gnu_sparse = super::sparse::parse_pairs(&block[386..386 + INLINE_PAIRS * 24])?;
            raw.gnu_extended = block[482] != 0;
            raw.gnu_realsize = unsigned(parse_numeric(&block[483..495])?, "realsize")?;
        }
    }

    Ok(raw)
}

fn non_zero(value: i64) -> Option<i64> {
    (value != 0).then_some(value)
}

fn unsigned(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| ExtractionError::InvalidArchive(format!("negative {field} in tar header")))
}

/// Field bytes up to the first NUL, decoded as a name.
pub(crate) fn cstr(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    decode_name(&field[..end], false)
}

/// Parses a numeric field, octal or GNU base-256.
pub(crate) fn parse_numeric(field: &[u8]) -> Result<i64> {
    match field.first() {
        Some(&first) if first & 0x80 != 0 => parse_base256(field),
        _ => parse_octal(field),
    }
}

/// Base-256: the high bit of the first byte marks the encoding, the next
/// bit is the sign, the rest is a big-endian two's complement number.
fn parse_base256(field: &[u8]) -> Result<i64> {
    let negative = field[0] & 0x40 != 0;
    let mut value: u64 = 0;
    for (i, &byte) in field.iter().enumerate() {
        let mut byte = if negative { !byte } else { byte };
        if i == 0 {
            byte &= 0x7f;
        }
        if value >> 56 != 0 {
            return Err(ExtractionError::InvalidArchive(
                "base-256 field overflows".to_string(),
            ));
        }
        value = (value << 8) | u64::from(byte);
    }
    if value >> 63 != 0 {
        return Err(ExtractionError::InvalidArchive(
            "base-256 field overflows".to_string(),
        ));
    }
    let value = value as i64;
    Ok(if negative { -value - 1 } else { value })
}

/// Octal digits, surrounded by optional spaces and NULs.
pub(crate) fn parse_octal(field: &[u8]) -> Result<i64> {
    let digits = field
        .split(|&b| b == 0)
        .next()
        .unwrap_or_default()
        .trim_ascii();
    if digits.is_empty() {
        return Ok(0);
    }
    let text = std::str::from_utf8(digits)
        .map_err(|_| ExtractionError::InvalidArchive("non-ASCII numeric field".to_string()))?;
    i64::from_str_radix(text, 8)
        .map_err(|_| ExtractionError::InvalidArchive(format!("invalid octal field {text:?}")))
}
