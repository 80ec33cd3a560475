//! Central-directory entry model.

use std::time::SystemTime;

use super::codec::CompressionMethod;
use super::extra::AesInfo;
use crate::formats::common::unix_time;
use crate::types::EntryType;
use crate::types::FileMode;

/// General-purpose flag: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;
/// General-purpose flag: sizes and CRC follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// General-purpose flag: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Host system recorded in the high byte of "version made by".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creator {
    /// MS-DOS and OS/2 FAT.
    Fat,
    /// Unix.
    Unix,
    /// Windows NTFS.
    Ntfs,
    /// Windows 95 VFAT.
    Vfat,
    /// macOS.
    MacOsx,
    /// Anything else.
    Other(u8),
}

impl Creator {
    /// Decodes the "version made by" field.
    #[must_use]
    pub const fn from_version_made_by(version: u16) -> Self {
        match (version >> 8) as u8 {
            0 => Self::Fat,
            3 => Self::Unix,
            10 => Self::Ntfs,
            14 => Self::Vfat,
            19 => Self::MacOsx,
            other => Self::Other(other),
        }
    }
}

/// One file record of the central directory, with every Zip64 sentinel
/// already resolved.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    /// Decoded entry name.
    pub name: String,
    /// Name bytes as stored in the directory.
    pub raw_name: Vec<u8>,
    /// Decoded entry comment.
    pub comment: String,
    /// Symlink target, filled from an inline Unix extra or read lazily
    /// from the entry body.
    pub link_name: Option<String>,
    /// Compressed size in bytes.
    pub compressed_size: u64,
    /// Uncompressed size in bytes.
    pub uncompressed_size: u64,
    /// Offset of the local file header, relative to the archive start.
    pub position: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// CRC32 of the uncompressed data.
    pub crc32: u32,
    /// Portable mode derived from the external attributes.
    pub mode: FileMode,
    /// Compression method of the stored data (the inner method for AES).
    pub method: CompressionMethod,
    /// General-purpose flags.
    pub flags: u16,
    /// "Version made by" field.
    pub version_made_by: u16,
    /// Raw external attributes.
    pub external_attrs: u32,
    /// Owner from a Unix extra.
    pub uid: Option<u32>,
    /// Group from a Unix extra.
    pub gid: Option<u32>,
    /// WinZip AES parameters.
    pub aes: Option<AesInfo>,
}

impl ZipEntry {
    /// Host system that wrote this entry.
    #[must_use]
    pub const fn creator(&self) -> Creator {
        Creator::from_version_made_by(self.version_made_by)
    }

    /// Returns `true` if the UTF-8 flag is set.
    #[must_use]
    pub const fn is_utf8(&self) -> bool {
        self.flags & FLAG_UTF8 != 0
    }

    /// Returns `true` for traditional or AES encryption.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0 || self.aes.is_some()
    }

    /// Returns `true` if a data descriptor follows the entry data.
    #[must_use]
    pub const fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Returns `true` for directories.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    /// Returns `true` for symbolic links.
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        self.mode.is_symlink()
    }

    /// Kind of filesystem object this entry describes.
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        if self.is_dir() {
            EntryType::Directory
        } else if self.is_symlink() {
            EntryType::Symlink {
                target: self.link_name.clone().unwrap_or_default(),
            }
        } else if self.mode.contains(FileMode::NAMED_PIPE) {
            EntryType::Special {
                description: "named pipe",
            }
        } else if self.mode.contains(FileMode::SOCKET) {
            EntryType::Special {
                description: "socket",
            }
        } else if self.mode.contains(FileMode::DEVICE) {
            EntryType::Special {
                description: "device",
            }
        } else {
            EntryType::File
        }
    }
}

/// Derives the portable mode from creator and external attributes.
///
/// A name ending in a path separator is always a directory.
pub(crate) fn derive_mode(creator: Creator, external_attrs: u32, raw_name: &[u8]) -> FileMode {
    let mut mode = match creator {
        Creator::Unix | Creator::MacOsx => FileMode::from_unix(external_attrs >> 16),
        Creator::Fat | Creator::Ntfs | Creator::Vfat => FileMode::from_msdos(external_attrs),
        Creator::Other(_) => FileMode::default(),
    };
    if matches!(raw_name.last(), Some(b'/' | b'\\')) {
        mode.insert(FileMode::DIR);
    }
    mode
}

/// Converts an MS-DOS date and time to `SystemTime`, treating it as UTC.
pub(crate) fn dos_to_system_time(date: u16, time: u16) -> SystemTime {
    let year = 1980 + i64::from(date >> 9);
    let month = i64::from((date >> 5) & 0x0f).clamp(1, 12);
    let day = i64::from(date & 0x1f).max(1);
    let hour = i64::from(time >> 11);
    let minute = i64::from((time >> 5) & 0x3f);
    let second = i64::from(time & 0x1f) * 2;

    let days = days_from_civil(year, month, day);
    unix_time(days * 86_400 + hour * 3_600 + minute * 60 + second, 0)
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Decodes a symlink body, which some Windows tools store as UTF-16LE.
pub(crate) fn decode_link_target(body: &[u8]) -> String {
    let utf16 = body.starts_with(&[0xff, 0xfe])
        || (body.len() >= 2 && body.len() % 2 == 0 && body.iter().skip(1).step_by(2).all(|&b| b == 0));
    if utf16 {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .skip_while(|&unit| unit == 0xfeff)
            .collect();
        if let Ok(target) = String::from_utf16(&units) {
            return target;
        }
    }
    String::from_utf8_lossy(body).into_owned()
}
