//! Extra-field TLV records of the central directory.
//!
//! Each record is `tag: u16, size: u16, data: [u8; size]`. A record whose
//! declared size runs past the end of the block stops iteration for that
//! block only; the entry itself stays valid.

use std::io::Read;
use std::time::SystemTime;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use tracing::debug;

use crate::ExtractionError;
use crate::Result;
use crate::formats::common::resolve_if_sentinel;
use crate::formats::common::unix_time;

pub(crate) const ZIP64: u16 = 0x0001;
pub(crate) const NTFS: u16 = 0x000a;
pub(crate) const UNIX: u16 = 0x000d;
pub(crate) const EXTENDED_TIMESTAMP: u16 = 0x5455;
pub(crate) const INFOZIP_UNIX: u16 = 0x5855;
pub(crate) const INFOZIP_UNIX_IDS: u16 = 0x7875;
pub(crate) const UNICODE_PATH: u16 = 0x7075;
pub(crate) const UNICODE_COMMENT: u16 = 0x6375;
pub(crate) const AES: u16 = 0x9901;

/// Value of a 32-bit size or offset field that defers to the Zip64 record.
pub(crate) const SENTINEL_U32: u64 = 0xFFFF_FFFF;

/// Seconds between 1601-01-01 (the FILETIME epoch) and the Unix epoch.
const FILETIME_EPOCH_OFFSET: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SEC: u64 = 10_000_000;

/// Iterator over the `(tag, data)` records of an extra block.
pub(crate) struct ExtraFields<'a> {
    data: &'a [u8],
}

impl<'a> ExtraFields<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for ExtraFields<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 4 {
            return None;
        }
        let tag = u16::from_le_bytes([self.data[0], self.data[1]]);
        let size = usize::from(u16::from_le_bytes([self.data[2], self.data[3]]));
        let rest = &self.data[4..];
        if size > rest.len() {
            debug!(tag, size, remaining = rest.len(), "truncated extra field, skipping rest of block");
            self.data = &[];
            return None;
        }
        let (field, tail) = rest.split_at(size);
        self.data = tail;
        Some((tag, field))
    }
}

/// WinZip AES encryption marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesInfo {
    /// AE-1 or AE-2.
    pub version: u16,
    /// Key strength: 1 = 128, 2 = 192, 3 = 256 bits.
    pub strength: u8,
    /// Compression method applied before encryption.
    pub method: u16,
}

/// Ownership and link data from the Unix-flavoured extras.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct UnixExtra {
    pub modified: Option<SystemTime>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub link_target: Option<Vec<u8>>,
}

/// Resolves sizes and offset from a Zip64 record.
///
/// Only fields still holding the 32-bit sentinel are read, in the fixed
/// order uncompressed, compressed, local-header offset.
pub(crate) fn apply_zip64(
    mut data: &[u8],
    uncompressed: &mut u64,
    compressed: &mut u64,
    offset: &mut u64,
) -> Result<()> {
    let mut next = || data.read_u64::<LittleEndian>().ok();
    for field in [uncompressed, compressed, offset] {
        if !resolve_if_sentinel(field, SENTINEL_U32, &mut next) && *field == SENTINEL_U32 {
            return Err(ExtractionError::InvalidArchive(
                "zip64 extra field is missing a required value".to_string(),
            ));
        }
    }
    Ok(())
}

/// Reads the modification time from an NTFS extra (attribute tag 1).
pub(crate) fn parse_ntfs(data: &[u8]) -> Option<SystemTime> {
    let mut attrs = data.get(4..)?;
    while attrs.len() >= 4 {
        let tag = attrs.read_u16::<LittleEndian>().ok()?;
        let size = usize::from(attrs.read_u16::<LittleEndian>().ok()?);
        if size > attrs.len() {
            return None;
        }
        let (attr, rest) = attrs.split_at(size);
        attrs = rest;
        if tag == 1 && size == 24 {
            let mut attr = attr;
            let ticks = attr.read_u64::<LittleEndian>().ok()?;
            return Some(filetime_to_system(ticks));
        }
    }
    None
}

fn filetime_to_system(ticks: u64) -> SystemTime {
    let secs = (ticks / FILETIME_TICKS_PER_SEC) as i64 - FILETIME_EPOCH_OFFSET;
    let nanos = (ticks % FILETIME_TICKS_PER_SEC) as u32 * 100;
    unix_time(secs, nanos)
}

/// PKWARE Unix extra: atime, mtime, uid, gid, then variable data which for
/// symlinks is the link target.
pub(crate) fn parse_unix(mut data: &[u8]) -> UnixExtra {
    let mut extra = UnixExtra::default();
    if data.len() < 12 {
        return extra;
    }
    let _atime = data.read_u32::<LittleEndian>().ok();
    extra.modified = data
        .read_u32::<LittleEndian>()
        .ok()
        .map(|t| unix_time(i64::from(t), 0));
    extra.uid = data.read_u16::<LittleEndian>().ok().map(u32::from);
    extra.gid = data.read_u16::<LittleEndian>().ok().map(u32::from);
    if !data.is_empty() {
        extra.link_target = Some(data.to_vec());
    }
    extra
}

/// Info-ZIP "UX" extra: atime, mtime, and optionally uid/gid.
pub(crate) fn parse_infozip_unix(mut data: &[u8]) -> UnixExtra {
    let mut extra = UnixExtra::default();
    if data.len() < 8 {
        return extra;
    }
    let _atime = data.read_u32::<LittleEndian>().ok();
    extra.modified = data
        .read_u32::<LittleEndian>()
        .ok()
        .map(|t| unix_time(i64::from(t), 0));
    if data.len() >= 4 {
        extra.uid = data.read_u16::<LittleEndian>().ok().map(u32::from);
        extra.gid = data.read_u16::<LittleEndian>().ok().map(u32::from);
    }
    extra
}

/// Info-ZIP "ux" extra: variable-width uid and gid.
pub(crate) fn parse_infozip_ids(mut data: &[u8]) -> UnixExtra {
    fn read_id(data: &mut &[u8]) -> Option<u32> {
        let size = usize::from(data.read_u8().ok()?);
        if size > data.len() || size > 4 {
            return None;
        }
        let (bytes, rest) = data.split_at(size);
        *data = rest;
        Some(
            bytes
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)),
        )
    }

    let mut extra = UnixExtra::default();
    if data.read_u8().ok() != Some(1) {
        return extra;
    }
    extra.uid = read_id(&mut data);
    extra.gid = read_id(&mut data);
    extra
}

/// Extended timestamp: flag bit 0 means a modification time follows.
pub(crate) fn parse_extended_timestamp(mut data: &[u8]) -> Option<SystemTime> {
    let flags = data.read_u8().ok()?;
    if flags & 1 == 0 {
        return None;
    }
    let secs = data.read_i32::<LittleEndian>().ok()?;
    Some(unix_time(i64::from(secs), 0))
}

/// Info-ZIP Unicode path or comment.
///
/// Honoured only when the stored CRC32 matches the header field it
/// replaces, so a stale record left by a renaming tool is ignored.
pub(crate) fn parse_unicode(mut data: &[u8], original: &[u8]) -> Option<String> {
    if data.read_u8().ok()? != 1 {
        return None;
    }
    let crc = data.read_u32::<LittleEndian>().ok()?;
    if crc != crc32fast::hash(original) {
        debug!("unicode extra field does not match header, ignoring");
        return None;
    }
    String::from_utf8(data.to_vec()).ok()
}

/// WinZip AES marker.
pub(crate) fn parse_aes(mut data: &[u8]) -> Option<AesInfo> {
    let version = data.read_u16::<LittleEndian>().ok()?;
    let mut vendor = [0u8; 2];
    data.read_exact(&mut vendor).ok()?;
    if &vendor != b"AE" {
        return None;
    }
    let strength = data.read_u8().ok()?;
    let method = data.read_u16::<LittleEndian>().ok()?;
    Some(AesInfo {
        version,
        strength,
        method,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use std::time::UNIX_EPOCH;

    fn tlv(tag: u16, data: &[u8]) -> Vec<u8> {
        let mut out = tag.to_le_bytes().to_vec();
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_iterates_records() {
        let mut block = tlv(0x1234, b"ab");
        block.extend(tlv(0x5678, b""));
        let fields: Vec<_> = ExtraFields::new(&block).collect();
        assert_eq!(fields, vec![(0x1234, &b"ab"[..]), (0x5678, &b""[..])]);
    }

    #[test]
    fn test_oversized_record_stops_block() {
        let mut block = tlv(0x1111, b"ok");
        block.extend_from_slice(&0x2222u16.to_le_bytes());
        block.extend_from_slice(&100u16.to_le_bytes());
        block.extend_from_slice(b"short");
        let fields: Vec<_> = ExtraFields::new(&block).collect();
        assert_eq!(fields, vec![(0x1111, &b"ok"[..])]);
    }

    #[test]
    fn test_zip64_resolves_only_sentinels() {
        let mut uncompressed = SENTINEL_U32;
        let mut compressed = 10;
        let mut offset = SENTINEL_U32;

        let mut data = 5_000_000_000u64.to_le_bytes().to_vec();
        data.extend_from_slice(&6_000_000_000u64.to_le_bytes());

        apply_zip64(&data, &mut uncompressed, &mut compressed, &mut offset).unwrap();
        assert_eq!(uncompressed, 5_000_000_000);
        assert_eq!(compressed, 10);
        assert_eq!(offset, 6_000_000_000);
    }

    #[test]
    fn test_zip64_missing_value() {
        let mut uncompressed = SENTINEL_U32;
        let mut compressed = SENTINEL_U32;
        let mut offset = 0;
        let data = 1u64.to_le_bytes();
        assert!(apply_zip64(&data, &mut uncompressed, &mut compressed, &mut offset).is_err());
    }

    #[test]
    fn test_ntfs_mtime() {
        // 2001-09-09T01:46:40Z == 1_000_000_000 Unix seconds.
        let ticks = (1_000_000_000 + FILETIME_EPOCH_OFFSET) as u64 * FILETIME_TICKS_PER_SEC;
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&24u16.to_le_bytes());
        data.extend_from_slice(&ticks.to_le_bytes());
        data.extend_from_slice(&[0u8; 16]);

        let mtime = parse_ntfs(&data).unwrap();
        assert_eq!(mtime, UNIX_EPOCH + Duration::from_secs(1_000_000_000));
    }

    #[test]
    fn test_extended_timestamp_flag() {
        let mut data = vec![1u8];
        data.extend_from_slice(&1_234i32.to_le_bytes());
        assert_eq!(
            parse_extended_timestamp(&data),
            Some(UNIX_EPOCH + Duration::from_secs(1_234))
        );
        assert_eq!(parse_extended_timestamp(&[0u8]), None);
    }

    #[test]
    fn test_unix_inline_link() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&77u32.to_le_bytes());
        data.extend_from_slice(&1000u16.to_le_bytes());
        data.extend_from_slice(&100u16.to_le_bytes());
        data.extend_from_slice(b"target.txt");

        let extra = parse_unix(&data);
        assert_eq!(extra.uid, Some(1000));
        assert_eq!(extra.gid, Some(100));
        assert_eq!(extra.link_target.as_deref(), Some(&b"target.txt"[..]));
    }

    #[test]
    fn test_infozip_ids() {
        let data = [1u8, 4, 0xe8, 0x03, 0, 0, 2, 0x64, 0];
        let extra = parse_infozip_ids(&data);
        assert_eq!(extra.uid, Some(1000));
        assert_eq!(extra.gid, Some(100));
    }

    #[test]
    fn test_unicode_path_requires_matching_crc() {
        let original = b"caf\x82.txt";
        let mut data = vec![1u8];
        data.extend_from_slice(&crc32fast::hash(original).to_le_bytes());
        data.extend_from_slice("café.txt".as_bytes());
        assert_eq!(parse_unicode(&data, original).as_deref(), Some("café.txt"));
        assert_eq!(parse_unicode(&data, b"other"), None);
    }

    #[test]
    fn test_aes_marker() {
        let mut data = 2u16.to_le_bytes().to_vec();
        data.extend_from_slice(b"AE");
        data.push(3);
        data.extend_from_slice(&8u16.to_le_bytes());
        assert_eq!(
            parse_aes(&data),
            Some(AesInfo {
                version: 2,
                strength: 3,
                method: 8
            })
        );
    }
}
