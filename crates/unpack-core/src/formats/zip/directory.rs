//! Locating and reading the central directory.

use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use tracing::debug;
use tracing::trace;

use super::codec::CompressionMethod;
use super::entry::Creator;
use super::entry::ZipEntry;
use super::entry::derive_mode;
use super::entry::dos_to_system_time;
use super::extra;
use super::extra::ExtraFields;
use crate::ExtractionError;
use crate::Result;
use crate::formats::common::decode_name;
use crate::formats::common::override_if_present;
use crate::formats::detect::read_full;

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const EOCD_LEN: usize = 22;
const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
const ZIP64_LOCATOR_LEN: u64 = 20;
const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;
const ZIP64_EOCD_LEN: u64 = 56;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const CENTRAL_HEADER_LEN: u64 = 46;

/// Window sizes for the backward EOCD search: a cheap first try, then one
/// large enough for a maximal 64 KiB comment.
const SEARCH_WINDOWS: [u64; 2] = [1024, 65 * 1024];

/// End-of-central-directory record, upgraded from its Zip64 counterpart
/// when any field holds a sentinel.
///
/// Exists only while opening an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEnd {
    /// Number of the disk holding this record.
    pub disk_number: u32,
    /// Disk on which the directory starts.
    pub directory_disk: u32,
    /// Directory records on this disk.
    pub disk_records: u64,
    /// Total directory records.
    pub directory_records: u64,
    /// Directory size in bytes.
    pub directory_size: u64,
    /// Directory offset, relative to the archive start.
    pub directory_offset: u64,
    /// Archive comment length.
    pub comment_len: u16,
    /// Absolute position of the record the directory sits directly
    /// in front of (the Zip64 record when one was used).
    pub record_position: u64,
}

impl DirectoryEnd {
    fn needs_zip64(&self) -> bool {
        self.directory_records == 0xFFFF
            || self.directory_size == 0xFFFF_FFFF
            || self.directory_offset == 0xFFFF_FFFF
    }

    /// Offset that must be added to every stored offset: the length of
    /// anything prepended to the archive, such as a self-extractor stub.
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.record_position
            .saturating_sub(self.directory_size)
            .saturating_sub(self.directory_offset)
    }
}

/// Finds and validates the end-of-central-directory record.
///
/// # Errors
///
/// Returns [`ExtractionError::NotAValidZip`] when no record is found and
/// [`ExtractionError::InvalidArchive`] when its fields contradict the file
/// size.
pub fn locate<R: Read + Seek>(reader: &mut R) -> Result<DirectoryEnd> {
    let size = reader.seek(SeekFrom::End(0))?;
    let mut found = None;

    for window in SEARCH_WINDOWS {
        let window = window.min(size);
        let start = size - window;
        reader.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; window as usize];
        let n = read_full(reader, &mut buf)?;
        buf.truncate(n);

        if let Some(pos) = find_signature(&buf) {
            found = Some((start + pos as u64, parse_eocd(&buf[pos..])?));
            break;
        }
        if window == size {
            break;
        }
    }

    let Some((position, mut end)) = found else {
        return Err(ExtractionError::NotAValidZip);
    };
    end.record_position = position;
    trace!(position, records = end.directory_records, "found end of central directory");

    if end.needs_zip64() {
        upgrade_zip64(reader, position, &mut end)?;
    }

    validate(&end, size)?;
    Ok(end)
}

/// Scans backwards for the EOCD signature whose comment length fits in the
/// bytes that follow it.
fn find_signature(buf: &[u8]) -> Option<usize> {
    if buf.len() < EOCD_LEN {
        return None;
    }
    let signature = EOCD_SIGNATURE.to_le_bytes();
    (0..=buf.len() - EOCD_LEN).rev().find(|&i| {
        buf[i..i + 4] == signature && {
            let comment_len = usize::from(u16::from_le_bytes([buf[i + 20], buf[i + 21]]));
            i + EOCD_LEN + comment_len <= buf.len()
        }
    })
}

fn parse_eocd(mut record: &[u8]) -> Result<DirectoryEnd> {
    let _signature = record.read_u32::<LittleEndian>()?;
    Ok(DirectoryEnd {
        disk_number: u32::from(record.read_u16::<LittleEndian>()?),
        directory_disk: u32::from(record.read_u16::<LittleEndian>()?),
        disk_records: u64::from(record.read_u16::<LittleEndian>()?),
        directory_records: u64::from(record.read_u16::<LittleEndian>()?),
        directory_size: u64::from(record.read_u32::<LittleEndian>()?),
        directory_offset: u64::from(record.read_u32::<LittleEndian>()?),
        comment_len: record.read_u16::<LittleEndian>()?,
        record_position: 0,
    })
}

/// Replaces sentinel fields with the Zip64 end record, if a locator sits
/// directly in front of the classic record.
fn upgrade_zip64<R: Read + Seek>(
    reader: &mut R,
    eocd_position: u64,
    end: &mut DirectoryEnd,
) -> Result<()> {
    let Some(locator_position) = eocd_position.checked_sub(ZIP64_LOCATOR_LEN) else {
        return Ok(());
    };
    reader.seek(SeekFrom::Start(locator_position))?;
    if reader.read_u32::<LittleEndian>()? != ZIP64_LOCATOR_SIGNATURE {
        debug!("sentinel values without a zip64 locator, using classic record");
        return Ok(());
    }
    let _disk = reader.read_u32::<LittleEndian>()?;
    let record_offset = reader.read_u64::<LittleEndian>()?;
    let total_disks = reader.read_u32::<LittleEndian>()?;
    if total_disks > 1 {
        return Err(ExtractionError::InvalidArchive(
            "multi-disk archives are not supported".to_string(),
        ));
    }

    // The locator's offset is relative to the archive start; with a stub in
    // front the record is found directly ahead of the locator instead.
    let mut record_position = None;
    for candidate in [record_offset, locator_position.saturating_sub(ZIP64_EOCD_LEN)] {
        reader.seek(SeekFrom::Start(candidate))?;
        if reader.read_u32::<LittleEndian>().ok() == Some(ZIP64_EOCD_SIGNATURE) {
            record_position = Some(candidate);
            break;
        }
    }
    let Some(record_position) = record_position else {
        return Err(ExtractionError::InvalidArchive(
            "zip64 end of central directory record not found".to_string(),
        ));
    };

    let _record_size = reader.read_u64::<LittleEndian>()?;
    let _version_made_by = reader.read_u16::<LittleEndian>()?;
    let _version_needed = reader.read_u16::<LittleEndian>()?;
    end.disk_number = reader.read_u32::<LittleEndian>()?;
    end.directory_disk = reader.read_u32::<LittleEndian>()?;
    end.disk_records = reader.read_u64::<LittleEndian>()?;
    end.directory_records = reader.read_u64::<LittleEndian>()?;
    end.directory_size = reader.read_u64::<LittleEndian>()?;
    end.directory_offset = reader.read_u64::<LittleEndian>()?;
    end.record_position = record_position;
    debug!(records = end.directory_records, "using zip64 end of central directory");
    Ok(())
}

fn validate(end: &DirectoryEnd, file_size: u64) -> Result<()> {
    let base = end.base_offset();
    let directory_end = base
        .checked_add(end.directory_offset)
        .and_then(|v| v.checked_add(end.directory_size));
    if directory_end.is_none_or(|v| v > file_size) {
        return Err(ExtractionError::InvalidArchive(format!(
            "central directory at {} with size {} exceeds {file_size}-byte file",
            end.directory_offset, end.directory_size
        )));
    }
    if end
        .directory_records
        .checked_mul(CENTRAL_HEADER_LEN)
        .is_none_or(|v| v > file_size)
    {
        return Err(ExtractionError::InvalidArchive(format!(
            "TOC declares impossible {} files in {file_size}-byte zip",
            end.directory_records
        )));
    }
    Ok(())
}

/// Reads `end.directory_records` central-directory records.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidArchive`] on a bad record signature or
/// an inconsistent Zip64 record.
pub fn read_entries<R: Read + Seek>(reader: &mut R, end: &DirectoryEnd) -> Result<Vec<ZipEntry>> {
    reader.seek(SeekFrom::Start(end.base_offset() + end.directory_offset))?;
    let mut reader = BufReader::new(reader);
    let mut entries = Vec::with_capacity(end.directory_records.min(65_536) as usize);
    for index in 0..end.directory_records {
        let entry = read_entry(&mut reader).map_err(|e| match e {
            ExtractionError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                ExtractionError::InvalidArchive(format!("central directory truncated at record {index}"))
            }
            other => other,
        })?;
        trace!(name = %entry.name, size = entry.uncompressed_size, "directory record");
        entries.push(entry);
    }
    Ok(entries)
}

fn read_entry<R: Read>(reader: &mut R) -> Result<ZipEntry> {
    if reader.read_u32::<LittleEndian>()? != CENTRAL_HEADER_SIGNATURE {
        return Err(ExtractionError::InvalidArchive(
            "bad central directory record signature".to_string(),
        ));
    }
    let version_made_by = reader.read_u16::<LittleEndian>()?;
    let _version_needed = reader.read_u16::<LittleEndian>()?;
    let flags = reader.read_u16::<LittleEndian>()?;
    let method = reader.read_u16::<LittleEndian>()?;
    let mod_time = reader.read_u16::<LittleEndian>()?;
    let mod_date = reader.read_u16::<LittleEndian>()?;
    let crc32 = reader.read_u32::<LittleEndian>()?;
    let mut compressed_size = u64::from(reader.read_u32::<LittleEndian>()?);
    let mut uncompressed_size = u64::from(reader.read_u32::<LittleEndian>()?);
    let name_len = usize::from(reader.read_u16::<LittleEndian>()?);
    let extra_len = usize::from(reader.read_u16::<LittleEndian>()?);
    let comment_len = usize::from(reader.read_u16::<LittleEndian>()?);
    let _disk_start = reader.read_u16::<LittleEndian>()?;
    let _internal_attrs = reader.read_u16::<LittleEndian>()?;
    let external_attrs = reader.read_u32::<LittleEndian>()?;
    let mut position = u64::from(reader.read_u32::<LittleEndian>()?);

    let mut raw_name = vec![0u8; name_len];
    reader.read_exact(&mut raw_name)?;
    let mut extra_data = vec![0u8; extra_len];
    reader.read_exact(&mut extra_data)?;
    let mut raw_comment = vec![0u8; comment_len];
    reader.read_exact(&mut raw_comment)?;

    let is_utf8 = flags & super::entry::FLAG_UTF8 != 0;
    let creator = Creator::from_version_made_by(version_made_by);
    let mode = derive_mode(creator, external_attrs, &raw_name);

    let mut entry = ZipEntry {
        name: decode_name(&raw_name, is_utf8),
        comment: decode_name(&raw_comment, is_utf8),
        raw_name,
        link_name: None,
        compressed_size: 0,
        uncompressed_size: 0,
        position: 0,
        modified: dos_to_system_time(mod_date, mod_time),
        crc32,
        mode,
        method: CompressionMethod::from_u16(method),
        flags,
        version_made_by,
        external_attrs,
        uid: None,
        gid: None,
        aes: None,
    };

    let mut modified = None;
    for (tag, data) in ExtraFields::new(&extra_data) {
        match tag {
            extra::ZIP64 => extra::apply_zip64(
                data,
                &mut uncompressed_size,
                &mut compressed_size,
                &mut position,
            )?,
            extra::NTFS => {
                override_if_present(&mut modified, extra::parse_ntfs(data).map(Some));
            }
            extra::EXTENDED_TIMESTAMP => {
                override_if_present(&mut modified, extra::parse_extended_timestamp(data).map(Some));
            }
            extra::UNIX | extra::INFOZIP_UNIX | extra::INFOZIP_UNIX_IDS => {
                let unix = match tag {
                    extra::UNIX => extra::parse_unix(data),
                    extra::INFOZIP_UNIX => extra::parse_infozip_unix(data),
                    _ => extra::parse_infozip_ids(data),
                };
                override_if_present(&mut modified, unix.modified.map(Some));
                override_if_present(&mut entry.uid, unix.uid.map(Some));
                override_if_present(&mut entry.gid, unix.gid.map(Some));
                if entry.is_symlink() {
                    override_if_present(
                        &mut entry.link_name,
                        unix.link_target
                            .map(|t| Some(String::from_utf8_lossy(&t).into_owned())),
                    );
                }
            }
            extra::UNICODE_PATH if !is_utf8 => {
                override_if_present(&mut entry.name, extra::parse_unicode(data, &entry.raw_name));
            }
            extra::UNICODE_COMMENT if !is_utf8 => {
                override_if_present(&mut entry.comment, extra::parse_unicode(data, &raw_comment));
            }
            extra::AES => {
                entry.aes = extra::parse_aes(data);
                if let Some(aes) = entry.aes {
                    entry.method = CompressionMethod::from_u16(aes.method);
                }
            }
            _ => {}
        }
    }

    override_if_present(&mut entry.modified, modified);
    entry.compressed_size = compressed_size;
    entry.uncompressed_size = uncompressed_size;
    entry.position = position;
    Ok(entry)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::formats::ZipArchive;
    use crate::test_utils::ZipTestBuilder;
    use std::io::Cursor;

    fn eocd(records: u16, size: u32, offset: u32, comment: &[u8]) -> Vec<u8> {
        let mut out = EOCD_SIGNATURE.to_le_bytes().to_vec();
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&records.to_le_bytes());
        out.extend_from_slice(&records.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        out.extend_from_slice(comment);
        out
    }

    /// Rewrites a small archive so that its classic record only holds
    /// sentinels and the real values live in a Zip64 record and locator.
    fn zip64_layout(stub_len: usize, total_disks: u32) -> Vec<u8> {
        let classic = ZipTestBuilder::new().add_file("a.txt", b"hi").build();
        let (body, record) = classic.split_at(classic.len() - EOCD_LEN);
        let end = parse_eocd(record).unwrap();

        let mut out = vec![0x90u8; stub_len];
        out.extend_from_slice(body);
        let zip64_offset = body.len() as u64;

        out.extend_from_slice(&ZIP64_EOCD_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&(ZIP64_EOCD_LEN - 12).to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&end.disk_records.to_le_bytes());
        out.extend_from_slice(&end.directory_records.to_le_bytes());
        out.extend_from_slice(&end.directory_size.to_le_bytes());
        out.extend_from_slice(&end.directory_offset.to_le_bytes());

        out.extend_from_slice(&ZIP64_LOCATOR_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&zip64_offset.to_le_bytes());
        out.extend_from_slice(&total_disks.to_le_bytes());

        out.extend(eocd(0xFFFF, 0xFFFF_FFFF, 0xFFFF_FFFF, b""));
        out
    }

    #[test]
    fn test_zip64_end_record_replaces_sentinels() {
        let data = zip64_layout(0, 1);
        let mut cursor = Cursor::new(data.clone());
        let end = locate(&mut cursor).unwrap();
        assert_eq!(end.directory_records, 1);
        assert_ne!(end.directory_size, 0xFFFF_FFFF);
        assert_ne!(end.directory_offset, 0xFFFF_FFFF);
        assert_eq!(end.base_offset(), 0);

        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut out = Vec::new();
        archive.decompress(0, &mut out).unwrap();
        assert_eq!(out, b"hi");
    }

    #[test]
    fn test_zip64_record_found_behind_stub() {
        let data = zip64_layout(300, 1);
        let end = locate(&mut Cursor::new(data.clone())).unwrap();
        assert_eq!(end.directory_records, 1);
        assert_eq!(end.base_offset(), 300);

        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut out = Vec::new();
        archive.decompress(0, &mut out).unwrap();
        assert_eq!(out, b"hi");
    }

    #[test]
    fn test_zip64_multi_disk_rejected() {
        let err = locate(&mut Cursor::new(zip64_layout(0, 2))).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidArchive(ref m) if m.contains("multi-disk")));
    }

    #[test]
    fn test_empty_archive() {
        let mut data = Cursor::new(eocd(0, 0, 0, b""));
        let end = locate(&mut data).unwrap();
        assert_eq!(end.directory_records, 0);
        assert_eq!(end.base_offset(), 0);
        assert!(read_entries(&mut data, &end).unwrap().is_empty());
    }

    #[test]
    fn test_long_comment_needs_second_window() {
        let comment = vec![b'c'; 4000];
        let mut data = Cursor::new(eocd(0, 0, 0, &comment));
        let end = locate(&mut data).unwrap();
        assert_eq!(end.comment_len, 4000);
    }

    #[test]
    fn test_signature_inside_comment_is_rejected_by_length() {
        // A fake record in the comment claims a comment longer than what
        // follows it, so the real record is chosen.
        let fake = eocd(9, 0, 0, b"");
        let mut fake_with_len = fake.clone();
        fake_with_len[20] = 0xff;
        let mut data = Cursor::new(eocd(0, 0, 0, &fake_with_len));
        let end = locate(&mut data).unwrap();
        assert_eq!(end.directory_records, 0);
    }

    #[test]
    fn test_no_signature() {
        let mut data = Cursor::new(vec![0u8; 100]);
        assert!(matches!(locate(&mut data), Err(ExtractionError::NotAValidZip)));
    }

    #[test]
    fn test_impossible_toc() {
        let mut data = Cursor::new(eocd(1000, 0, 0, b""));
        let err = locate(&mut data).unwrap_err();
        assert!(err.to_string().contains("TOC declares impossible 1000 files in 22-byte zip"));
    }

    #[test]
    fn test_directory_past_end_of_file() {
        let mut data = Cursor::new(eocd(0, 100, 0, b""));
        assert!(matches!(locate(&mut data), Err(ExtractionError::InvalidArchive(_))));
    }
}
