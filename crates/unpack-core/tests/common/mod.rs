//! Hand-built archive layouts for integration tests.
//!
//! The `zip` and `tar` crates cover ordinary fixtures; the byte-level
//! builders here produce the cases they will not write (Zip64 sentinels in
//! a tiny archive, PAX overrides that disagree with the header, old GNU
//! sparse headers).

#![allow(dead_code, clippy::cast_possible_truncation)]

use std::io::Cursor;
use std::io::Write;

/// Unix "version made by" (host 3, spec version 2.0).
pub const MADE_BY_UNIX: u16 = (3 << 8) | 20;

/// Zip64 32-bit sentinel.
pub const SENTINEL: u32 = 0xFFFF_FFFF;

/// One STORE entry for [`raw_zip`].
#[derive(Clone)]
pub struct RawZipEntry {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    pub crc: u32,
    pub made_by: u16,
    pub external_attrs: u32,
    pub flags: u16,
    /// Extra field bytes of the central record.
    pub central_extra: Vec<u8>,
    /// Write `0xFFFFFFFF` in both central size fields.
    pub sentinel_sizes: bool,
}

impl RawZipEntry {
    /// A regular file with mode 0644 and a correct CRC.
    pub fn file(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            data: data.to_vec(),
            crc: crc32fast::hash(data),
            made_by: MADE_BY_UNIX,
            external_attrs: 0o100_644 << 16,
            flags: 0,
            central_extra: Vec::new(),
            sentinel_sizes: false,
        }
    }

    /// A directory entry.
    pub fn dir(name: &str) -> Self {
        Self {
            external_attrs: 0o040_755 << 16,
            ..Self::file(name, b"")
        }
    }

    /// A symlink whose body is the target text.
    pub fn symlink(name: &str, target: &str) -> Self {
        Self {
            external_attrs: 0o120_777 << 16,
            ..Self::file(name, target.as_bytes())
        }
    }
}

/// Lays out local headers, the central directory and the EOCD record.
/// `prefix` is written before the archive (an SFX stub); directory offsets
/// stay relative to the archive itself.
pub fn raw_zip(entries: &[RawZipEntry], prefix: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut offsets = Vec::new();

    for entry in entries {
        offsets.push(body.len() as u32);
        put_u32(&mut body, 0x0403_4b50);
        put_u16(&mut body, 20);
        put_u16(&mut body, entry.flags);
        put_u16(&mut body, 0);
        put_u16(&mut body, 0);
        put_u16(&mut body, 0x21);
        put_u32(&mut body, entry.crc);
        put_u32(&mut body, entry.data.len() as u32);
        put_u32(&mut body, entry.data.len() as u32);
        put_u16(&mut body, entry.name.len() as u16);
        put_u16(&mut body, 0);
        body.extend_from_slice(&entry.name);
        body.extend_from_slice(&entry.data);
    }

    let directory_start = body.len() as u32;
    for (entry, offset) in entries.iter().zip(offsets) {
        let size = if entry.sentinel_sizes {
            SENTINEL
        } else {
            entry.data.len() as u32
        };
        put_u32(&mut body, 0x0201_4b50);
        put_u16(&mut body, entry.made_by);
        put_u16(&mut body, 20);
        put_u16(&mut body, entry.flags);
        put_u16(&mut body, 0);
        put_u16(&mut body, 0);
        put_u16(&mut body, 0x21);
        put_u32(&mut body, entry.crc);
        put_u32(&mut body, size);
        put_u32(&mut body, size);
        put_u16(&mut body, entry.name.len() as u16);
        put_u16(&mut body, entry.central_extra.len() as u16);
        put_u16(&mut body, 0);
        put_u16(&mut body, 0);
        put_u16(&mut body, 0);
        put_u32(&mut body, entry.external_attrs);
        put_u32(&mut body, offset);
        body.extend_from_slice(&entry.name);
        body.extend_from_slice(&entry.central_extra);
    }
    let directory_size = body.len() as u32 - directory_start;

    eocd(&mut body, entries.len() as u16, directory_size, directory_start);

    let mut out = prefix.to_vec();
    out.extend(body);
    out
}

/// Appends an end-of-central-directory record.
pub fn eocd(out: &mut Vec<u8>, records: u16, size: u32, offset: u32) {
    put_u32(out, 0x0605_4b50);
    put_u16(out, 0);
    put_u16(out, 0);
    put_u16(out, records);
    put_u16(out, records);
    put_u32(out, size);
    put_u32(out, offset);
    put_u16(out, 0);
}

/// Zip64 extended information extra field with both sizes.
pub fn zip64_sizes_extra(uncompressed: u64, compressed: u64) -> Vec<u8> {
    let mut extra = Vec::new();
    put_u16(&mut extra, 0x0001);
    put_u16(&mut extra, 16);
    extra.extend_from_slice(&uncompressed.to_le_bytes());
    extra.extend_from_slice(&compressed.to_le_bytes());
    extra
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// A 512-byte header block with USTAR or GNU magic and a valid checksum.
pub fn tar_header(name: &str, size: u64, typeflag: u8, gnu: bool) -> [u8; 512] {
    let mut block = [0u8; 512];
    block[..name.len()].copy_from_slice(name.as_bytes());
    octal(&mut block[100..108], 0o644);
    octal(&mut block[108..116], 0);
    octal(&mut block[116..124], 0);
    octal(&mut block[124..136], size);
    octal(&mut block[136..148], 1_600_000_000);
    block[156] = typeflag;
    if gnu {
        block[257..265].copy_from_slice(b"ustar  \0");
    } else {
        block[257..263].copy_from_slice(b"ustar\0");
        block[263..265].copy_from_slice(b"00");
    }
    set_checksum(&mut block);
    block
}

/// Recomputes the header checksum after a field was edited.
pub fn set_checksum(block: &mut [u8; 512]) {
    block[148..156].fill(b' ');
    let sum: u32 = block.iter().map(|&b| u32::from(b)).sum();
    block[148..156].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
}

/// Writes `value` as a NUL-terminated zero-padded octal field.
pub fn octal(field: &mut [u8], value: u64) {
    let digits = field.len() - 1;
    let text = format!("{value:0digits$o}");
    field[..digits].copy_from_slice(text.as_bytes());
    field[digits] = 0;
}

/// One PAX record with a correct length prefix.
pub fn pax_record(key: &str, value: &str) -> String {
    let body = format!(" {key}={value}\n");
    let mut len = body.len() + 1;
    while len.to_string().len() + body.len() != len {
        len += 1;
    }
    format!("{len}{body}")
}

/// Appends `data` padded with zeros to a whole number of blocks.
pub fn push_padded(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
    let rem = data.len() % 512;
    if rem != 0 {
        out.resize(out.len() + 512 - rem, 0);
    }
}

/// Appends the two-block end-of-archive marker.
pub fn push_end(out: &mut Vec<u8>) {
    out.resize(out.len() + 1024, 0);
}

/// Gzip-compresses `data`.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A tar archive of regular files built with the `tar` crate.
pub fn tar_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

/// A stored ZIP archive built with the `zip` crate.
pub fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    for (path, data) in entries {
        zip.start_file(*path, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}
