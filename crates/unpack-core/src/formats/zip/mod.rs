//! ZIP container: central-directory parsing and entry decompression.
//!
//! Opening an archive reads only the end-of-central-directory record and
//! the directory itself. Entry bodies are decoded on demand, one at a
//! time, through [`ZipArchive::entry_reader`].

mod codec;
mod directory;
mod entry;
mod extra;

use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use tracing::debug;

pub use codec::CompressionMethod;
pub use directory::DirectoryEnd;
pub use directory::locate as locate_directory_end;
pub use entry::Creator;
pub use entry::FLAG_DATA_DESCRIPTOR;
pub use entry::FLAG_ENCRYPTED;
pub use entry::FLAG_UTF8;
pub use entry::ZipEntry;
pub use extra::AesInfo;

use crate::ExtractionError;
use crate::Result;
use crate::copy::CopyBuffer;
use crate::copy::copy_chunked;
use crate::copy::copy_with_buffer;
use crate::copy::unwrap_io;
use crate::io::Crc32Reader;

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const LOCAL_HEADER_LEN: u64 = 30;

/// Upper bound for a symlink body.
const MAX_LINK_LEN: u64 = 64 * 1024;

/// A parsed ZIP archive.
///
/// Owns the underlying reader; every decompression seeks it to the entry's
/// local header, so entries may be read in any order.
///
/// # Examples
///
/// ```no_run
/// use std::fs::File;
/// use unpack_core::formats::ZipArchive;
///
/// let mut archive = ZipArchive::new(File::open("bundle.zip")?)?;
/// for entry in archive.entries() {
///     println!("{} ({} bytes)", entry.name, entry.uncompressed_size);
/// }
/// let mut first = Vec::new();
/// archive.decompress(0, &mut first)?;
/// # Ok::<(), unpack_core::ExtractionError>(())
/// ```
#[derive(Debug)]
pub struct ZipArchive<R> {
    reader: R,
    entries: Vec<ZipEntry>,
    base_offset: u64,
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Parses the central directory of `reader`.
    ///
    /// Data prepended to the archive (a self-extractor stub, for example)
    /// is detected from the directory position and skipped transparently.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::NotAValidZip`] if no end-of-directory
    /// record exists and [`ExtractionError::InvalidArchive`] for any
    /// structural inconsistency.
    pub fn new(mut reader: R) -> Result<Self> {
        let end = directory::locate(&mut reader)?;
        let entries = directory::read_entries(&mut reader, &end)?;
        let base_offset = end.base_offset();
        debug!(entries = entries.len(), base_offset, "opened zip archive");
        Ok(Self {
            reader,
            entries,
            base_offset,
        })
    }

    /// Directory entries in archive order.
    #[must_use]
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the archive has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Length of the data in front of the archive.
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Returns a reader yielding the decoded body of entry `index`.
    ///
    /// The reader fails at end of stream if the decoded length differs
    /// from the directory or the CRC32 does not match.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Encrypted`] for encrypted entries,
    /// [`ExtractionError::UnsupportedMethod`] for methods this build cannot
    /// decode, and [`ExtractionError::InvalidArchive`] if the local header
    /// is missing.
    pub fn entry_reader(&mut self, index: usize) -> Result<Box<dyn Read + '_>> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| ExtractionError::InvalidArchive(format!("no entry at index {index}")))?;
        if entry.is_encrypted() {
            return Err(ExtractionError::Encrypted {
                name: entry.name.clone(),
            });
        }
        if !entry.method.is_supported() {
            return Err(ExtractionError::UnsupportedMethod {
                method: entry.method.as_u16(),
            });
        }

        let local = self
            .base_offset
            .checked_add(entry.position)
            .ok_or_else(|| ExtractionError::InvalidArchive("entry offset overflows".to_string()))?;
        self.reader.seek(SeekFrom::Start(local))?;
        if self.reader.read_u32::<LittleEndian>()? != LOCAL_HEADER_SIGNATURE {
            return Err(ExtractionError::InvalidArchive(format!(
                "bad local header signature for {}",
                entry.name
            )));
        }
        self.reader
            .seek(SeekFrom::Start(local + LOCAL_HEADER_LEN - 4))?;
        let name_len = i64::from(self.reader.read_u16::<LittleEndian>()?);
        let extra_len = i64::from(self.reader.read_u16::<LittleEndian>()?);
        self.reader.seek(SeekFrom::Current(name_len + extra_len))?;

        // Sizes come from the central directory, so entries written with a
        // trailing data descriptor need no special handling.
        let raw = (&mut self.reader).take(entry.compressed_size);
        let decoded = codec::decoder(entry.method, entry.flags, entry.uncompressed_size, raw)?
            .take(entry.uncompressed_size.saturating_add(1));
        let checked = Crc32Reader::new(decoded, entry.crc32, entry.name.clone())
            .with_expected_len(entry.uncompressed_size);
        Ok(Box::new(checked))
    }

    /// Streams the decoded body of entry `index` into `sink`.
    ///
    /// # Errors
    ///
    /// See [`ZipArchive::entry_reader`]; also fails on I/O errors and CRC
    /// mismatch.
    pub fn decompress<W: Write + ?Sized>(&mut self, index: usize, sink: &mut W) -> Result<u64> {
        let mut reader = self.entry_reader(index)?;
        copy_with_buffer(&mut reader, sink, &mut CopyBuffer::new())
    }

    /// Like [`ZipArchive::decompress`], reusing `buffer` and reporting each
    /// chunk to `on_chunk`, which may cancel by returning `false`.
    ///
    /// # Errors
    ///
    /// See [`ZipArchive::decompress`]; returns
    /// [`ExtractionError::Cancelled`] when `on_chunk` asks to stop.
    pub fn decompress_with<W, F>(
        &mut self,
        index: usize,
        sink: &mut W,
        buffer: &mut CopyBuffer,
        on_chunk: F,
    ) -> Result<u64>
    where
        W: Write + ?Sized,
        F: FnMut(u64) -> bool,
    {
        let mut reader = self.entry_reader(index)?;
        copy_chunked(&mut reader, sink, buffer, on_chunk)
    }

    /// Returns the target of symlink entry `index`, reading it from the
    /// entry body the first time and caching it on the entry.
    ///
    /// # Errors
    ///
    /// Fails if the body cannot be decoded or exceeds 64 KiB.
    pub fn read_link(&mut self, index: usize) -> Result<String> {
        if let Some(target) = self.entries.get(index).and_then(|e| e.link_name.clone()) {
            return Ok(target);
        }
        let mut body = Vec::new();
        self.entry_reader(index)?
            .take(MAX_LINK_LEN + 1)
            .read_to_end(&mut body)
            .map_err(unwrap_io)?;
        if body.len() as u64 > MAX_LINK_LEN {
            return Err(ExtractionError::InvalidArchive(format!(
                "symlink target of entry {index} is too long"
            )));
        }
        let target = entry::decode_link_target(&body);
        if let Some(entry) = self.entries.get_mut(index) {
            entry.link_name = Some(target.clone());
        }
        Ok(target)
    }

    /// Consumes the archive and returns the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
