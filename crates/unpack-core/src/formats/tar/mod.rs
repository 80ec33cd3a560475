//! TAR container: a forward-only header state machine.
//!
//! Each call to [`TarArchive::next_entry`] reads header blocks until one
//! describes a real entry, folding GNU long names, PAX records and sparse
//! maps into it on the way. The entry's data is then available through
//! [`TarArchive::entry_reader`] until the next call.

mod header;
mod pax;
mod sparse;

use std::io::Read;
use std::io::{self};

use tracing::debug;
use tracing::trace;

pub use header::BLOCK_SIZE;
pub use header::Format;
pub use header::TarEntryKind;
pub use header::TarHeader;
pub use pax::PaxRecords;
pub use pax::parse_records as parse_pax_records;
pub use sparse::SparseEntry;
pub use sparse::SparseMap;
pub use sparse::SparseReader;

use crate::ExtractionError;
use crate::Result;
use crate::formats::common::override_if_present;
use crate::formats::detect::read_full;
use header::RawHeader;

/// Largest accepted body of a metadata entry (PAX or GNU long name).
const MAX_META_SIZE: u64 = 1024 * 1024;

/// Returns `true` if `block` is a plausible first tar header: USTAR or GNU
/// magic, or a non-zero V7 block whose checksum verifies.
pub(crate) fn looks_like_tar(block: &[u8]) -> bool {
    let Ok(block) = <&[u8; 512]>::try_from(block) else {
        return false;
    };
    if crate::formats::detect::has_tar_magic(block) {
        return true;
    }
    !header::is_zero_block(block) && header::verify_checksum(block).is_ok()
}

/// A TAR stream being read entry by entry.
///
/// Works over any `Read`, including decompressors, since data that is not
/// consumed is skipped by reading rather than seeking. Global PAX records
/// live in this instance and apply to every later entry.
///
/// # Examples
///
/// ```no_run
/// use std::fs::File;
/// use unpack_core::formats::TarArchive;
///
/// let mut archive = TarArchive::new(File::open("backup.tar")?);
/// while let Some(header) = archive.next_entry()? {
///     println!("{} {}", header.file_mode(), header.name);
/// }
/// # Ok::<(), unpack_core::ExtractionError>(())
/// ```
#[derive(Debug)]
pub struct TarArchive<R> {
    reader: R,
    global: PaxRecords,
    /// Unread stored bytes of the current entry.
    remaining: u64,
    /// Padding after the current entry's data.
    padding: u64,
    /// Sparse map of the current entry.
    sparse: Option<SparseMap>,
    done: bool,
}

impl<R: Read> TarArchive<R> {
    /// Wraps a TAR byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            global: PaxRecords::new(),
            remaining: 0,
            padding: 0,
            sparse: None,
            done: false,
        }
    }

    /// Global PAX records seen so far.
    #[must_use]
    pub fn global_records(&self) -> &PaxRecords {
        &self.global
    }

    /// Advances to the next entry, skipping any unread data of the current
    /// one. Returns `None` at the end-of-archive marker or end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::NotTarFile`] on a header checksum
    /// mismatch, [`ExtractionError::InvalidPax`] for a malformed PAX
    /// record, [`ExtractionError::CorruptSparse`] for a bad sparse map and
    /// [`ExtractionError::InvalidArchive`] for truncated input.
    pub fn next_entry(&mut self) -> Result<Option<TarHeader>> {
        if self.done {
            return Ok(None);
        }
        self.skip_current()?;

        let mut local = PaxRecords::new();
        let mut long_name: Option<String> = None;
        let mut long_link: Option<String> = None;
        let mut saw_pax = false;
        let mut saw_gnu_meta = false;

        loop {
            let Some(block) = self.read_header_block()? else {
                self.done = true;
                return Ok(None);
            };
            header::verify_checksum(&block)?;
            let mut raw = header::parse_block(&block)?;

            match raw.typeflag {
                b'x' | b'X' => {
                    let body = self.read_meta(raw.size)?;
                    local.extend(pax::parse_records(&body)?);
                    saw_pax = true;
                }
                b'g' => {
                    let body = self.read_meta(raw.size)?;
                    pax::merge_global(&mut self.global, pax::parse_records(&body)?);
                    debug!(records = self.global.len(), "global PAX header");
                }
                b'L' => {
                    long_name = Some(meta_string(&self.read_meta(raw.size)?));
                    saw_gnu_meta = true;
                }
                b'K' => {
                    long_link = Some(meta_string(&self.read_meta(raw.size)?));
                    saw_gnu_meta = true;
                }
                _ => {
                    let records = pax::effective(&self.global, local);
                    if saw_pax || !records.is_empty() {
                        raw.format.insert(Format::PAX);
                    }
                    if saw_gnu_meta {
                        raw.format.insert(Format::GNU);
                    }
                    pax::apply(&records, &mut raw)?;
                    let header = self.finish_header(raw, records, long_name, long_link)?;
                    trace!(name = %header.name, size = header.size, typeflag = header.typeflag, "tar entry");
                    return Ok(Some(header));
                }
            }
        }
    }

    /// Returns a reader over the current entry's logical content, with
    /// sparse holes filled with zeros.
    pub fn entry_reader(&mut self) -> Box<dyn Read + '_> {
        match self.sparse.clone() {
            Some(map) => Box::new(SparseReader::new(EntryData { archive: self }, &map)),
            None => Box::new(EntryData { archive: self }),
        }
    }

    /// Consumes the archive and returns the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn skip_current(&mut self) -> Result<()> {
        let pending = self.remaining + self.padding;
        if pending > 0 {
            let skipped = io::copy(&mut (&mut self.reader).take(pending), &mut io::sink())?;
            if skipped != pending {
                return Err(truncated());
            }
        }
        self.remaining = 0;
        self.padding = 0;
        self.sparse = None;
        Ok(())
    }

    /// Reads the next header block. `None` means end of archive: either a
    /// clean end of stream or the zero-block marker.
    fn read_header_block(&mut self) -> Result<Option<[u8; 512]>> {
        let mut block = [0u8; 512];
        match read_full(&mut self.reader, &mut block)? {
            0 => return Ok(None),
            512 => {}
            _ => return Err(truncated()),
        }
        if !header::is_zero_block(&block) {
            return Ok(Some(block));
        }

        let mut second = [0u8; 512];
        match read_full(&mut self.reader, &mut second)? {
            0 => Ok(None),
            512 if header::is_zero_block(&second) => Ok(None),
            _ => Err(ExtractionError::InvalidArchive(
                "data after a single zero block".to_string(),
            )),
        }
    }

    /// Reads the body of a metadata entry together with its padding.
    fn read_meta(&mut self, size: u64) -> Result<Vec<u8>> {
        if size > MAX_META_SIZE {
            return Err(ExtractionError::InvalidArchive(format!(
                "metadata entry of {size} bytes exceeds limit"
            )));
        }
        let mut body = vec![0u8; size as usize];
        if read_full(&mut self.reader, &mut body)? != body.len() {
            return Err(truncated());
        }
        let padding = padding(size);
        let skipped = io::copy(&mut (&mut self.reader).take(padding), &mut io::sink())?;
        if skipped != padding {
            return Err(truncated());
        }
        Ok(body)
    }

    /// Resolves the entry kind, sparse map and sizes, and arms the data
    /// cursor for the entry.
    fn finish_header(
        &mut self,
        mut raw: RawHeader,
        records: PaxRecords,
        long_name: Option<String>,
        long_link: Option<String>,
    ) -> Result<TarHeader> {
        let physical = raw.size;
        let mut stored = physical;
        let mut sparse = None;

        match raw.typeflag {
            b'S' => {
                let mut regions = std::mem::take(&mut raw.gnu_sparse);
                if raw.gnu_extended {
                    regions.extend(sparse::read_gnu_extensions(&mut self.reader)?);
                }
                sparse = Some(SparseMap::new(regions, raw.gnu_realsize, stored)?);
            }
            b'0' | 0 | b'7' => {
                if let Some(regions) = self.pax_sparse(&records, &mut stored)? {
                    let real_size = pax::number(&records, pax::GNU_SPARSE_REALSIZE)?
                        .or(pax::number(&records, pax::GNU_SPARSE_SIZE)?)
                        .ok_or_else(|| {
                            ExtractionError::CorruptSparse(
                                "sparse entry without a real size".to_string(),
                            )
                        })?;
                    sparse = Some(SparseMap::new(regions, real_size, stored)?);
                    override_if_present(&mut raw.name, records.get(pax::GNU_SPARSE_NAME).cloned());
                }
            }
            _ => {}
        }

        override_if_present(&mut raw.name, long_name);
        override_if_present(&mut raw.linkname, long_link);

        let kind = match raw.typeflag {
            0 if raw.name.ends_with('/') => TarEntryKind::Directory,
            b'0' | 0 | b'7' | b'S' => TarEntryKind::File { sparse },
            b'1' => TarEntryKind::Hardlink {
                target: raw.linkname.clone(),
            },
            b'2' => TarEntryKind::Symlink {
                target: raw.linkname.clone(),
            },
            b'3' => TarEntryKind::CharDevice {
                major: raw.devmajor,
                minor: raw.devminor,
            },
            b'4' => TarEntryKind::BlockDevice {
                major: raw.devmajor,
                minor: raw.devminor,
            },
            b'5' | b'D' => TarEntryKind::Directory,
            b'6' => TarEntryKind::Fifo,
            typeflag => TarEntryKind::Other { typeflag },
        };

        // A GNU dumpdir stores its directory listing as data.
        let header_only = kind.is_header_only() && raw.typeflag != b'D';
        self.remaining = if header_only { 0 } else { stored };
        self.padding = if header_only { 0 } else { padding(physical) };
        self.sparse = match &kind {
            TarEntryKind::File { sparse } => sparse.clone(),
            _ => None,
        };

        let size = self
            .sparse
            .as_ref()
            .map_or(self.remaining, |map| map.real_size);
        Ok(TarHeader {
            xattrs: pax::xattrs(&records),
            name: raw.name,
            kind,
            typeflag: raw.typeflag,
            size,
            mode: raw.mode,
            uid: raw.uid,
            gid: raw.gid,
            uname: raw.uname,
            gname: raw.gname,
            modified: raw.modified,
            accessed: raw.accessed,
            changed: raw.changed,
            pax_records: records,
            format: raw.format,
        })
    }

    /// Decodes a PAX-described sparse map (formats 0.0, 0.1 and 1.0).
    ///
    /// Format 1.0 reads its map from the data stream, shrinking `stored`
    /// by the bytes consumed.
    fn pax_sparse(
        &mut self,
        records: &PaxRecords,
        stored: &mut u64,
    ) -> Result<Option<Vec<SparseEntry>>> {
        let major = records.get(pax::GNU_SPARSE_MAJOR).map(String::as_str);
        let minor = records.get(pax::GNU_SPARSE_MINOR).map(String::as_str);
        if major == Some("1") && minor == Some("0") {
            let (regions, consumed) =
                sparse::read_data_map(&mut (&mut self.reader).take(*stored))?;
            *stored = stored.checked_sub(consumed).ok_or_else(|| {
                ExtractionError::CorruptSparse("sparse map larger than entry".to_string())
            })?;
            return Ok(Some(regions));
        }
        records
            .get(pax::GNU_SPARSE_MAP)
            .map(|map| sparse::parse_pax_map(map))
            .transpose()
    }
}

/// Reader over the stored bytes of the current entry.
struct EntryData<'a, R> {
    archive: &'a mut TarArchive<R>,
}

impl<R: Read> Read for EntryData<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.archive.remaining;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self.archive.reader.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ends inside entry data",
            ));
        }
        self.archive.remaining -= n as u64;
        Ok(n)
    }
}

fn padding(size: u64) -> u64 {
    (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE
}

fn meta_string(body: &[u8]) -> String {
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    String::from_utf8_lossy(&body[..end]).into_owned()
}

fn truncated() -> ExtractionError {
    ExtractionError::InvalidArchive("unexpected end of tar archive".to_string())
}
