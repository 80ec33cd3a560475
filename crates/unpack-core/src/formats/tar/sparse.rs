//! GNU sparse files: map decoding and hole-filling reconstruction.
//!
//! Three encodings exist. The old GNU format stores `(offset, numbytes)`
//! pairs in the header and chained 512-byte extension blocks. PAX format
//! 0.1 stores the same pairs as one comma-separated record. PAX format 1.0
//! prepends a decimal, newline-separated map to the entry data.

use std::io::Read;
use std::io::{self};

use super::header::BLOCK_SIZE;
use super::header::parse_numeric;
use crate::ExtractionError;
use crate::Result;
use crate::formats::detect::read_full;

/// Pairs stored inline in an old GNU header.
pub(crate) const INLINE_PAIRS: usize = 4;
/// Pairs per old GNU extension block.
pub(crate) const EXTENSION_PAIRS: usize = 21;

/// Upper bound on the number of regions in one map.
const MAX_REGIONS: usize = 1 << 20;

/// One populated region of a sparse file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseEntry {
    /// Logical offset of the region.
    pub offset: u64,
    /// Length of the region.
    pub length: u64,
}

impl SparseEntry {
    /// Logical end offset.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Reconstruction data of a sparse file.
///
/// `regions` is ordered, non-overlapping, and its last entry ends exactly
/// at `real_size` (a zero-length marker is appended when the file ends in
/// a hole).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseMap {
    /// Populated regions.
    pub regions: Vec<SparseEntry>,
    /// Logical file size.
    pub real_size: u64,
    /// Bytes physically stored in the archive.
    pub stored_size: u64,
}

impl SparseMap {
    /// Validates `regions` against `real_size` and normalizes the tail.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::CorruptSparse`] if regions are out of
    /// order, overlap, overflow, or extend past `real_size`.
    pub fn new(mut regions: Vec<SparseEntry>, real_size: u64, stored_size: u64) -> Result<Self> {
        let mut last_end = 0u64;
        let mut populated = 0u64;
        for region in &regions {
            let end = region.offset.checked_add(region.length).ok_or_else(|| {
                ExtractionError::CorruptSparse("region end overflows".to_string())
            })?;
            if region.offset < last_end {
                return Err(ExtractionError::CorruptSparse(
                    "regions overlap or are out of order".to_string(),
                ));
            }
            if end > real_size {
                return Err(ExtractionError::CorruptSparse(format!(
                    "region ends at {end}, past file size {real_size}"
                )));
            }
            last_end = end;
            populated += region.length;
        }
        if populated != stored_size {
            return Err(ExtractionError::CorruptSparse(format!(
                "map describes {populated} bytes but {stored_size} are stored"
            )));
        }
        if regions.last().is_none_or(|r| r.end() != real_size) {
            regions.push(SparseEntry {
                offset: real_size,
                length: 0,
            });
        }
        Ok(Self {
            regions,
            real_size,
            stored_size,
        })
    }
}

/// Decodes up to `field.len() / 24` pairs of 12-byte numeric fields,
/// stopping at the first empty pair.
pub(crate) fn parse_pairs(field: &[u8]) -> Result<Vec<SparseEntry>> {
    let mut regions = Vec::new();
    for pair in field.chunks_exact(24) {
        if pair[0] == 0 && pair[12] == 0 {
            break;
        }
        regions.push(SparseEntry {
            offset: to_u64(parse_numeric(&pair[..12])?)?,
            length: to_u64(parse_numeric(&pair[12..])?)?,
        });
    }
    Ok(regions)
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| ExtractionError::CorruptSparse("negative value".to_string()))
}

/// Follows the chain of old GNU extension blocks.
///
/// Returns the additional regions.
pub(crate) fn read_gnu_extensions<R: Read>(reader: &mut R) -> Result<Vec<SparseEntry>> {
    let mut regions = Vec::new();
    let mut block = [0u8; BLOCK_SIZE as usize];
    loop {
        if read_full(reader, &mut block)? != block.len() {
            return Err(ExtractionError::CorruptSparse(
                "archive ends inside sparse extension".to_string(),
            ));
        }
        let pairs = parse_pairs(&block[..EXTENSION_PAIRS * 24])?;
        regions.extend(pairs);
        if regions.len() > MAX_REGIONS {
            return Err(ExtractionError::CorruptSparse("too many regions".to_string()));
        }
        if block[EXTENSION_PAIRS * 24] == 0 {
            return Ok(regions);
        }
    }
}

/// Parses the PAX format 0.1 map: `offset,length,offset,length,...`.
///
/// An odd number of values is a corrupt map.
pub(crate) fn parse_pax_map(map: &str) -> Result<Vec<SparseEntry>> {
    if map.is_empty() {
        return Ok(Vec::new());
    }
    let values = map
        .split(',')
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| ExtractionError::CorruptSparse(format!("invalid map value {v:?}")))
        })
        .collect::<Result<Vec<_>>>()?;
    if values.len() % 2 != 0 {
        return Err(ExtractionError::CorruptSparse(
            "map has an odd number of values".to_string(),
        ));
    }
    Ok(values
        .chunks_exact(2)
        .map(|pair| SparseEntry {
            offset: pair[0],
            length: pair[1],
        })
        .collect())
}

/// Reads a PAX format 1.0 map from the head of the entry data.
///
/// Returns the regions and the number of data bytes consumed (a multiple
/// of the block size).
pub(crate) fn read_data_map<R: Read>(reader: &mut R) -> Result<(Vec<SparseEntry>, u64)> {
    let mut lines = DataMapLines {
        reader,
        block: Vec::new(),
        position: 0,
        consumed: 0,
    };
    let count = lines.next_number()?;
    if count > MAX_REGIONS as u64 {
        return Err(ExtractionError::CorruptSparse("too many regions".to_string()));
    }
    let mut regions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let offset = lines.next_number()?;
        let length = lines.next_number()?;
        regions.push(SparseEntry { offset, length });
    }
    Ok((regions, lines.consumed))
}

/// Newline-terminated decimal numbers read block by block.
struct DataMapLines<'a, R> {
    reader: &'a mut R,
    block: Vec<u8>,
    position: usize,
    consumed: u64,
}

impl<R: Read> DataMapLines<'_, R> {
    fn next_number(&mut self) -> Result<u64> {
        let mut digits = Vec::new();
        loop {
            if self.position == self.block.len() {
                self.block = vec![0u8; BLOCK_SIZE as usize];
                if read_full(self.reader, &mut self.block)? != self.block.len() {
                    return Err(ExtractionError::CorruptSparse(
                        "entry ends inside sparse map".to_string(),
                    ));
                }
                self.position = 0;
                self.consumed += BLOCK_SIZE;
            }
            let byte = self.block[self.position];
            self.position += 1;
            match byte {
                b'\n' => break,
                b'0'..=b'9' if digits.len() < 20 => digits.push(byte),
                _ => {
                    return Err(ExtractionError::CorruptSparse(
                        "invalid sparse map line".to_string(),
                    ));
                }
            }
        }
        std::str::from_utf8(&digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ExtractionError::CorruptSparse("empty sparse map line".to_string()))
    }
}

/// Expands the stored regions of a sparse file back to its logical size,
/// producing zeros for every hole.
#[derive(Debug)]
pub struct SparseReader<R> {
    inner: R,
    regions: Vec<SparseEntry>,
    index: usize,
    position: u64,
    size: u64,
}

impl<R: Read> SparseReader<R> {
    /// Wraps `inner`, which yields the stored regions back to back.
    pub fn new(inner: R, map: &SparseMap) -> Self {
        Self {
            inner,
            regions: map.regions.clone(),
            index: 0,
            position: 0,
            size: map.real_size,
        }
    }
}

impl<R: Read> Read for SparseReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self
            .regions
            .get(self.index)
            .is_some_and(|r| self.position >= r.end())
        {
            self.index += 1;
        }
        if self.position >= self.size || buf.is_empty() {
            return Ok(0);
        }

        let next = self.regions.get(self.index).copied();
        let want = buf.len() as u64;
        match next {
            Some(region) if self.position >= region.offset => {
                let n = want.min(region.end() - self.position) as usize;
                let n = self.inner.read(&mut buf[..n])?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "sparse data ends early",
                    ));
                }
                self.position += n as u64;
                Ok(n)
            }
            _ => {
                let hole_end = next.map_or(self.size, |r| r.offset.min(self.size));
                let n = want.min(hole_end - self.position) as usize;
                buf[..n].fill(0);
                self.position += n as u64;
                Ok(n)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn region(offset: u64, length: u64) -> SparseEntry {
        SparseEntry { offset, length }
    }

    #[test]
    fn test_reconstruct_holes() {
        let map = SparseMap::new(vec![region(0, 5), region(100, 5)], 105, 10).unwrap();
        let mut reader = SparseReader::new(Cursor::new(b"helloworld".to_vec()), &map);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out.len(), 105);
        assert_eq!(&out[..5], b"hello");
        assert!(out[5..100].iter().all(|&b| b == 0));
        assert_eq!(&out[100..], b"world");
    }

    #[test]
    fn test_trailing_hole() {
        let map = SparseMap::new(vec![region(2, 3)], 10, 3).unwrap();
        assert_eq!(map.regions.last(), Some(&region(10, 0)));
        let mut reader = SparseReader::new(Cursor::new(b"abc".to_vec()), &map);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"\0\0abc\0\0\0\0\0");
    }

    #[test]
    fn test_small_buffer_reads() {
        let map = SparseMap::new(vec![region(0, 2), region(4, 2)], 6, 4).unwrap();
        let mut reader = SparseReader::new(Cursor::new(b"abcd".to_vec()), &map);
        let mut out = Vec::new();
        let mut buf = [0u8; 1];
        while reader.read(&mut buf).unwrap() == 1 {
            out.push(buf[0]);
        }
        assert_eq!(out, b"ab\0\0cd");
    }

    #[test]
    fn test_zero_length_region_mid_file() {
        let map = SparseMap::new(vec![region(0, 1), region(3, 0), region(5, 1)], 6, 2).unwrap();
        let mut reader = SparseReader::new(Cursor::new(b"ab".to_vec()), &map);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"a\0\0\0\0b");
    }

    #[test]
    fn test_truncated_data() {
        let map = SparseMap::new(vec![region(0, 4)], 4, 4).unwrap();
        let mut reader = SparseReader::new(Cursor::new(b"ab".to_vec()), &map);
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }

    #[test]
    fn test_map_validation() {
        assert!(SparseMap::new(vec![region(10, 5), region(0, 5)], 20, 10).is_err());
        assert!(SparseMap::new(vec![region(0, 10), region(5, 5)], 20, 15).is_err());
        assert!(SparseMap::new(vec![region(0, 30)], 20, 30).is_err());
        assert!(SparseMap::new(vec![region(0, 5)], 20, 6).is_err());
    }

    #[test]
    fn test_pax_map() {
        assert_eq!(
            parse_pax_map("0,5,100,5").unwrap(),
            vec![region(0, 5), region(100, 5)]
        );
        assert!(matches!(
            parse_pax_map("0,5,100"),
            Err(ExtractionError::CorruptSparse(_))
        ));
        assert!(parse_pax_map("0,x").is_err());
    }

    #[test]
    fn test_data_map() {
        let mut data = b"2\n0\n5\n100\n5\n".to_vec();
        data.resize(512, 0);
        data.extend_from_slice(b"payload");
        let mut cursor = Cursor::new(data);
        let (regions, consumed) = read_data_map(&mut cursor).unwrap();
        assert_eq!(regions, vec![region(0, 5), region(100, 5)]);
        assert_eq!(consumed, 512);
        assert_eq!(cursor.position(), 512);
    }

    #[test]
    fn test_gnu_pairs() {
        let mut field = [0u8; 96];
        field[..11].copy_from_slice(b"00000000000");
        field[12..23].copy_from_slice(b"00000000005");
        field[24..35].copy_from_slice(b"00000000144");
        field[36..47].copy_from_slice(b"00000000005");
        assert_eq!(
            parse_pairs(&field).unwrap(),
            vec![region(0, 5), region(100, 5)]
        );
    }
}
