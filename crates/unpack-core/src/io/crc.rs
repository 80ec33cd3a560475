//! CRC32-verifying reader.

use std::io::Read;
use std::io::{self};

use crc32fast::Hasher;

use crate::ExtractionError;

/// A wrapping reader which computes the CRC32 of everything read through it
/// and compares it with the stored value once the inner reader hits EOF.
///
/// A mismatch surfaces as an `io::Error` carrying
/// [`ExtractionError::ChecksumMismatch`], which the copy loop unwraps again.
pub struct Crc32Reader<R> {
    reader: R,
    hasher: Hasher,
    expected: u32,
    expected_len: Option<u64>,
    read: u64,
    name: String,
    verified: bool,
}

impl<R: Read> Crc32Reader<R> {
    /// Wraps `reader`, expecting the stream to hash to `expected`.
    pub fn new(reader: R, expected: u32, name: impl Into<String>) -> Self {
        Self {
            reader,
            hasher: Hasher::new(),
            expected,
            expected_len: None,
            read: 0,
            name: name.into(),
            verified: false,
        }
    }

    /// Also requires the stream to yield exactly `len` bytes.
    #[must_use]
    pub fn with_expected_len(mut self, len: u64) -> Self {
        self.expected_len = Some(len);
        self
    }

    /// Consumes this reader and returns the inner value.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
            self.read += n as u64;
            return Ok(n);
        }

        if !buf.is_empty() && !self.verified {
            self.verified = true;
            if let Some(len) = self.expected_len.filter(|&len| len != self.read) {
                return Err(io::Error::other(ExtractionError::InvalidArchive(format!(
                    "{}: expected {len} bytes, decoded {}",
                    self.name, self.read
                ))));
            }
            let actual = std::mem::take(&mut self.hasher).finalize();
            if actual != self.expected {
                return Err(io::Error::other(ExtractionError::ChecksumMismatch {
                    name: self.name.clone(),
                    expected: self.expected,
                    actual,
                }));
            }
        }
        Ok(0)
    }
}
