//! Bounded-memory chunked copy with per-chunk cancellation.
//!
//! Every entry body is moved through one reusable buffer, so memory use is
//! independent of entry size. The chunk callback is the only place where
//! progress is reported and cancellation is observed.

use std::io::Read;
use std::io::Write;
use std::io::{self};

use crate::ExtractionError;
use crate::config::DEFAULT_CHUNK_SIZE;

/// Reusable copy buffer.
///
/// One buffer is allocated per extraction pass and reused for every entry.
#[derive(Debug)]
pub struct CopyBuffer {
    buf: Vec<u8>,
}

impl CopyBuffer {
    /// Creates a buffer of the default chunk size (4 KiB).
    #[must_use]
    pub fn new() -> Self {
        Self::with_size(DEFAULT_CHUNK_SIZE)
    }

    /// Creates a buffer of `size` bytes (at least one).
    #[must_use]
    pub fn with_size(size: usize) -> Self {
        Self {
            buf: vec![0u8; size.max(1)],
        }
    }

    /// Returns the buffer size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.buf.len()
    }
}

impl Default for CopyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies `reader` to `writer` one chunk at a time.
///
/// After each chunk is written, `on_chunk` receives the chunk length; if it
/// returns `false` the copy stops with [`ExtractionError::Cancelled`]. Bytes
/// already written are left in place.
///
/// # Errors
///
/// Returns an error if reading or writing fails, if the running total
/// overflows `u64`, or if `on_chunk` requests cancellation.
pub fn copy_chunked<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut CopyBuffer,
    mut on_chunk: F,
) -> Result<u64, ExtractionError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: FnMut(u64) -> bool,
{
    let mut total: u64 = 0;

    loop {
        let bytes_read = match reader.read(&mut buffer.buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(unwrap_io(e)),
        };

        writer.write_all(&buffer.buf[..bytes_read])?;

        total = total.checked_add(bytes_read as u64).ok_or_else(|| {
            ExtractionError::InvalidArchive("entry size overflows u64".to_string())
        })?;

        if !on_chunk(bytes_read as u64) {
            return Err(ExtractionError::Cancelled);
        }
    }

    Ok(total)
}

/// Copies `reader` to `writer` without progress reporting.
///
/// # Errors
///
/// Returns an error if reading or writing fails.
#[inline]
pub fn copy_with_buffer<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut CopyBuffer,
) -> Result<u64, ExtractionError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    copy_chunked(reader, writer, buffer, |_| true)
}

/// Recovers an `ExtractionError` that a decoding reader smuggled through an
/// `io::Error` (for example a CRC mismatch detected at end of stream).
pub(crate) fn unwrap_io(err: io::Error) -> ExtractionError {
    if err
        .get_ref()
        .is_some_and(|inner| inner.is::<ExtractionError>())
    {
        if let Some(inner) = err.into_inner() {
            if let Ok(extraction) = inner.downcast::<ExtractionError>() {
                return *extraction;
            }
        }
        return ExtractionError::InvalidArchive("corrupt entry stream".to_string());
    }
    ExtractionError::Io(err)
}
