//! Error types for archive parsing and extraction.

use thiserror::Error;

use crate::formats::ArchiveFormat;

/// Result type alias using `ExtractionError`.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Coarse classification of an [`ExtractionError`].
///
/// Parsing and materialization only ever need to know which of these five
/// buckets an error falls into to decide whether to abort, skip an entry, or
/// stop quietly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing signature, checksum mismatch, inconsistent sizes.
    Format,
    /// The entry uses a compression method with no available codec.
    UnsupportedMethod,
    /// Read, write or seek failure.
    Io,
    /// The entry path would escape the destination root.
    PathRejected,
    /// The caller asked to stop.
    Cancelled,
}

/// Errors that can occur while detecting, parsing or extracting an archive.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No known archive signature matched the input.
    #[error("unknown archive format")]
    UnknownFormat,

    /// The format was recognised but this crate does not extract it.
    #[error("{0} archives are not supported by this extractor")]
    UnsupportedFormat(ArchiveFormat),

    /// No end of central directory record could be located.
    #[error("not a valid zip file")]
    NotAValidZip,

    /// Archive is structurally corrupt.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// A tar header failed checksum or magic validation.
    #[error("not a tar file: header checksum mismatch")]
    NotTarFile,

    /// A PAX extended header record could not be parsed.
    #[error("invalid PAX record: {0}")]
    InvalidPax(String),

    /// A sparse map is malformed or inconsistent with the entry size.
    #[error("corrupt sparse file map: {0}")]
    CorruptSparse(String),

    /// The entry is compressed with a method that has no codec here.
    #[error("unsupported compression method {method}")]
    UnsupportedMethod {
        /// The ZIP compression method id.
        method: u16,
    },

    /// The entry is encrypted.
    #[error("entry is encrypted: {name}")]
    Encrypted {
        /// Entry name as stored in the archive.
        name: String,
    },

    /// Decompressed bytes do not match the stored CRC32.
    #[error("checksum mismatch for {name}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Entry name as stored in the archive.
        name: String,
        /// CRC32 recorded in the archive.
        expected: u32,
        /// CRC32 computed over the decompressed bytes.
        actual: u32,
    },

    /// The entry path is absolute, has a drive prefix or climbs out of the
    /// destination.
    #[error("unsafe entry path rejected: {path}")]
    PathRejected {
        /// The offending entry path.
        path: String,
    },

    /// The caller cancelled the operation.
    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// Returns the taxonomy bucket of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use unpack_core::ExtractionError;
    /// use unpack_core::error::ErrorKind;
    ///
    /// assert_eq!(ExtractionError::NotTarFile.kind(), ErrorKind::Format);
    /// assert_eq!(ExtractionError::Cancelled.kind(), ErrorKind::Cancelled);
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::UnsupportedMethod { .. } | Self::Encrypted { .. } => {
                ErrorKind::UnsupportedMethod
            }
            Self::PathRejected { .. } => ErrorKind::PathRejected,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::UnknownFormat
            | Self::UnsupportedFormat(_)
            | Self::NotAValidZip
            | Self::InvalidArchive(_)
            | Self::NotTarFile
            | Self::InvalidPax(_)
            | Self::CorruptSparse(_)
            | Self::ChecksumMismatch { .. } => ErrorKind::Format,
        }
    }

    /// Returns `true` if extraction may continue past this error.
    ///
    /// Only a rejected entry path is recoverable: the entry is skipped and
    /// the rest of the archive is still extracted.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::PathRejected { .. })
    }

    /// Returns `true` if this error stopped the pass at the caller's request.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns a context string for this error, if available.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::InvalidArchive(msg) | Self::InvalidPax(msg) | Self::CorruptSparse(msg) => {
                Some(msg)
            }
            Self::PathRejected { path } => Some(path),
            _ => None,
        }
    }
}
