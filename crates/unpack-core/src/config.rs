//! Extraction options.

/// Default size of one streamed chunk (4 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024;

/// Default width used to truncate entry names shown in progress output.
pub const DEFAULT_DISPLAY_WIDTH: usize = 80;

/// Options controlling how entries are materialized on disk.
///
/// Pure configuration: it owns no handles and can be shared freely.
///
/// # Examples
///
/// ```
/// use unpack_core::ExtractionOptions;
///
/// // Fail if a destination file already exists
/// let options = ExtractionOptions::default();
/// assert!(!options.overwrite);
///
/// // Replace existing files and stay silent
/// let options = ExtractionOptions::default().with_overwrite(true).with_quiet(true);
/// assert!(options.overwrite);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOptions {
    /// Replace files that already exist at the destination.
    pub overwrite: bool,

    /// Suppress per-entry informational log lines.
    pub quiet: bool,

    /// Emit per-entry debug detail (sizes, methods, offsets).
    pub debug: bool,

    /// Number of bytes moved per streamed chunk. Progress and cancellation
    /// are polled once per chunk.
    pub chunk_size: usize,

    /// Maximum number of characters of an entry name passed to progress
    /// callbacks.
    pub display_width: usize,
}

impl Default for ExtractionOptions {
    /// Creates options that never overwrite, log normally and stream in
    /// 4 KiB chunks.
    fn default() -> Self {
        Self {
            overwrite: false,
            quiet: false,
            debug: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            display_width: DEFAULT_DISPLAY_WIDTH,
        }
    }
}

impl ExtractionOptions {
    /// Sets whether existing destination files are replaced.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Sets quiet mode.
    #[must_use]
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Sets debug mode.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the streamed chunk size. Zero is clamped to one byte.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sets the display width used for progress names.
    #[must_use]
    pub fn with_display_width(mut self, width: usize) -> Self {
        self.display_width = width;
        self
    }

    /// Truncates `name` to the configured display width, keeping the tail
    /// (the file name is the informative part of a long path).
    #[must_use]
    pub fn display_name(&self, name: &str) -> String {
        let count = name.chars().count();
        if count <= self.display_width {
            return name.to_string();
        }
        if self.display_width <= 3 {
            return name.chars().skip(count - self.display_width).collect();
        }
        let keep = self.display_width - 3;
        let tail: String = name.chars().skip(count - keep).collect();
        format!("...{tail}")
    }
}
