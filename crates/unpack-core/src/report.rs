//! Extraction reporting and progress callbacks.

use std::time::Duration;

/// Report of a completed extraction pass.
///
/// A pass that returns a report finished in the `Completed` state; skipped
/// entries show up in `files_skipped` and `warnings`.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Number of regular files written.
    pub files_extracted: usize,

    /// Number of directory entries materialized.
    pub directories_created: usize,

    /// Number of symbolic links created.
    pub symlinks_created: usize,

    /// Number of hard links created.
    pub hardlinks_created: usize,

    /// Total bytes written to disk.
    pub bytes_written: u64,

    /// Duration of the extraction pass.
    pub duration: Duration,

    /// Number of entries skipped (rejected paths, unsupported entry types).
    pub files_skipped: usize,

    /// Warnings generated during extraction.
    pub warnings: Vec<String>,
}

impl ExtractionReport {
    /// Creates a new empty extraction report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a warning message to the report.
    pub fn add_warning(&mut self, message: String) {
        self.warnings.push(message);
    }

    /// Records a skipped entry together with the reason.
    pub fn skip(&mut self, message: String) {
        self.files_skipped += 1;
        self.add_warning(message);
    }

    /// Returns total number of items materialized.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.files_extracted + self.directories_created + self.symlinks_created + self.hardlinks_created
    }

    /// Returns whether any warnings were generated.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Callback trait for progress reporting and cooperative cancellation.
///
/// Every method that returns `bool` is a continuation predicate: returning
/// `false` cancels the pass. Cancellation is polled between chunks, never in
/// the middle of one.
///
/// # Examples
///
/// ```
/// use unpack_core::ProgressCallback;
///
/// struct StopAfter(u64);
///
/// impl ProgressCallback for StopAfter {
///     fn on_entry(&mut self, _name: &str, _current: usize, _total: usize) -> bool {
///         true
///     }
///
///     fn on_progress(&mut self, bytes_done: u64) -> bool {
///         bytes_done < self.0
///     }
///
///     fn on_complete(&mut self) {}
/// }
/// ```
pub trait ProgressCallback {
    /// Called before an entry is materialized.
    ///
    /// * `name` - Display name, truncated to the configured width
    /// * `current` - 1-based index of the entry
    /// * `total` - Total number of entries, or 0 when unknown (streamed tar)
    fn on_entry(&mut self, name: &str, current: usize, total: usize) -> bool;

    /// Called after each chunk with the cumulative number of bytes written
    /// in the whole pass.
    fn on_progress(&mut self, bytes_done: u64) -> bool;

    /// Called once when the pass completes.
    fn on_complete(&mut self);
}

/// No-op implementation of `ProgressCallback` that never cancels.
#[derive(Debug, Default)]
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {
    fn on_entry(&mut self, _name: &str, _current: usize, _total: usize) -> bool {
        true
    }

    fn on_progress(&mut self, _bytes_done: u64) -> bool {
        true
    }

    fn on_complete(&mut self) {}
}

/// Adapts a closure over cumulative bytes into a `ProgressCallback`.
///
/// ```
/// use unpack_core::report::FnProgress;
///
/// let mut seen = 0;
/// let progress = FnProgress::new(|bytes| {
///     seen = bytes;
///     true
/// });
/// # drop(progress);
/// ```
pub struct FnProgress<F> {
    on_progress: F,
}

impl<F> FnProgress<F>
where
    F: FnMut(u64) -> bool,
{
    /// Wraps `on_progress`.
    pub fn new(on_progress: F) -> Self {
        Self { on_progress }
    }
}

impl<F> ProgressCallback for FnProgress<F>
where
    F: FnMut(u64) -> bool,
{
    fn on_entry(&mut self, _name: &str, _current: usize, _total: usize) -> bool {
        true
    }

    fn on_progress(&mut self, bytes_done: u64) -> bool {
        (self.on_progress)(bytes_done)
    }

    fn on_complete(&mut self) {}
}
