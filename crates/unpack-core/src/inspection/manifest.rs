//! Archive manifest types.

use std::time::SystemTime;

use crate::formats::ArchiveFormat;
use crate::types::EntryType;
use crate::types::FileMode;

/// Listing of an archive's entries, produced without writing anything.
#[derive(Debug, Clone)]
pub struct ArchiveManifest {
    /// Detected container format.
    pub format: ArchiveFormat,

    /// Entries in archive order.
    pub entries: Vec<ArchiveEntry>,

    /// Number of entries.
    pub total_entries: usize,

    /// Sum of the uncompressed (logical) sizes.
    pub total_size: u64,
}

impl ArchiveManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            entries: Vec::new(),
            total_entries: 0,
            total_size: 0,
        }
    }

    /// Appends an entry and updates the totals.
    pub fn add_entry(&mut self, entry: ArchiveEntry) {
        self.total_entries += 1;
        self.total_size = self.total_size.saturating_add(entry.size);
        self.entries.push(entry);
    }

    /// Looks up an entry by its archive name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}

/// One entry of an [`ArchiveManifest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name as recorded in the archive (not sanitized).
    pub name: String,

    /// What the entry would materialize as, link targets included.
    pub entry_type: EntryType,

    /// Logical size in bytes.
    pub size: u64,

    /// Stored size, for formats that compress per entry.
    pub compressed_size: Option<u64>,

    /// Portable mode.
    pub mode: FileMode,

    /// Modification time, if recorded.
    pub modified: Option<SystemTime>,
}
