//! What the materializer does with an entry.

/// Kind of object an archive entry materializes as.
///
/// Container-specific detail (sparse maps, device numbers) stays with the
/// container's own header type; this enum only carries what is needed to
/// create the object on disk. Link targets are raw archive text and are
/// not validated.
///
/// # Examples
///
/// ```
/// use unpack_core::types::EntryType;
///
/// let file = EntryType::File;
/// let link = EntryType::Symlink {
///     target: "a.txt".to_string(),
/// };
/// assert!(file.is_file());
/// assert!(link.is_symlink());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file entry.
    File,

    /// Directory entry.
    Directory,

    /// Symbolic link entry.
    Symlink {
        /// Link target text as stored in the archive.
        target: String,
    },

    /// Hard link to another entry of the same archive.
    Hardlink {
        /// Archive name of the entry being linked to.
        target: String,
    },

    /// Device node, FIFO or socket. Never materialized.
    Special {
        /// Short description used in warnings.
        description: &'static str,
    },
}

impl EntryType {
    /// Returns `true` if this is a regular file.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self, Self::File)
    }

    /// Returns `true` if this is a directory.
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Returns `true` if this is a symlink.
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink { .. })
    }

    /// Returns `true` if this is a hardlink.
    #[must_use]
    pub const fn is_hardlink(&self) -> bool {
        matches!(self, Self::Hardlink { .. })
    }
}
