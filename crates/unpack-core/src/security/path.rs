//! Zip-slip defence: turning archive names into destination paths.

use std::path::Path;
use std::path::PathBuf;

use tracing::warn;

use crate::types::SafePath;

/// Converts an archive-relative name into a path under `root`.
///
/// Returns `None` (and logs a warning) for names containing a `..`
/// component, an absolute root or a drive-letter prefix. A returned path
/// always starts with `root`; a name of only `.` components yields `root`
/// itself.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use unpack_core::security::join;
///
/// let root = Path::new("/out");
/// assert_eq!(join(root, b"a/b/c.txt", true), Some(root.join("a").join("b").join("c.txt")));
/// assert_eq!(join(root, b"../../evil.txt", true), None);
/// ```
pub fn join(root: &Path, entry_path: &[u8], is_utf8: bool) -> Option<PathBuf> {
    let safe = match SafePath::parse(entry_path, is_utf8) {
        Ok(safe) => safe,
        Err(err) => {
            warn!(root = %root.display(), "{err}");
            return None;
        }
    };

    let joined = safe.under(root);
    if !joined.starts_with(root) {
        warn!(path = %joined.display(), "joined path escapes the extraction root");
        return None;
    }
    Some(joined)
}
