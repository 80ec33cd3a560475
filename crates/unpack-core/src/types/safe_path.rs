//! Validated archive-relative path.

use std::path::Path;
use std::path::PathBuf;

use crate::ExtractionError;
use crate::Result;
use crate::formats::common::decode_name;

/// An archive entry name that has been checked to stay inside any root it
/// is joined onto.
///
/// The name is split on both `/` and `\`, empty and `.` components are
/// dropped, and the name is rejected if it
/// - contains a `..` component,
/// - starts with a separator (absolute or UNC path),
/// - starts with a drive-letter prefix such as `C:`,
/// - contains a NUL byte,
/// - is empty.
///
/// A name made only of `.` components (the `./` entry `tar -C dir .`
/// writes first) is accepted and names the root itself.
///
/// # Examples
///
/// ```
/// use unpack_core::types::SafePath;
///
/// let safe = SafePath::parse("a/b\\c.txt", true).unwrap();
/// assert_eq!(safe.components(), ["a", "b", "c.txt"]);
///
/// assert!(SafePath::parse("../../evil.txt", true).is_err());
/// assert!(SafePath::parse("C:\\Windows\\evil.dll", true).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafePath {
    components: Vec<String>,
}

impl SafePath {
    /// Decodes and validates an entry name.
    ///
    /// `is_utf8` selects UTF-8 decoding; otherwise the name is decoded with
    /// the legacy code page fallback.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathRejected`] if the name is unsafe.
    pub fn parse(name: impl AsRef<[u8]>, is_utf8: bool) -> Result<Self> {
        let decoded = decode_name(name.as_ref(), is_utf8);
        Self::parse_str(&decoded)
    }

    /// Validates an already decoded entry name.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathRejected`] if the name is unsafe.
    pub fn parse_str(name: &str) -> Result<Self> {
        let reject = || ExtractionError::PathRejected {
            path: name.to_string(),
        };

        if name.contains('\0') || name.starts_with(['/', '\\']) || has_drive_prefix(name) {
            return Err(reject());
        }

        let mut components = Vec::new();
        for component in name.split(['/', '\\']) {
            match component {
                "" | "." => {}
                ".." => return Err(reject()),
                normal => components.push(normal.to_string()),
            }
        }

        if name.is_empty() {
            return Err(reject());
        }

        Ok(Self { components })
    }

    /// Returns the validated components.
    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Returns `true` if the name refers to the root itself, such as `./`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns the relative path built with the platform separator.
    #[must_use]
    pub fn to_path_buf(&self) -> PathBuf {
        self.components.iter().collect()
    }

    /// Joins this path under `root`.
    #[must_use]
    pub fn under(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.components);
        path
    }
}

/// `C:` style prefix: an ASCII letter followed by a colon.
fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
