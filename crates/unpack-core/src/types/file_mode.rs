//! Portable file mode.

use std::fmt;

/// Platform-neutral file mode: permission bits in the low nine bits plus
/// type and special bits in the high bits.
///
/// Both ZIP external attributes (Unix or MS-DOS flavoured) and tar header
/// modes are decoded into this one representation.
///
/// # Examples
///
/// ```
/// use unpack_core::types::FileMode;
///
/// let mode = FileMode::from_unix(0o040_755);
/// assert!(mode.is_dir());
/// assert_eq!(mode.perm(), 0o755);
/// assert_eq!(mode.to_string(), "drwxr-xr-x");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileMode(u32);

impl FileMode {
    /// Directory.
    pub const DIR: Self = Self(1 << 31);
    /// Symbolic link.
    pub const SYMLINK: Self = Self(1 << 27);
    /// Device file.
    pub const DEVICE: Self = Self(1 << 26);
    /// Named pipe (FIFO).
    pub const NAMED_PIPE: Self = Self(1 << 25);
    /// Unix domain socket.
    pub const SOCKET: Self = Self(1 << 24);
    /// Setuid bit.
    pub const SETUID: Self = Self(1 << 23);
    /// Setgid bit.
    pub const SETGID: Self = Self(1 << 22);
    /// Character device (set together with `DEVICE`).
    pub const CHAR_DEVICE: Self = Self(1 << 21);
    /// Sticky bit.
    pub const STICKY: Self = Self(1 << 20);

    /// Mask of the permission bits.
    pub const PERM_MASK: u32 = 0o777;
    /// Mask of the type bits.
    pub const TYPE_MASK: u32 = Self::DIR.0
        | Self::SYMLINK.0
        | Self::DEVICE.0
        | Self::NAMED_PIPE.0
        | Self::SOCKET.0
        | Self::CHAR_DEVICE.0;

    const S_IFMT: u32 = 0o170_000;
    const S_IFSOCK: u32 = 0o140_000;
    const S_IFLNK: u32 = 0o120_000;
    const S_IFREG: u32 = 0o100_000;
    const S_IFBLK: u32 = 0o060_000;
    const S_IFDIR: u32 = 0o040_000;
    const S_IFCHR: u32 = 0o020_000;
    const S_IFIFO: u32 = 0o010_000;
    const S_ISUID: u32 = 0o4000;
    const S_ISGID: u32 = 0o2000;
    const S_ISVTX: u32 = 0o1000;

    const MSDOS_READ_ONLY: u32 = 0x01;
    const MSDOS_DIR: u32 = 0x10;

    /// Creates a mode holding only permission bits.
    #[must_use]
    pub const fn from_perm(perm: u32) -> Self {
        Self(perm & Self::PERM_MASK)
    }

    /// Decodes a POSIX `st_mode` value (type bits plus permissions).
    #[must_use]
    pub const fn from_unix(mode: u32) -> Self {
        let mut bits = mode & Self::PERM_MASK;
        bits |= match mode & Self::S_IFMT {
            Self::S_IFBLK => Self::DEVICE.0,
            Self::S_IFCHR => Self::DEVICE.0 | Self::CHAR_DEVICE.0,
            Self::S_IFDIR => Self::DIR.0,
            Self::S_IFIFO => Self::NAMED_PIPE.0,
            Self::S_IFLNK => Self::SYMLINK.0,
            Self::S_IFSOCK => Self::SOCKET.0,
            _ => 0,
        };
        if mode & Self::S_ISUID != 0 {
            bits |= Self::SETUID.0;
        }
        if mode & Self::S_ISGID != 0 {
            bits |= Self::SETGID.0;
        }
        if mode & Self::S_ISVTX != 0 {
            bits |= Self::STICKY.0;
        }
        Self(bits)
    }

    /// Synthesizes a mode from MS-DOS attribute bits: directories get
    /// `0o777`, files `0o666`, and the read-only bit clears write access.
    #[must_use]
    pub const fn from_msdos(attrs: u32) -> Self {
        let mut bits = if attrs & Self::MSDOS_DIR != 0 {
            Self::DIR.0 | 0o777
        } else {
            0o666
        };
        if attrs & Self::MSDOS_READ_ONLY != 0 {
            bits &= !0o222;
        }
        Self(bits)
    }

    /// Encodes back into a POSIX `st_mode` value.
    #[must_use]
    pub const fn to_unix(self) -> u32 {
        let mut mode = self.0 & Self::PERM_MASK;
        mode |= if self.contains(Self::DIR) {
            Self::S_IFDIR
        } else if self.contains(Self::SYMLINK) {
            Self::S_IFLNK
        } else if self.contains(Self::NAMED_PIPE) {
            Self::S_IFIFO
        } else if self.contains(Self::SOCKET) {
            Self::S_IFSOCK
        } else if self.contains(Self::CHAR_DEVICE) {
            Self::S_IFCHR
        } else if self.contains(Self::DEVICE) {
            Self::S_IFBLK
        } else {
            Self::S_IFREG
        };
        if self.contains(Self::SETUID) {
            mode |= Self::S_ISUID;
        }
        if self.contains(Self::SETGID) {
            mode |= Self::S_ISGID;
        }
        if self.contains(Self::STICKY) {
            mode |= Self::S_ISVTX;
        }
        mode
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns the permission bits.
    #[must_use]
    pub const fn perm(self) -> u32 {
        self.0 & Self::PERM_MASK
    }

    /// Returns `true` if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Returns `true` for directories.
    #[must_use]
    pub const fn is_dir(self) -> bool {
        self.contains(Self::DIR)
    }

    /// Returns `true` for symbolic links.
    #[must_use]
    pub const fn is_symlink(self) -> bool {
        self.contains(Self::SYMLINK)
    }

    /// Returns `true` for regular files (no type bits set).
    #[must_use]
    pub const fn is_regular(self) -> bool {
        self.0 & Self::TYPE_MASK == 0
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_dir() {
            'd'
        } else if self.is_symlink() {
            'l'
        } else if self.contains(Self::CHAR_DEVICE) {
            'c'
        } else if self.contains(Self::DEVICE) {
            'b'
        } else if self.contains(Self::NAMED_PIPE) {
            'p'
        } else if self.contains(Self::SOCKET) {
            's'
        } else {
            '-'
        };
        let mut out = String::with_capacity(10);
        out.push(kind);
        for (shift, letters) in [(6, "rwx"), (3, "rwx"), (0, "rwx")] {
            for (i, letter) in letters.chars().enumerate() {
                let bit = 1 << (shift + 2 - i);
                out.push(if self.0 & bit == 0 { '-' } else { letter });
            }
        }
        f.write_str(&out)
    }
}
