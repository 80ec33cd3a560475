//! Value types shared by the parsers and the materializer.
//!
//! `SafePath` and `DestDir` can only be built through validation, so a value
//! of either type is proof that the check happened.

pub mod dest_dir;
pub mod entry_type;
pub mod file_mode;
pub mod safe_path;

pub use dest_dir::DestDir;
pub use entry_type::EntryType;
pub use file_mode::FileMode;
pub use safe_path::SafePath;
