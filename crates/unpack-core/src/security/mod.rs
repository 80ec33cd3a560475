//! Path safety checks applied before anything touches the filesystem.

pub mod path;

pub use path::join;
