//! I/O wrappers shared by the container readers.

pub mod crc;

pub use crc::Crc32Reader;
