//! ZIP extraction driver.

use std::io::Read;
use std::io::Seek;

use tracing::debug;

use super::engine::Materializer;
use crate::Result;
use crate::formats::ZipArchive;
use crate::types::EntryType;

/// Materializes every entry of `archive` in directory order.
///
/// Symlink bodies are read into memory (they are capped and small); file
/// bodies are streamed through the materializer's chunk buffer.
pub(crate) fn extract_zip<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    materializer: &mut Materializer<'_>,
) -> Result<()> {
    let total = archive.len();

    for index in 0..total {
        let entry = archive.entries()[index].clone();
        materializer.begin_entry(&entry.name, entry.uncompressed_size, total)?;
        if materializer.options().debug {
            debug!(
                entry = %entry.name,
                method = ?entry.method,
                compressed = entry.compressed_size,
                position = entry.position,
                crc32 = format_args!("{:#010x}", entry.crc32),
                "zip entry"
            );
        }

        let Some(path) = materializer.resolve(&entry.name) else {
            continue;
        };

        match entry.entry_type() {
            EntryType::Directory => materializer.directory(&path, entry.modified)?,
            EntryType::Symlink { .. } => {
                let target = archive.read_link(index)?;
                materializer.symlink(&path, &target)?;
            }
            EntryType::File => {
                let mut reader = archive.entry_reader(index)?;
                materializer.file(&path, &mut reader, entry.modified, entry.mode)?;
            }
            EntryType::Special { description } => materializer.skip(&entry.name, description),
            EntryType::Hardlink { .. } => materializer.skip(&entry.name, "hard link"),
        }
    }

    Ok(())
}
