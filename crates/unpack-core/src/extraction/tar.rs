//! TAR extraction driver.

use std::io::Read;

use tracing::debug;

use super::engine::Materializer;
use crate::Result;
use crate::formats::TarArchive;
use crate::types::EntryType;

/// Materializes entries as they are read from the stream.
///
/// The entry count is unknown up front, so progress callbacks receive a
/// total of 0. Hard links point at entries extracted earlier in the pass.
pub(crate) fn extract_tar<R: Read>(
    archive: &mut TarArchive<R>,
    materializer: &mut Materializer<'_>,
) -> Result<()> {
    while let Some(header) = archive.next_entry()? {
        materializer.begin_entry(&header.name, header.size, 0)?;
        if materializer.options().debug {
            debug!(
                entry = %header.name,
                typeflag = %char::from(header.typeflag),
                format = %header.format,
                sparse = header.sparse().is_some(),
                "tar entry"
            );
        }

        let Some(path) = materializer.resolve(&header.name) else {
            continue;
        };

        match header.entry_type() {
            EntryType::Directory => materializer.directory(&path, header.modified)?,
            EntryType::File => {
                let mut reader = archive.entry_reader();
                materializer.file(&path, &mut reader, header.modified, header.file_mode())?;
            }
            EntryType::Symlink { target } => materializer.symlink(&path, &target)?,
            EntryType::Hardlink { target } => {
                materializer.hardlink(&header.name, &path, &target)?;
            }
            EntryType::Special { description } => materializer.skip(&header.name, description),
        }
    }

    Ok(())
}
