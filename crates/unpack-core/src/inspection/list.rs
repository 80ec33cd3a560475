//! Archive listing implementation.

use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;

use crate::ExtractionError;
use crate::Result;
use crate::formats::ArchiveFormat;
use crate::formats::CompressionCodec;
use crate::formats::TarArchive;
use crate::formats::ZipArchive;
use crate::formats::detect::detect_path;
use crate::formats::tar::BLOCK_SIZE;
use crate::formats::tar::looks_like_tar;
use crate::inspection::manifest::ArchiveEntry;
use crate::inspection::manifest::ArchiveManifest;
use crate::types::EntryType;
use crate::types::FileMode;

/// Lists archive contents without extracting.
///
/// ZIP symlink targets are read from their (small) entry bodies; a single
/// compressed file is decompressed once to measure it.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the format is not
/// supported, or the archive metadata is corrupt.
///
/// # Examples
///
/// ```no_run
/// use unpack_core::list_archive;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manifest = list_archive("archive.zip")?;
/// println!("Archive contains {} entries", manifest.total_entries);
/// for entry in &manifest.entries {
///     println!("{} {:>10} {}", entry.mode, entry.size, entry.name);
/// }
/// # Ok(())
/// # }
/// ```
pub fn list_archive<P: AsRef<Path>>(archive_path: P) -> Result<ArchiveManifest> {
    let archive_path = archive_path.as_ref();
    let (format, offset) = detect_path(archive_path)?;
    list_path(archive_path, format, offset)
}

/// Lists an archive whose format and payload offset are already known.
pub(crate) fn list_path(
    archive_path: &Path,
    format: ArchiveFormat,
    offset: u64,
) -> Result<ArchiveManifest> {
    let mut file = File::open(archive_path)?;
    match format {
        ArchiveFormat::Zip | ArchiveFormat::SelfExtractingExe => {
            list_zip(ZipArchive::new(BufReader::new(file))?, format)
        }
        ArchiveFormat::Tar => {
            file.seek(SeekFrom::Start(offset))?;
            list_tar(TarArchive::new(BufReader::new(file)), format)
        }
        other => {
            let codec = CompressionCodec::from_format(other)
                .ok_or(ExtractionError::UnsupportedFormat(other))?;
            file.seek(SeekFrom::Start(offset))?;
            list_stream(file, codec, archive_path, format)
        }
    }
}

fn list_zip<R: Read + Seek>(
    mut archive: ZipArchive<R>,
    format: ArchiveFormat,
) -> Result<ArchiveManifest> {
    let mut manifest = ArchiveManifest::new(format);

    for index in 0..archive.len() {
        let entry = archive.entries()[index].clone();
        let entry_type = match entry.entry_type() {
            EntryType::Symlink { .. } => EntryType::Symlink {
                target: archive.read_link(index)?,
            },
            other => other,
        };

        manifest.add_entry(ArchiveEntry {
            name: entry.name,
            entry_type,
            size: entry.uncompressed_size,
            compressed_size: Some(entry.compressed_size),
            mode: entry.mode,
            modified: Some(entry.modified),
        });
    }

    Ok(manifest)
}

fn list_tar<R: Read>(mut archive: TarArchive<R>, format: ArchiveFormat) -> Result<ArchiveManifest> {
    let mut manifest = ArchiveManifest::new(format);

    while let Some(header) = archive.next_entry()? {
        let entry_type = header.entry_type();
        let mode = header.file_mode();
        manifest.add_entry(ArchiveEntry {
            name: header.name,
            entry_type,
            size: header.size,
            compressed_size: None,
            mode,
            modified: Some(header.modified),
        });
    }

    Ok(manifest)
}

fn list_stream(
    file: File,
    codec: CompressionCodec,
    archive_path: &Path,
    format: ArchiveFormat,
) -> Result<ArchiveManifest> {
    let stored = file.metadata()?.len();
    let modified = file.metadata()?.modified().ok();
    let mut decoder = codec.decoder(BufReader::new(file))?;

    let mut head = Vec::with_capacity(BLOCK_SIZE as usize);
    decoder.by_ref().take(BLOCK_SIZE).read_to_end(&mut head)?;
    let is_tar = looks_like_tar(&head);
    let mut body = std::io::Cursor::new(head).chain(decoder);

    if is_tar {
        return list_tar(TarArchive::new(body), format);
    }

    let size = std::io::copy(&mut body, &mut std::io::sink())?;
    let name = archive_path
        .file_stem()
        .map_or_else(String::new, |stem| stem.to_string_lossy().into_owned());
    let mut manifest = ArchiveManifest::new(format);
    manifest.add_entry(ArchiveEntry {
        name,
        entry_type: EntryType::File,
        size,
        compressed_size: Some(stored),
        mode: FileMode::from_perm(0o644),
        modified,
    });
    Ok(manifest)
}
