//! Single-stream (`.gz`, `.bz2`, `.xz`, `.zst`) extraction.
//!
//! The decompressed stream is sniffed once: a tar header in its first block
//! routes it to the tar driver, anything else is written out as one file.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use tracing::debug;

use super::engine::Materializer;
use super::tar::extract_tar;
use crate::Result;
use crate::formats::CompressionCodec;
use crate::formats::TarArchive;
use crate::formats::compression::gzip_original_name;
use crate::formats::tar::BLOCK_SIZE;
use crate::formats::tar::looks_like_tar;
use crate::types::FileMode;

/// Decompresses `file` with `codec` and materializes the payload.
///
/// `archive_path` names the payload when the stream carries no name of
/// its own and supplies its modification time.
pub(crate) fn extract_stream(
    file: File,
    codec: CompressionCodec,
    archive_path: &Path,
    materializer: &mut Materializer<'_>,
) -> Result<()> {
    let modified = file.metadata()?.modified().unwrap_or_else(|_| SystemTime::now());
    let mut reader = BufReader::new(file);
    let original_name = match codec {
        CompressionCodec::Gzip => gzip_original_name(reader.fill_buf()?),
        _ => None,
    };

    let mut decoder = codec.decoder(reader)?;
    let mut head = Vec::with_capacity(BLOCK_SIZE as usize);
    decoder.by_ref().take(BLOCK_SIZE).read_to_end(&mut head)?;
    let mut body = Cursor::new(head).chain(decoder);

    if looks_like_tar(body.get_ref().0.get_ref()) {
        debug!(codec = codec.name(), "compressed stream holds a tar archive");
        return extract_tar(&mut TarArchive::new(body), materializer);
    }

    let name = original_name
        .as_deref()
        .and_then(base_name)
        .map_or_else(|| payload_name(archive_path, codec), str::to_string);
    debug!(codec = codec.name(), payload = %name, "compressed stream holds a single file");

    materializer.begin_entry(&name, 0, 1)?;
    let Some(path) = materializer.resolve(&name) else {
        return Ok(());
    };
    materializer.file(&path, &mut body, modified, FileMode::from_perm(0o644))?;
    Ok(())
}

/// Last path component of a stored name.
fn base_name(name: &str) -> Option<&str> {
    name.rsplit(['/', '\\']).next().filter(|base| !base.is_empty())
}

/// Derives the payload name from the archive file name.
///
/// `notes.txt.gz` becomes `notes.txt`, `bundle.tgz` becomes `bundle.tar`
/// and a name without the codec's extension gets `.out` appended.
fn payload_name(archive_path: &Path, codec: CompressionCodec) -> String {
    let file_name = archive_path
        .file_name()
        .map_or_else(|| "payload".to_string(), |n| n.to_string_lossy().into_owned());

    let Some((stem, extension)) = file_name.rsplit_once('.') else {
        return format!("{file_name}.out");
    };
    let extension = extension.to_ascii_lowercase();
    if stem.is_empty() {
        return format!("{file_name}.out");
    }
    if extension == codec.extension() {
        return stem.to_string();
    }
    if codec.tar_aliases().contains(&extension.as_str()) {
        return format!("{stem}.tar");
    }
    format!("{file_name}.out")
}
