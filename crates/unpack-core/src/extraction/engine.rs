//! Materializer: the write side of an extraction pass.
//!
//! Container drivers walk their entries and hand each one to a
//! [`Materializer`], which resolves the destination path, creates the
//! directory, file or link, streams file bodies in bounded chunks and keeps
//! the [`ExtractionReport`] up to date. Progress and cancellation are polled
//! once per entry and once per chunk.

use std::fs::File;
use std::fs::OpenOptions;
use std::fs::create_dir_all;
use std::io::BufWriter;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;
use std::time::SystemTime;

use filetime::FileTime;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::ExtractionError;
use crate::ExtractionOptions;
use crate::ExtractionReport;
use crate::ProgressCallback;
use crate::Result;
use crate::copy::CopyBuffer;
use crate::copy::copy_chunked;
use crate::security;
use crate::types::DestDir;
use crate::types::FileMode;

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Materializes entries under one destination root.
pub(crate) struct Materializer<'a> {
    root: DestDir,
    options: &'a ExtractionOptions,
    progress: &'a mut dyn ProgressCallback,
    buffer: CopyBuffer,
    report: ExtractionReport,
    bytes_done: u64,
    entries_seen: usize,
    started: Instant,
}

impl<'a> Materializer<'a> {
    pub(crate) fn new(
        root: DestDir,
        options: &'a ExtractionOptions,
        progress: &'a mut dyn ProgressCallback,
    ) -> Self {
        Self {
            root,
            options,
            progress,
            buffer: CopyBuffer::with_size(options.chunk_size),
            report: ExtractionReport::new(),
            bytes_done: 0,
            entries_seen: 0,
            started: Instant::now(),
        }
    }

    pub(crate) fn options(&self) -> &ExtractionOptions {
        self.options
    }

    pub(crate) fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Announces the next entry. `total` is 0 when the entry count is not
    /// known up front.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Cancelled`] if the progress callback
    /// declines to continue.
    pub(crate) fn begin_entry(&mut self, name: &str, size: u64, total: usize) -> Result<()> {
        self.entries_seen += 1;
        let shown = self.options.display_name(name);
        if !self.options.quiet {
            if self.options.debug {
                info!(entry = %shown, size, index = self.entries_seen, "extracting");
            } else {
                info!(entry = %shown, "extracting");
            }
        }
        if !self.progress.on_entry(&shown, self.entries_seen, total) {
            debug!(entry = %shown, "cancelled before entry");
            return Err(ExtractionError::Cancelled);
        }
        Ok(())
    }

    /// Resolves `name` under the root, recording a skip if it is rejected.
    pub(crate) fn resolve(&mut self, name: &str) -> Option<PathBuf> {
        let path = security::join(self.root.as_path(), name.as_bytes(), true);
        if path.is_none() {
            self.report.skip(format!("skipped unsafe path: {name}"));
        }
        path
    }

    /// Records an entry that is deliberately not materialized.
    pub(crate) fn skip(&mut self, name: &str, reason: &str) {
        warn!(entry = %name, "skipping {reason}");
        self.report.skip(format!("skipped {reason}: {name}"));
    }

    /// Creates a directory (no-op if it exists) and stamps its mtime.
    ///
    /// An entry naming the root itself (`./`) leaves the root untouched.
    pub(crate) fn directory(&mut self, path: &Path, modified: SystemTime) -> Result<()> {
        if path == self.root.as_path() {
            debug!("entry names the extraction root");
            return Ok(());
        }
        create_dir_all(path)?;
        filetime::set_file_mtime(path, FileTime::from_system_time(modified))?;
        self.report.directories_created += 1;
        Ok(())
    }

    /// Streams `reader` into a new file at `path`.
    ///
    /// The file is created with `create_new` unless overwrite mode is on,
    /// in which case an existing non-directory is removed first so that a
    /// planted symlink is replaced rather than followed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists (without overwrite) or
    /// cannot be written, a decoding error from `reader`, or
    /// [`ExtractionError::Cancelled`] from the progress callback. A
    /// cancelled file is left partially written.
    pub(crate) fn file<R: Read + ?Sized>(
        &mut self,
        path: &Path,
        reader: &mut R,
        modified: SystemTime,
        mode: FileMode,
    ) -> Result<u64> {
        if self.skip_if_root(path) {
            return Ok(0);
        }
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        if self.options.overwrite {
            remove_existing(path)?;
        }

        let mtime = FileTime::from_system_time(modified);
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        filetime::set_file_handle_times(&file, None, Some(mtime))?;

        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        let Self {
            buffer,
            progress,
            bytes_done,
            ..
        } = self;
        let written = copy_chunked(reader, &mut writer, buffer, |chunk| {
            *bytes_done += chunk;
            trace!(bytes_done = *bytes_done, "chunk written");
            progress.on_progress(*bytes_done)
        })?;
        let file: File = writer.into_inner().map_err(|e| e.into_error())?;
        drop(file);

        // Writing through the handle may bump the mtime set at open.
        filetime::set_file_mtime(path, mtime)?;
        set_permissions(path, mode)?;

        self.report.files_extracted += 1;
        self.report.bytes_written = self
            .report
            .bytes_written
            .checked_add(written)
            .ok_or_else(|| ExtractionError::InvalidArchive("bytes written overflow u64".into()))?;
        Ok(written)
    }

    /// Creates a symbolic link at `path` pointing at `target`.
    ///
    /// Only `path` has been sanitized; `target` is written as recorded.
    pub(crate) fn symlink(&mut self, path: &Path, target: &str) -> Result<()> {
        if self.skip_if_root(path) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        if self.options.overwrite {
            remove_existing(path)?;
        }

        if !create_symlink(target, path)? {
            let name = path.display().to_string();
            self.skip(&name, "symlink (unsupported on this platform)");
            return Ok(());
        }
        debug!(link = %path.display(), to = %target, "created symlink");
        self.report.symlinks_created += 1;
        Ok(())
    }

    /// Hard-links `path` to the already extracted entry named `target`.
    ///
    /// The target name goes through the same sanitizer as entry names, so
    /// a hard link can never reach outside the root.
    pub(crate) fn hardlink(&mut self, name: &str, path: &Path, target: &str) -> Result<()> {
        if self.skip_if_root(path) {
            return Ok(());
        }
        let Some(source) = security::join(self.root.as_path(), target.as_bytes(), true) else {
            self.skip(name, "hard link with unsafe target");
            return Ok(());
        };
        if !source.is_file() {
            self.skip(name, "hard link to a missing entry");
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        if self.options.overwrite {
            remove_existing(path)?;
        }
        std::fs::hard_link(&source, path)?;
        self.report.hardlinks_created += 1;
        Ok(())
    }

    /// Skips a non-directory entry whose name resolves to the root.
    fn skip_if_root(&mut self, path: &Path) -> bool {
        if path != self.root.as_path() {
            return false;
        }
        let name = path.display().to_string();
        self.skip(&name, "non-directory entry naming the extraction root");
        true
    }

    /// Completes the pass and returns the report.
    pub(crate) fn finish(mut self) -> ExtractionReport {
        self.progress.on_complete();
        self.report.duration = self.started.elapsed();
        debug!(
            files = self.report.files_extracted,
            bytes = self.report.bytes_written,
            skipped = self.report.files_skipped,
            "extraction complete"
        );
        self.report
    }
}

/// Returns `false` when the platform has no symlinks.
#[cfg(unix)]
fn create_symlink(target: &str, path: &Path) -> std::io::Result<bool> {
    std::os::unix::fs::symlink(target, path)?;
    Ok(true)
}

#[cfg(windows)]
fn create_symlink(target: &str, path: &Path) -> std::io::Result<bool> {
    let resolved = path
        .parent()
        .map_or_else(|| PathBuf::from(target), |parent| parent.join(target));
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, path)?;
    } else {
        std::os::windows::fs::symlink_file(target, path)?;
    }
    Ok(true)
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &str, _path: &Path) -> std::io::Result<bool> {
    Ok(false)
}

/// Removes a file or link at `path`; directories are left alone.
fn remove_existing(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => {
            std::fs::remove_file(path)?;
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: FileMode) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let perm = mode.perm();
    if perm != 0 {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(perm))?;
    }
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn set_permissions(_path: &Path, _mode: FileMode) -> Result<()> {
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::NoopProgress;
    use std::time::Duration;
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    struct StopAt(u64);

    impl ProgressCallback for StopAt {
        fn on_entry(&mut self, _name: &str, _current: usize, _total: usize) -> bool {
            true
        }

        fn on_progress(&mut self, bytes_done: u64) -> bool {
            bytes_done < self.0
        }

        fn on_complete(&mut self) {}
    }

    fn mtime() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_600_000_000)
    }

    #[test]
    fn test_file_written_with_mtime() {
        let temp = TempDir::new().unwrap();
        let options = ExtractionOptions::default().with_quiet(true);
        let mut progress = NoopProgress;
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);

        let path = m.resolve("a/b.txt").unwrap();
        let written = m
            .file(&path, &mut &b"hello"[..], mtime(), FileMode::from_perm(0o644))
            .unwrap();
        assert_eq!(written, 5);

        let report = m.finish();
        assert_eq!(report.files_extracted, 1);
        assert_eq!(report.bytes_written, 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_600_000_000);
    }

    #[test]
    fn test_existing_file_fails_without_overwrite() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("x.txt"), b"old").unwrap();

        let options = ExtractionOptions::default().with_quiet(true);
        let mut progress = NoopProgress;
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);
        let path = m.resolve("x.txt").unwrap();
        let err = m
            .file(&path, &mut &b"new"[..], mtime(), FileMode::default())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));
    }

    #[test]
    fn test_overwrite_replaces_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("x.txt"), b"old contents").unwrap();

        let options = ExtractionOptions::default().with_quiet(true).with_overwrite(true);
        let mut progress = NoopProgress;
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);
        let path = m.resolve("x.txt").unwrap();
        m.file(&path, &mut &b"new"[..], mtime(), FileMode::default())
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_rejected_path_is_skipped() {
        let temp = TempDir::new().unwrap();
        let options = ExtractionOptions::default().with_quiet(true);
        let mut progress = NoopProgress;
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);

        assert!(m.resolve("../../evil.txt").is_none());
        let report = m.finish();
        assert_eq!(report.files_skipped, 1);
        assert!(report.warnings[0].contains("evil.txt"));
    }

    #[test]
    fn test_dot_entry_names_the_root() {
        let temp = TempDir::new().unwrap();
        let options = ExtractionOptions::default().with_quiet(true);
        let mut progress = NoopProgress;
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);

        let root = m.resolve("./").unwrap();
        assert_eq!(root, m.root());
        m.directory(&root, mtime()).unwrap();
        let written = m
            .file(&root, &mut &b"data"[..], mtime(), FileMode::default())
            .unwrap();
        assert_eq!(written, 0);

        let report = m.finish();
        assert_eq!(report.directories_created, 0);
        assert_eq!(report.files_extracted, 0);
        assert_eq!(report.files_skipped, 1);
    }

    #[test]
    fn test_cancel_mid_file() {
        let temp = TempDir::new().unwrap();
        let options = ExtractionOptions::default()
            .with_quiet(true)
            .with_chunk_size(4);
        let mut progress = StopAt(8);
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);

        let path = m.resolve("big.bin").unwrap();
        let data = [7u8; 64];
        let err = m
            .file(&path, &mut &data[..], mtime(), FileMode::default())
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
    }

    #[test]
    fn test_directory_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let options = ExtractionOptions::default().with_quiet(true);
        let mut progress = NoopProgress;
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);

        let path = m.resolve("d/e").unwrap();
        m.directory(&path, mtime()).unwrap();
        m.directory(&path, mtime()).unwrap();
        assert!(path.is_dir());
        assert_eq!(m.finish().directories_created, 2);
    }

    #[test]
    fn test_hardlink_to_missing_target_is_skipped() {
        let temp = TempDir::new().unwrap();
        let options = ExtractionOptions::default().with_quiet(true);
        let mut progress = NoopProgress;
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);

        let path = m.resolve("link").unwrap();
        m.hardlink("link", &path, "nowhere.txt").unwrap();
        m.hardlink("link", &path, "../outside").unwrap();
        let report = m.finish();
        assert_eq!(report.hardlinks_created, 0);
        assert_eq!(report.files_skipped, 2);
    }

    #[test]
    fn test_hardlink_shares_contents() {
        let temp = TempDir::new().unwrap();
        let options = ExtractionOptions::default().with_quiet(true);
        let mut progress = NoopProgress;
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);

        let source = m.resolve("a.txt").unwrap();
        m.file(&source, &mut &b"shared"[..], mtime(), FileMode::default())
            .unwrap();
        let link = m.resolve("b.txt").unwrap();
        m.hardlink("b.txt", &link, "a.txt").unwrap();
        assert_eq!(std::fs::read(&link).unwrap(), b"shared");
        assert_eq!(m.finish().hardlinks_created, 1);
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_target_written_verbatim() {
        let temp = TempDir::new().unwrap();
        let options = ExtractionOptions::default().with_quiet(true);
        let mut progress = NoopProgress;
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);

        let path = m.resolve("link").unwrap();
        m.symlink(&path, "a.txt").unwrap();
        assert_eq!(std::fs::read_link(&path).unwrap(), PathBuf::from("a.txt"));
        assert_eq!(m.finish().symlinks_created, 1);
    }

    #[test]
    fn test_begin_entry_cancel() {
        struct Refuse;
        impl ProgressCallback for Refuse {
            fn on_entry(&mut self, _name: &str, _current: usize, _total: usize) -> bool {
                false
            }
            fn on_progress(&mut self, _bytes_done: u64) -> bool {
                true
            }
            fn on_complete(&mut self) {}
        }

        let temp = TempDir::new().unwrap();
        let options = ExtractionOptions::default().with_quiet(true);
        let mut progress = Refuse;
        let mut m = Materializer::new(DestDir::new(temp.path()).unwrap(), &options, &mut progress);
        assert!(m.begin_entry("a", 0, 1).unwrap_err().is_cancelled());
    }
}
