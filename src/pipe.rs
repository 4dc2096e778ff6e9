//! The named pipe shared by every collector.
//!
//! A [`StatsPipe`] is constructed once and handed to collectors as an
//! `Arc`. Each dumper opens its own [`PipeWriter`], but all writers of one
//! `StatsPipe` go through the same lock, so lines from different collectors
//! never interleave.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};

use crate::config::PipeConfig;
use crate::{Error, Result};

#[derive(Debug)]
pub struct StatsPipe {
    config: PipeConfig,
    write_lock: Mutex<()>,
}

impl StatsPipe {
    pub fn new(config: PipeConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            write_lock: Mutex::new(()),
        })
    }

    pub fn at(path: impl AsRef<Path>) -> Arc<Self> {
        Self::new(PipeConfig::at(path.as_ref()))
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &PipeConfig {
        &self.config
    }

    /// Creates the FIFO if nothing exists at the path yet.
    ///
    /// An existing entry is left untouched, so calling this repeatedly (or
    /// from several collectors) never replaces a pipe a consumer already
    /// holds open.
    pub fn ensure_exists(&self) -> Result<()> {
        let path = self.path();
        match fs::metadata(path) {
            Ok(meta) => {
                if !meta.file_type().is_fifo() {
                    warn!(
                        "stats pipe {} exists but is not a FIFO; writing to it anyway",
                        path.display()
                    );
                }
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => create_fifo(path, self.config.mode),
            Err(source) => Err(Error::PipeProbe {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Opens a write handle on the pipe.
    ///
    /// The FIFO is opened read-write: a write-only open would block until a
    /// reader attaches.
    pub fn open(self: &Arc<Self>) -> Result<PipeWriter> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path())
            .map_err(|source| Error::PipeOpen {
                path: self.path().to_path_buf(),
                source,
            })?;
        Ok(PipeWriter {
            pipe: Arc::clone(self),
            file,
        })
    }
}

/// A dumper's handle on the shared pipe. Closed on drop.
#[derive(Debug)]
pub struct PipeWriter {
    pipe: Arc<StatsPipe>,
    file: File,
}

impl PipeWriter {
    /// Writes `body` followed by a newline as one write under the pipe lock.
    pub fn write_line(&mut self, body: &[u8]) -> Result<()> {
        let mut line = Vec::with_capacity(body.len() + 1);
        line.extend_from_slice(body);
        line.push(b'\n');

        // The lock orders writes only; it guards no data, so poison is harmless.
        let _guard = self
            .pipe
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.file.write_all(&line).map_err(Error::Write)
    }

    pub fn pipe(&self) -> &Arc<StatsPipe> {
        &self.pipe
    }
}

fn create_fifo(path: &Path, mode: u32) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::InvalidPath(path.to_path_buf()))?;
    let res = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if res == 0 {
        info!("created stats pipe {}", path.display());
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    // Another collector got there between our probe and mkfifo.
    if err.kind() == ErrorKind::AlreadyExists {
        return Ok(());
    }
    Err(Error::PipeCreate {
        path: path.to_path_buf(),
        source: err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::fs::{MetadataExt, OpenOptionsExt};

    #[test]
    fn test_ensure_exists_creates_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = StatsPipe::at(dir.path().join("monitorPipe"));

        pipe.ensure_exists().unwrap();
        let meta = fs::metadata(pipe.path()).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[test]
    fn test_ensure_exists_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = StatsPipe::at(dir.path().join("monitorPipe"));

        pipe.ensure_exists().unwrap();
        let first = fs::metadata(pipe.path()).unwrap();
        pipe.ensure_exists().unwrap();
        let second = fs::metadata(pipe.path()).unwrap();

        assert_eq!(first.ino(), second.ino());
        assert_eq!(first.dev(), second.dev());
    }

    #[test]
    fn test_existing_regular_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitorPipe");
        fs::write(&path, b"").unwrap();

        StatsPipe::at(&path).ensure_exists().unwrap();
        assert!(fs::metadata(&path).unwrap().is_file());
    }

    #[test]
    fn test_probe_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("plain");
        fs::write(&not_a_dir, b"").unwrap();

        let err = StatsPipe::at(not_a_dir.join("monitorPipe"))
            .ensure_exists()
            .unwrap_err();
        assert!(matches!(err, Error::PipeProbe { .. }), "{err}");
    }

    #[test]
    fn test_create_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = StatsPipe::at(dir.path().join("missing").join("monitorPipe"))
            .ensure_exists()
            .unwrap_err();
        assert!(matches!(err, Error::PipeCreate { .. }), "{err}");
    }

    #[test]
    fn test_open_missing_pipe_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = StatsPipe::at(dir.path().join("monitorPipe"))
            .open()
            .unwrap_err();
        assert!(matches!(err, Error::PipeOpen { .. }), "{err}");
    }

    #[test]
    fn test_write_line_appends_newline() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = StatsPipe::at(dir.path().join("monitorPipe"));
        pipe.ensure_exists().unwrap();

        let mut reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(pipe.path())
            .unwrap();

        // Opening read-write must not wait for the reader above.
        let mut writer = pipe.open().unwrap();
        writer.write_line(br#"{"a":1}"#).unwrap();
        writer.write_line(br#"{"b":2}"#).unwrap();
        drop(writer);

        let mut contents = String::new();
        reader.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "{\"a\":1}\n{\"b\":2}\n");
    }
}
