//! File tailer for reading new lines from a multilog `current` file.
//!
//! Rotation is not detected here: the owning watch learns about it from a
//! directory notification and calls [`FileTailer::reopen`] after draining.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::line_buffer::LineBuffer;
use crate::error::Error;

/// Reads new lines appended to one file inside a watched directory.
///
/// On creation, seeks to the end of the file (does not read old content).
/// After `reopen()`, reads the replacement file from its start.
#[derive(Debug)]
pub struct FileTailer {
    dir: PathBuf,
    file_name: OsString,
    file: Option<File>,
    buffer: LineBuffer,
}

impl FileTailer {
    /// Create a new tailer for `dir/file_name`, starting from the end of the file.
    ///
    /// A missing or unreadable file is not an error: the tailer stays
    /// detached until the next `reopen()`.
    pub fn new(dir: PathBuf, file_name: impl Into<OsString>, capacity: usize) -> Self {
        let mut tailer = Self {
            dir,
            file_name: file_name.into(),
            file: None,
            buffer: LineBuffer::new(capacity),
        };

        let path = tailer.path();
        match open_at_end(&path) {
            Ok(file) => tailer.file = Some(file),
            Err(e) => warn!(path = %path.display(), error = %e, "log file not available yet"),
        }

        tailer
    }

    /// Full path of the tailed file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    /// Whether a created entry at `path` replaces the tailed file.
    pub fn matches(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
            && path.file_name() == Some(self.file_name.as_os_str())
    }

    /// Reads everything appended since the last call, dispatching complete
    /// lines to `on_line`.
    ///
    /// Returns the number of dispatched lines. A detached tailer reads nothing.
    pub fn read_lines<F>(&mut self, on_line: F) -> Result<usize, Error>
    where
        F: FnMut(&str),
    {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };

        self.buffer
            .consume(file, on_line)
            .map_err(|source| Error::Read {
                path: self.dir.join(&self.file_name),
                source,
            })
    }

    /// Closes the current handle and opens the file again from its start.
    ///
    /// Any partial line of the old file is dropped so fragments of two files
    /// are never joined.
    pub fn reopen(&mut self) {
        let path = self.path();

        self.file = None;
        if self.buffer.buffered() > 0 {
            debug!(
                path = %path.display(),
                bytes = self.buffer.buffered(),
                "dropping unterminated line of rotated file"
            );
        }
        self.buffer.clear();

        match File::open(&path) {
            Ok(file) => {
                debug!(path = %path.display(), "reopened log file");
                self.file = Some(file);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "cannot reopen log file"),
        }
    }
}

fn open_at_end(path: &Path) -> io::Result<File> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(0))?;
    Ok(file)
}
