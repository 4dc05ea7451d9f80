//! In-memory mock filesystem for testing collectors without a real queue.
//!
//! This module provides `MockFs` which simulates a directory tree in memory,
//! so queue polling can be tested without root access to `/var/qmail`.

use crate::collector::traits::FileSystem;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores file and directory paths only; contents are never read.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Set of regular files.
    files: HashSet<PathBuf>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path);
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Adds `count` message files below a qmail queue subdirectory, spread
    /// over the hashed split directories `0..split`.
    pub fn add_queue_messages(&mut self, dir: impl AsRef<Path>, split: u32, count: u32) {
        let dir = dir.as_ref();
        self.add_dir(dir);
        for bucket in 0..split {
            self.add_dir(dir.join(bucket.to_string()));
        }
        for inode in 0..count {
            let bucket = inode % split.max(1);
            self.add_file(dir.join(bucket.to_string()).join(format!("{}", 100_000 + inode)));
        }
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

impl FileSystem for MockFs {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        // Find all files and directories that are direct children
        for file_path in &self.files {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.directories.contains(path)
    }
}
