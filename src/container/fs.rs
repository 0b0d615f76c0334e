//! Filesystem operations used when writing and committing a rewrite.
//!
//! Abstracted behind a trait so the commit protocol can be exercised with
//! injected failures.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Destination a write session encrypts into.
pub trait TempFile: Write + Send {
    /// Flush the file's contents to stable storage.
    fn sync_all(&self) -> io::Result<()>;
}

impl TempFile for File {
    fn sync_all(&self) -> io::Result<()> {
        File::sync_all(self)
    }
}

/// The filesystem steps of the write-then-swap commit.
pub trait FileOps: Send + Sync {
    /// Create (or truncate) the temp file a rewrite is written to.
    fn create_temp(&self, path: &Path) -> io::Result<Box<dyn TempFile>>;

    fn sync(&self, file: &dyn TempFile) -> io::Result<()>;

    /// Atomically move `from` over `to`, replacing `to` if it exists.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// `FileOps` backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn create_temp(&self, path: &Path) -> io::Result<Box<dyn TempFile>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(file))
    }

    fn sync(&self, file: &dyn TempFile) -> io::Result<()> {
        file.sync_all()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}
