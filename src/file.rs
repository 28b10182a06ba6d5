//! Random-access byte sources and directory handles.
//!
//! The reader consumes these capabilities from below and offers the
//! [`RegularFile`] capability again from above, over the logical
//! (uncompressed) view.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Error;

/// The subset of a POSIX `stat` the reader consumes and produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes. On the logical side this is the expanded size.
    pub size: u64,
    /// Last modification time, when the source knows one.
    pub modified: Option<SystemTime>,
}

/// A regular file addressed by position.
pub trait RegularFile {
    /// Returns the stat of the file.
    fn stat(&self) -> Result<FileStat, Error>;

    /// Reads `buf.len()` bytes starting at `offset`.
    ///
    /// Implementations retry interrupted reads internally and return a short
    /// count only at end of file; every other failure is an `Err`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error>;
}

/// One directory entry, for the mounting layer above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
}

/// A directory handle with relative open and stat capabilities.
pub trait Directory {
    type File: RegularFile;

    /// Returns the stat of the directory itself.
    fn stat(&self) -> Result<FileStat, Error>;

    /// Reads the entry at position `offset`, `None` past the last one.
    fn read_entry(&self, offset: u64) -> Result<Option<DirEntry>, Error>;

    /// Stats `path` relative to this directory.
    fn stat_at(&self, path: &Path) -> Result<FileStat, Error>;

    /// Opens `path` relative to this directory, read-only.
    fn open_at(&self, path: &Path) -> Result<Self::File, Error>;
}

pub(crate) fn open_path(path: &Path) -> Result<fs::File, Error> {
    fs::File::open(path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            Error::NotFound
        } else {
            err.into()
        }
    })
}

fn stat_of(metadata: &fs::Metadata) -> FileStat {
    FileStat {
        size: metadata.len(),
        modified: metadata.modified().ok(),
    }
}

impl RegularFile for fs::File {
    fn stat(&self) -> Result<FileStat, Error> {
        Ok(stat_of(&self.metadata()?))
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
        use std::os::unix::fs::FileExt;

        let mut nread = 0;
        while nread < buf.len() {
            match FileExt::read_at(self, &mut buf[nread..], offset + nread as u64) {
                Ok(0) => break,
                Ok(n) => nread += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(nread)
    }
}

impl RegularFile for &[u8] {
    fn stat(&self) -> Result<FileStat, Error> {
        Ok(FileStat {
            size: self.len() as u64,
            modified: None,
        })
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
        if offset >= self.len() as u64 {
            return Ok(0);
        }
        let available = &self[offset as usize..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

impl RegularFile for Vec<u8> {
    fn stat(&self) -> Result<FileStat, Error> {
        self.as_slice().stat()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
        self.as_slice().read_at(buf, offset)
    }
}

/// Std-filesystem implementation of [`Directory`].
#[derive(Debug)]
pub struct DirHandle {
    path: PathBuf,
}

impl DirHandle {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                Error::NotFound
            } else {
                Error::from(err)
            }
        })?;
        if !metadata.is_dir() {
            return Err(Error::NotFound);
        }
        Ok(Self { path })
    }
}

impl Directory for DirHandle {
    type File = fs::File;

    fn stat(&self) -> Result<FileStat, Error> {
        Ok(stat_of(&fs::metadata(&self.path)?))
    }

    fn read_entry(&self, offset: u64) -> Result<Option<DirEntry>, Error> {
        for (i, entry) in fs::read_dir(&self.path)?.enumerate() {
            let entry = entry?;
            if i as u64 == offset {
                return Ok(Some(DirEntry {
                    name: entry.file_name(),
                }));
            }
        }
        Ok(None)
    }

    fn stat_at(&self, path: &Path) -> Result<FileStat, Error> {
        Ok(stat_of(&fs::metadata(self.path.join(path))?))
    }

    fn open_at(&self, path: &Path) -> Result<Self::File, Error> {
        open_path(&self.path.join(path))
    }
}
