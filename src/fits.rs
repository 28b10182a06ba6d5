//! The top-level reader: a FITS file presented as its uncompressed
//! equivalent, addressable by byte position.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use log::debug;

use crate::error::Error;
use crate::file::{self, Directory, FileStat, RegularFile};
use crate::hdu::{Hdu, HduSlot};
use crate::parallel::lock;

/// Options honored by [`FitsFile`] constructors.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Number of workers for the eager pre-decode of compressed bodies.
    ///
    /// With a positive count, the first read touching the body of a
    /// compressed HDU decodes every tile of that HDU with this many
    /// threads. With zero, tiles are decoded on demand by the reading
    /// thread.
    pub num_threads: usize,
}

/// A FITS file exposed as the byte stream it would have if every
/// tile-compressed image HDU were expanded in place.
///
/// The reader is addressed by position and may be shared between threads;
/// concurrent reads of any ranges return the same bytes a serial run would.
///
/// ```no_run
/// use fitsexpand::FitsFile;
///
/// # fn main() -> Result<(), fitsexpand::Error> {
/// let fits = FitsFile::open("image.fits.fz")?;
/// let expanded_size = fits.stat()?.size;
///
/// let mut first_block = [0u8; 2880];
/// fits.read_at(&mut first_block, 0)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FitsFile<R> {
    file: R,
    num_threads: usize,

    /// Serializes chain growth and the per-HDU pre-decode warm-up.
    chain_lock: Mutex<()>,
    /// The primary HDU, loaded on first use.
    head: OnceLock<HduSlot>,
}

impl<R> FitsFile<R>
where
    R: RegularFile + Sync,
{
    /// Wraps an already-open source.
    pub fn from_file(file: R, options: OpenOptions) -> Self {
        Self {
            file,
            num_threads: options.num_threads,
            chain_lock: Mutex::new(()),
            head: OnceLock::new(),
        }
    }

    /// Opens `path` relative to `dir`.
    pub fn open_at<D>(dir: &D, path: &Path, options: OpenOptions) -> Result<Self, Error>
    where
        D: Directory<File = R>,
    {
        Ok(Self::from_file(dir.open_at(path)?, options))
    }

    /// Returns the HDU after `prev`, or the primary HDU for `None`.
    ///
    /// A populated slot is returned without taking the lock; otherwise the
    /// chain lock is held while exactly one caller loads and publishes the
    /// node. `Ok(None)` is the end of the file.
    fn next_hdu<'a>(&'a self, prev: Option<&'a Hdu>) -> Result<Option<&'a Hdu>, Error> {
        let slot = match prev {
            None => &self.head,
            Some(hdu) => &hdu.next,
        };

        let loaded: &HduSlot = match slot.get() {
            Some(loaded) => loaded,
            None => {
                let _guard = lock(&self.chain_lock);
                // Re-checked under the lock; only the first caller loads.
                slot.get_or_init(|| {
                    let (physical_offset, logical_offset) = match prev {
                        None => (0, 0),
                        Some(hdu) => (
                            hdu.physical_offset_of_next_hdu,
                            hdu.logical_offset_of_next_hdu,
                        ),
                    };
                    Hdu::load_from_file(&self.file, physical_offset, logical_offset)
                })
            }
        };

        match loaded {
            Ok(next) => Ok(next.as_deref()),
            Err(err) => Err(err.clone()),
        }
    }

    /// Stat of the logical view: the source's stat with the size replaced
    /// by the total expanded size.
    pub fn stat(&self) -> Result<FileStat, Error> {
        let mut last: Option<&Hdu> = None;
        let mut next = self.next_hdu(None)?;
        while let Some(hdu) = next {
            last = Some(hdu);
            next = self.next_hdu(Some(hdu))?;
        }

        let mut stat = self.file.stat()?;
        if let Some(last) = last {
            stat.size = last.logical_offset_of_next_hdu;
        }
        Ok(stat)
    }

    /// Reads `buf.len()` bytes of the logical view starting at `offset`.
    ///
    /// Returns the number of bytes produced, short only when the range
    /// reaches past the logical end of file.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
        let offset_of_end = offset
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= i64::MAX as u64)
            .ok_or(Error::InvalidArgument)?;

        let total = buf.len();
        let mut offset = offset;
        let mut filled = 0;

        let mut prev: Option<&Hdu> = None;
        while filled < total {
            let hdu = match self.next_hdu(prev)? {
                Some(hdu) => hdu,
                None => break,
            };
            prev = Some(hdu);

            let logical_hdu_end = hdu.logical_offset_of_next_hdu;
            if logical_hdu_end <= offset {
                continue;
            }

            debug_assert!(hdu.logical_offset_of_header <= offset);

            if offset < hdu.logical_offset_of_body {
                let copy_end = hdu.logical_offset_of_body.min(offset_of_end);
                let n = (copy_end - offset) as usize;
                hdu.header.copy_to_buffer(
                    &mut buf[filled..filled + n],
                    offset - hdu.logical_offset_of_header,
                );
                offset = copy_end;
                filled += n;
                if filled == total {
                    break;
                }
            }

            if self.num_threads > 0 {
                hdu.decoder
                    .predecode_all(&self.file, self.num_threads, &self.chain_lock);
            }

            let copy_end = logical_hdu_end.min(offset_of_end);
            let n = (copy_end - offset) as usize;
            let ndecoded = hdu.decoder.decode_body(
                &self.file,
                &mut buf[filled..filled + n],
                offset - hdu.logical_offset_of_body,
            )?;
            if ndecoded != n {
                return Err(Error::IllegalSequence(
                    "body ends before the size its header declares",
                ));
            }
            offset = copy_end;
            filled += n;
        }

        Ok(filled)
    }

    /// Reads the whole expanded file into memory.
    pub fn read_all(&self) -> Result<Vec<u8>, Error> {
        let size = self.stat()?.size as usize;

        let mut buf = Vec::new();
        buf.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
        buf.resize(size, 0);

        let n = self.read_at(&mut buf, 0)?;
        buf.truncate(n);
        Ok(buf)
    }
}

impl FitsFile<fs::File> {
    /// Opens a FITS file from the filesystem.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::open_with(path, OpenOptions::default())
    }

    /// Opens a FITS file from the filesystem with explicit options.
    pub fn open_with<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("opening {path:?} with {} threads", options.num_threads);
        Ok(Self::from_file(file::open_path(path)?, options))
    }
}

/// The logical view is itself a regular file: the same capability the
/// reader consumes from below is offered again from above.
impl<R> RegularFile for FitsFile<R>
where
    R: RegularFile + Sync,
{
    fn stat(&self) -> Result<FileStat, Error> {
        FitsFile::stat(self)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
        FitsFile::read_at(self, buf, offset)
    }
}

/// Stats the logical view of the file at `path`: open, stat, close.
pub fn logical_stat<P: AsRef<Path>>(path: P) -> Result<FileStat, Error> {
    FitsFile::open(path)?.stat()
}

/// Stats the logical view of `path` relative to `dir`.
pub fn logical_stat_at<D>(dir: &D, path: &Path) -> Result<FileStat, Error>
where
    D: Directory,
    D::File: Sync,
{
    FitsFile::open_at(dir, path, OpenOptions::default())?.stat()
}
