//! This crate implements transparent random-access reading of FITS files
//! whose image HDUs are stored as GZIP_2 tile-compressed binary tables.
//!
//! A [`FitsFile`] answers positional reads with the bytes of the
//! *uncompressed equivalent* of the file it wraps: compressed-image HDUs
//! appear as plain IMAGE extensions with their headers rewritten
//! accordingly, everything else passes through unchanged. Tiles are
//! inflated at most once and cached; readers may share the file across
//! threads.
//!
//! # Examples
//!
//! Basic usage:
//!
//! ```no_run
//! use fitsexpand::{FitsFile, OpenOptions};
//!
//! # fn main() -> Result<(), fitsexpand::Error> {
//! let fits = FitsFile::open_with("image.fits.fz", OpenOptions { num_threads: 4 })?;
//!
//! // The size the file would have with every image HDU expanded.
//! let size = fits.stat()?.size;
//!
//! // Any byte range of the expanded file, on demand.
//! let mut page = vec![0u8; 4096];
//! let n = fits.read_at(&mut page, 2880)?;
//! # let _ = (size, n);
//! # Ok(())
//! # }
//! ```

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    clippy::uninlined_format_args,
    clippy::match_same_arms
)]

#[macro_use]
extern crate quick_error;

pub mod card;
pub mod error;
pub mod file;
pub mod fits;
pub mod gz;
pub mod hdu;
mod parallel;

#[cfg(test)]
pub(crate) mod sample;

pub use error::Error;
pub use file::{DirEntry, DirHandle, Directory, FileStat, RegularFile};
pub use fits::{logical_stat, logical_stat_at, FitsFile, OpenOptions};
pub use hdu::header::Header;
