//! Decoding of an HDU body from its stored form into the logical view.

pub(crate) mod plain;
pub(crate) mod tiled;

use std::sync::Mutex;

use crate::error::Error;
use crate::file::RegularFile;
use crate::hdu::header::{EssentialCards, Header};

pub(crate) use plain::PlainDecoder;
pub(crate) use tiled::TiledDecoder;

/// The two ways an HDU body reaches the logical view.
#[derive(Debug)]
pub(crate) enum Decoder {
    /// The body is served from the source unchanged.
    Plain(PlainDecoder),
    /// The body is a tile-compressed image, expanded on demand.
    Tiled(TiledDecoder),
}

impl Decoder {
    /// Picks the decoder for an HDU.
    ///
    /// The tiled decoder is probed first; when it rejects the header as not
    /// a supported compressed image, the plain decoder takes over and the
    /// HDU is exposed as-is. Any other probe failure aborts the HDU load.
    pub(crate) fn select(
        physical_offset_of_body: u64,
        cards: &EssentialCards,
    ) -> Result<Self, Error> {
        match TiledDecoder::new(physical_offset_of_body, cards) {
            Ok(tiled) => Ok(Decoder::Tiled(tiled)),
            Err(Error::IllegalSequence(_)) => {
                Ok(Decoder::Plain(PlainDecoder::new(physical_offset_of_body)))
            }
            Err(err) => Err(err),
        }
    }

    /// Bytes the body occupies in the logical view, padding included.
    pub(crate) fn logical_body_size(&self, cards: &EssentialCards) -> u64 {
        match self {
            Decoder::Plain(plain) => plain.logical_body_size(cards),
            Decoder::Tiled(tiled) => tiled.logical_body_size(cards),
        }
    }

    /// Rewrites the header in place to describe the logical layout.
    pub(crate) fn decode_header(&self, cards: &EssentialCards, header: &mut Header) {
        match self {
            Decoder::Plain(_) => {}
            Decoder::Tiled(tiled) => tiled.decode_header(cards, header),
        }
    }

    /// Fills `buf` with the logical body bytes starting at `logical_offset`.
    ///
    /// Returns the number of bytes produced; safe to call concurrently.
    pub(crate) fn decode_body<R: RegularFile>(
        &self,
        file: &R,
        buf: &mut [u8],
        logical_offset: u64,
    ) -> Result<usize, Error> {
        match self {
            Decoder::Plain(plain) => plain.decode_body(file, buf, logical_offset),
            Decoder::Tiled(tiled) => tiled.decode_body(file, buf, logical_offset),
        }
    }

    /// Eagerly decodes the whole body with `num_threads` workers.
    ///
    /// Idempotent; failures are left for the demand path to report.
    pub(crate) fn predecode_all<R: RegularFile + Sync>(
        &self,
        file: &R,
        num_threads: usize,
        lock: &Mutex<()>,
    ) {
        match self {
            Decoder::Plain(_) => {}
            Decoder::Tiled(tiled) => tiled.predecode_all(file, num_threads, lock),
        }
    }
}
