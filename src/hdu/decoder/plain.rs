//! Passthrough decoding for bodies that are stored uncompressed.

use crate::error::Error;
use crate::file::RegularFile;
use crate::hdu::header::EssentialCards;

/// Decoder for an HDU whose logical body equals its stored body.
#[derive(Debug)]
pub(crate) struct PlainDecoder {
    physical_offset_of_body: u64,
}

impl PlainDecoder {
    pub(crate) fn new(physical_offset_of_body: u64) -> Self {
        Self {
            physical_offset_of_body,
        }
    }

    pub(crate) fn logical_body_size(&self, cards: &EssentialCards) -> u64 {
        cards.physical_body_size()
    }

    pub(crate) fn decode_body<R: RegularFile>(
        &self,
        file: &R,
        buf: &mut [u8],
        logical_offset: u64,
    ) -> Result<usize, Error> {
        file.read_at(buf, self.physical_offset_of_body + logical_offset)
    }
}
