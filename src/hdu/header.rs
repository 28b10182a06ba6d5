//! Header part of an HDU: a sequence of 2880-byte blocks of 36 cards each,
//! terminated by the block holding the `END` card.

use crate::card::{self, CARD_SIZE};
use crate::error::Error;
use crate::file::RegularFile;

/// Size of a FITS block in bytes.
pub const BLOCK_SIZE: usize = 2880;

/// Number of cards per header block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

type Block = [u8; BLOCK_SIZE];

/// Rounds `netsize` up to the enclosing multiple of the block size.
pub(crate) fn block_aligned(netsize: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    netsize.div_euclid(block) * block + if netsize % block == 0 { 0 } else { block }
}

/// The raw header of one HDU.
///
/// Cards are kept as read from the source (or as rewritten by a decoder);
/// the logical view serves these bytes back verbatim.
#[derive(Debug)]
pub struct Header {
    blocks: Vec<Box<Block>>,
}

impl Header {
    /// Reads header blocks from `offset` until the `END` card.
    ///
    /// Returns the header and the offset of the byte after its last block.
    /// `Ok(None)` is a clean end of file: nothing (or only zero padding
    /// shorter than one block) remains where the next HDU would start.
    pub(crate) fn read_from<R: RegularFile>(
        file: &R,
        mut offset: u64,
    ) -> Result<Option<(Header, u64)>, Error> {
        let mut blocks: Vec<Box<Block>> = Vec::new();

        loop {
            let mut block: Box<Block> = Box::new([0u8; BLOCK_SIZE]);
            let nread = file.read_at(&mut block[..], offset)?;

            if nread != BLOCK_SIZE {
                // Zero bytes may trail the last HDU of a file.
                return if blocks.is_empty() && block[..nread].iter().all(|&b| b == 0) {
                    Ok(None)
                } else {
                    Err(Error::IllegalSequence("truncated header block"))
                };
            }

            if blocks.is_empty() && &block[..9] != b"SIMPLE  =" && &block[..9] != b"XTENSION=" {
                return Err(Error::IllegalSequence(
                    "header does not start with SIMPLE or XTENSION",
                ));
            }

            offset += BLOCK_SIZE as u64;

            let is_last = block
                .chunks_exact(CARD_SIZE)
                .any(|c| card::keyword(c) == b"END      ");
            blocks.push(block);

            if is_last {
                return Ok(Some((Header { blocks }, offset)));
            }
        }
    }

    /// Total size of the header in bytes.
    pub fn byte_len(&self) -> u64 {
        (self.blocks.len() * BLOCK_SIZE) as u64
    }

    /// Copies `buf.len()` header bytes starting at `offset` into `buf`.
    ///
    /// The requested range must lie inside the header.
    pub(crate) fn copy_to_buffer(&self, buf: &mut [u8], offset: u64) {
        debug_assert!(offset + buf.len() as u64 <= self.byte_len());

        let mut offset = offset as usize;
        let mut filled = 0;
        while filled < buf.len() {
            let block = &self.blocks[offset / BLOCK_SIZE];
            let in_block = offset % BLOCK_SIZE;
            let n = (BLOCK_SIZE - in_block).min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&block[in_block..in_block + n]);
            filled += n;
            offset += n;
        }
    }

    /// Iterates over the 80-byte cards of the header.
    pub fn cards(&self) -> impl Iterator<Item = &[u8]> {
        self.blocks.iter().flat_map(|b| b.chunks_exact(CARD_SIZE))
    }

    pub(crate) fn cards_mut(&mut self) -> impl Iterator<Item = &mut [u8]> {
        self.blocks
            .iter_mut()
            .flat_map(|b| b.chunks_exact_mut(CARD_SIZE))
    }
}

/// The cards the reader interprets, pre-parsed into host types.
///
/// Absent cards keep their zero/empty defaults, except `GCOUNT` which
/// defaults to 1. A later duplicate card overrides an earlier one.
#[derive(Debug, Clone, Default)]
pub(crate) struct EssentialCards {
    pub xtension: String,
    pub bitpix: i64,
    pub naxis: i64,
    pub naxes: [i64; 2],
    pub pcount: i64,
    pub gcount: i64,

    pub zimage: bool,
    pub zcmptype: String,
    pub zquantiz: String,
    pub zbitpix: i64,
    pub znaxis: i64,
    pub znaxes: [i64; 2],
    pub ztile: [i64; 2],
    pub tfields: i64,
    pub tform1: String,
    pub ttype1: String,
    pub theap: i64,
}

impl EssentialCards {
    pub(crate) fn parse(header: &Header) -> Result<Self, Error> {
        let mut out = EssentialCards {
            gcount: 1,
            ..Default::default()
        };

        for c in header.cards() {
            let v = card::value(c);
            match card::keyword(c) {
                b"XTENSION=" => out.xtension = card::parse_character_string(v)?,
                b"BITPIX  =" => out.bitpix = card::parse_integer(v)?,
                b"NAXIS   =" => out.naxis = card::parse_integer(v)?,
                b"NAXIS1  =" => out.naxes[0] = card::parse_integer(v)?,
                b"NAXIS2  =" => out.naxes[1] = card::parse_integer(v)?,
                b"PCOUNT  =" => out.pcount = card::parse_integer(v)?,
                b"GCOUNT  =" => out.gcount = card::parse_integer(v)?,
                b"ZIMAGE  =" => out.zimage = card::parse_logical(v)?,
                b"ZCMPTYPE=" => out.zcmptype = card::parse_character_string(v)?,
                b"ZQUANTIZ=" => out.zquantiz = card::parse_character_string(v)?,
                b"ZBITPIX =" => out.zbitpix = card::parse_integer(v)?,
                b"ZNAXIS  =" => out.znaxis = card::parse_integer(v)?,
                b"ZNAXIS1 =" => out.znaxes[0] = card::parse_integer(v)?,
                b"ZNAXIS2 =" => out.znaxes[1] = card::parse_integer(v)?,
                b"ZTILE1  =" => out.ztile[0] = card::parse_integer(v)?,
                b"ZTILE2  =" => out.ztile[1] = card::parse_integer(v)?,
                b"TFIELDS =" => out.tfields = card::parse_integer(v)?,
                b"TFORM1  =" => out.tform1 = card::parse_character_string(v)?,
                b"TTYPE1  =" => out.ttype1 = card::parse_character_string(v)?,
                b"THEAP   =" => out.theap = card::parse_integer(v)?,
                _ => {}
            }
        }

        Ok(out)
    }

    /// Size in bytes of the HDU body as stored in the source, padding
    /// included.
    pub(crate) fn physical_body_size(&self) -> u64 {
        let mut nelem = 0u64;
        if self.naxis > 0 {
            // Only the two tracked axes contribute; the reader does not
            // decode bodies with more.
            nelem = 1;
            for i in 0..(self.naxis.min(2) as usize) {
                nelem *= self.naxes[i].max(0) as u64;
            }
        }

        let netsize = bytes_per_element(self.bitpix)
            * self.gcount.max(0) as u64
            * (self.pcount.max(0) as u64 + nelem);
        block_aligned(netsize)
    }
}

/// Width in bytes of one element of the given BITPIX.
pub(crate) fn bytes_per_element(bitpix: i64) -> u64 {
    bitpix.unsigned_abs() / 8
}
