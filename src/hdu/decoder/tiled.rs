//! Decoding of GZIP_2 tile-compressed image HDUs.
//!
//! The stored body is a one-column binary table: each row holds the
//! `(size, offset)` descriptor of one compressed tile stream in the heap
//! that follows the table. Tiles are inflated and unshuffled at most once
//! and cached for the life of the reader.

use std::sync::{Mutex, OnceLock};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};

use crate::card;
use crate::error::Error;
use crate::file::RegularFile;
use crate::gz;
use crate::hdu::header::{block_aligned, bytes_per_element, EssentialCards, Header};
use crate::parallel::{lock, parallel_for};

/// Keyword cards describing the stored (compressed) layout. They are blanked
/// out of the rewritten header: the logical HDU is a plain IMAGE extension.
const DELETED_KEYWORDS: [&[u8]; 15] = [
    b"ZIMAGE  =",
    b"ZCMPTYPE=",
    b"ZBITPIX =",
    b"ZNAXIS  =",
    b"ZNAXIS1 =",
    b"ZNAXIS2 =",
    b"ZTILE1  =",
    b"ZTILE2  =",
    b"ZQUANTIZ=",
    b"ZSIMPLE =",
    b"ZTENSION=",
    b"TFIELDS =",
    b"TFORM1  =",
    b"TTYPE1  =",
    b"THEAP   =",
];

/// Decoder for a BINTABLE-stored, GZIP_2 tile-compressed image.
#[derive(Debug)]
pub(crate) struct TiledDecoder {
    physical_offset_of_body: u64,
    element_size: u64,
    image_width: u64,
    image_height: u64,
    pointer_size: usize,
    tile_width: u64,
    tile_height: u64,
    num_tiles_along_x: u64,
    num_tiles: u64,
    physical_offset_of_heap: u64,

    /// Interleaved `(size, offset)` descriptors, one pair per tile, in host
    /// order. Loaded once, then read lock-free.
    tile_entries: OnceLock<Box<[u64]>>,
    /// One slot per tile; a populated slot holds the decoded tile and never
    /// changes again.
    tiles: OnceLock<Box<[OnceLock<Box<[u8]>>]>>,
}

fn tiles_along(image: u64, tile: u64) -> u64 {
    if tile == 0 {
        0
    } else {
        (image + tile - 1) / tile
    }
}

impl TiledDecoder {
    /// Accepts only a two-axis GZIP_2 compressed image carried by a binary
    /// table, with integer samples or explicitly unquantized floats.
    /// Everything else is rejected with `IllegalSequence`, which makes the
    /// HDU fall back to the plain decoder.
    pub(crate) fn new(
        physical_offset_of_body: u64,
        cards: &EssentialCards,
    ) -> Result<Self, Error> {
        if !cards.zimage
            || cards.znaxis != 2
            || cards.xtension != "BINTABLE"
            || cards.zcmptype != "GZIP_2"
            || !(cards.zbitpix >= 0 || cards.zquantiz == "NONE")
        {
            return Err(Error::IllegalSequence(
                "not a supported tile-compressed image",
            ));
        }

        let element_size = bytes_per_element(cards.zbitpix);
        let image_width = cards.znaxes[0].max(0) as u64;
        let image_height = cards.znaxes[1].max(0) as u64;

        let pointer_size = if cards.tform1.contains('Q') { 8 } else { 4 };

        let mut ztile_x = cards.ztile[0].max(0) as u64;
        let mut ztile_y = cards.ztile[1].max(0) as u64;
        if ztile_x == 0 && ztile_y == 0 {
            // Default tiling is one row per tile.
            ztile_x = image_width;
            ztile_y = 1;
        } else {
            if ztile_x == 0 {
                ztile_x = 1;
            }
            if ztile_y == 0 {
                ztile_y = 1;
            }
        }

        let num_tiles_along_x = tiles_along(image_width, ztile_x);
        let num_tiles_along_y = tiles_along(image_height, ztile_y);
        let num_tiles = cards.naxes[1].max(0) as u64;

        if num_tiles_along_x * num_tiles_along_y != num_tiles {
            return Err(Error::IllegalSequence(
                "table row count does not match the tile grid",
            ));
        }

        let offset_of_heap_in_body = if cards.theap != 0 {
            cards.theap.max(0) as u64
        } else {
            bytes_per_element(cards.bitpix)
                * cards.naxes[0].max(0) as u64
                * cards.naxes[1].max(0) as u64
        };

        Ok(Self {
            physical_offset_of_body,
            element_size,
            image_width,
            image_height,
            pointer_size,
            tile_width: ztile_x,
            tile_height: ztile_y,
            num_tiles_along_x,
            num_tiles,
            physical_offset_of_heap: physical_offset_of_body + offset_of_heap_in_body,
            tile_entries: OnceLock::new(),
            tiles: OnceLock::new(),
        })
    }

    pub(crate) fn logical_body_size(&self, cards: &EssentialCards) -> u64 {
        let mut nelem = 0u64;
        if cards.znaxis > 0 {
            nelem = 1;
            for i in 0..(cards.znaxis.min(2) as usize) {
                nelem *= cards.znaxes[i].max(0) as u64;
            }
        }

        block_aligned(bytes_per_element(cards.zbitpix) * nelem)
    }

    /// Rewrites the stored binary-table header into the IMAGE-extension
    /// header of the expanded HDU.
    pub(crate) fn decode_header(&self, cards: &EssentialCards, header: &mut Header) {
        if !cards.zimage {
            return;
        }

        for c in header.cards_mut() {
            let (kw, value) = c.split_at_mut(9);

            if DELETED_KEYWORDS.iter().any(|k| *k == &*kw) {
                kw.copy_from_slice(b"COMMENT  ");
                value.fill(b' ');
                continue;
            }

            match &*kw {
                b"XTENSION=" => card::write_character_string("IMAGE", value),
                b"BITPIX  =" => card::write_integer(cards.zbitpix, value),
                b"NAXIS   =" => card::write_integer(cards.znaxis, value),
                b"NAXIS1  =" => card::write_integer(cards.znaxes[0], value),
                b"NAXIS2  =" => card::write_integer(cards.znaxes[1], value),
                b"PCOUNT  =" => card::write_integer(0, value),
                b"GCOUNT  =" => card::write_integer(1, value),
                _ => {}
            }
        }
    }

    /// Loads the `(size, offset)` descriptor array on first use.
    fn load_tile_entries<R: RegularFile>(&self, file: &R) -> Result<&[u64], Error> {
        if let Some(entries) = self.tile_entries.get() {
            return Ok(entries);
        }

        let nelems = 2 * self.num_tiles as usize;
        let mut entries = try_zeroed_vec::<u64>(nelems)?;
        let mut raw = try_zeroed_vec::<u8>(nelems * self.pointer_size)?;

        let nread = file.read_at(&mut raw, self.physical_offset_of_body)?;
        if nread != raw.len() {
            return Err(Error::IllegalSequence("truncated tile descriptor table"));
        }

        if self.pointer_size == 8 {
            BigEndian::read_u64_into(&raw, &mut entries);
        } else {
            let mut entries32 = try_zeroed_vec::<u32>(nelems)?;
            BigEndian::read_u32_into(&raw, &mut entries32);

            // The descriptors are signed on disk and a negative value has no
            // defined meaning; such a table is refused outright.
            let reduced_or = entries32.iter().fold(0u32, |acc, &e| acc | e);
            if reduced_or & 0x8000_0000 != 0 {
                return Err(Error::IllegalSequence("negative tile descriptor"));
            }

            for (wide, narrow) in entries.iter_mut().zip(&entries32) {
                *wide = u64::from(*narrow);
            }
        }

        debug!(
            "tile descriptor table loaded: {} tiles, {}-byte pointers",
            self.num_tiles, self.pointer_size
        );

        // Concurrent loaders may race here; the first published array wins
        // and the draft of everyone else is dropped.
        Ok(self.tile_entries.get_or_init(|| entries.into_boxed_slice()))
    }

    fn tile_slots(&self) -> &[OnceLock<Box<[u8]>>] {
        self.tiles.get_or_init(|| {
            (0..self.num_tiles)
                .map(|_| OnceLock::new())
                .collect::<Vec<_>>()
                .into_boxed_slice()
        })
    }

    /// Returns tile `(y, x)` of the grid, decoding and caching it if no
    /// thread has published it yet.
    fn get_tile<R: RegularFile>(&self, file: &R, y: u64, x: u64) -> Result<&[u8], Error> {
        let entries = self.load_tile_entries(file)?;
        let slots = self.tile_slots();

        let tilepos = (self.num_tiles_along_x * y + x) as usize;
        if let Some(tile) = slots[tilepos].get() {
            return Ok(tile);
        }

        let nread = entries[2 * tilepos] as usize;
        let offset = self.physical_offset_of_heap + entries[2 * tilepos + 1];
        let tile_volume = (self.element_size * self.tile_width * self.tile_height) as usize;

        let mut compressed = try_zeroed_vec::<u8>(nread)?;
        if file.read_at(&mut compressed, offset)? != nread {
            return Err(Error::IllegalSequence("truncated compressed tile stream"));
        }

        let mut inflated = try_zeroed_vec::<u8>(tile_volume)?;
        if gz::inflate_into(&compressed, &mut inflated)? != tile_volume {
            return Err(Error::IllegalSequence(
                "tile does not decode to the tile volume",
            ));
        }

        let mut tile = try_zeroed_vec::<u8>(tile_volume)?;
        unshuffle(&inflated, &mut tile, self.element_size as usize);

        // Publish-once: a concurrent decoder of the same tile may have won
        // the race, in which case our copy is dropped and theirs is used.
        Ok(slots[tilepos].get_or_init(|| tile.into_boxed_slice()))
    }

    /// Assembles the logical byte range `[logical_offset,
    /// logical_offset + buf.len())` of the expanded image from the tiles it
    /// intersects; bytes past the image area are alignment padding and read
    /// as zero.
    pub(crate) fn decode_body<R: RegularFile>(
        &self,
        file: &R,
        buf: &mut [u8],
        logical_offset: u64,
    ) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let image_width_in_bytes = self.image_width * self.element_size;
        let tile_width_in_bytes = self.tile_width * self.element_size;

        let i_start = logical_offset;
        let i_true_end = logical_offset + buf.len() as u64;
        let i_end = i_true_end.min(image_width_in_bytes * self.image_height);

        if i_end <= i_start {
            buf.fill(0);
            return Ok(buf.len());
        }

        let xtile_max = self.num_tiles_along_x - 1;

        let y_start = i_start / image_width_in_bytes;
        let x_start = i_start % image_width_in_bytes;
        let y_last = (i_end - 1) / image_width_in_bytes;
        let x_last = (i_end - 1) % image_width_in_bytes;

        let ytile_start = y_start / self.tile_height;
        let xtile_start = x_start / tile_width_in_bytes;
        let ytile_last = y_last / self.tile_height;
        let xtile_last = x_last / tile_width_in_bytes;

        for ytile in ytile_start..=ytile_last {
            let xtile_first = if ytile == ytile_start { xtile_start } else { 0 };
            let xtile_end = if ytile == ytile_last { xtile_last } else { xtile_max };
            let offset_of_tile_y = ytile * self.tile_height * image_width_in_bytes;

            for xtile in xtile_first..=xtile_end {
                let rowoffset_of_tile_x = xtile * tile_width_in_bytes;
                let rowoffset_of_tile_x_end =
                    (rowoffset_of_tile_x + tile_width_in_bytes).min(image_width_in_bytes);
                let this_tile_width_in_bytes = rowoffset_of_tile_x_end - rowoffset_of_tile_x;

                let offset_of_tile_yx = offset_of_tile_y + rowoffset_of_tile_x;

                let tile = self.get_tile(file, ytile, xtile)?;

                for q in 0..self.tile_height {
                    let offset_of_q = offset_of_tile_yx + q * image_width_in_bytes;
                    let offset_of_q_end = offset_of_q + this_tile_width_in_bytes;

                    if offset_of_q_end <= i_start {
                        continue;
                    }
                    if i_end <= offset_of_q {
                        break;
                    }

                    let copy_start = offset_of_q.max(i_start);
                    let copy_end = offset_of_q_end.min(i_end);

                    let dst = (copy_start - i_start) as usize;
                    // The clipped width is also used as the in-tile row
                    // stride, as the reference decoder does.
                    let src =
                        (q * this_tile_width_in_bytes + (copy_start - offset_of_q)) as usize;
                    let n = (copy_end - copy_start) as usize;

                    buf[dst..dst + n].copy_from_slice(&tile[src..src + n]);
                }
            }
        }

        let tail = (i_end - i_start) as usize;
        buf[tail..].fill(0);

        Ok(buf.len())
    }

    /// Decodes every tile up front, fanning the work out over `num_threads`
    /// workers. Idempotent once the descriptor table is published; `lock`
    /// keeps a single warm-up running at a time.
    pub(crate) fn predecode_all<R: RegularFile + Sync>(
        &self,
        file: &R,
        num_threads: usize,
        chain_lock: &Mutex<()>,
    ) {
        if self.num_tiles == 0 {
            return;
        }
        if self.tile_entries.get().is_some() {
            return;
        }

        let _guard = lock(chain_lock);
        if self.tile_entries.get().is_some() {
            return;
        }

        if let Err(err) = self.load_tile_entries(file) {
            warn!("tile pre-decode skipped: {err}");
            return;
        }

        let num_tiles_along_x = self.num_tiles_along_x;
        parallel_for(num_threads, 0, self.num_tiles as usize, |i| {
            let i = i as u64;
            if let Err(err) = self.get_tile(file, i / num_tiles_along_x, i % num_tiles_along_x) {
                debug!("pre-decode of tile {i} failed: {err}");
            }
        });
    }
}

/// Reverses the GZIP_2 byte shuffle: the inflated stream holds
/// `element_size` planes of `num_elements` bytes; plane `i` carries byte `i`
/// of every element.
fn unshuffle(input: &[u8], output: &mut [u8], element_size: usize) {
    let num_elements = output.len().checked_div(element_size).unwrap_or(0);
    for i in 0..element_size {
        for j in 0..num_elements {
            output[j * element_size + i] = input[i * num_elements + j];
        }
    }
}

fn try_zeroed_vec<T: Default + Clone>(len: usize) -> Result<Vec<T>, Error> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    v.resize(len, T::default());
    Ok(v)
}
