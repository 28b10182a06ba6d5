//! Test-only authoring of FITS byte streams: cards, headers, and GZIP_2
//! tile-compressed image HDUs.

use std::io::Write;

use byteorder::{BigEndian, ByteOrder};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::hdu::header::BLOCK_SIZE;

/// Pads `content` to one 80-byte card.
pub(crate) fn card(content: &str) -> Vec<u8> {
    assert!(content.len() <= 80);
    let mut c = content.as_bytes().to_vec();
    c.resize(80, b' ');
    c
}

pub(crate) fn int_card(key: &str, value: i64) -> Vec<u8> {
    card(&format!("{key:<8}= {value:>20}"))
}

pub(crate) fn str_card(key: &str, value: &str) -> Vec<u8> {
    card(&format!("{key:<8}= '{value}'"))
}

pub(crate) fn logical_card(key: &str, value: bool) -> Vec<u8> {
    let v = if value { "T" } else { "F" };
    card(&format!("{key:<8}= {v:>20}"))
}

/// Renders cards plus `END` into whole, space-padded header blocks.
pub(crate) fn header(cards: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for c in cards {
        out.extend_from_slice(c);
    }
    out.extend_from_slice(&card("END"));
    while out.len() % BLOCK_SIZE != 0 {
        out.push(b' ');
    }
    out
}

/// Header of an empty primary HDU with `extra` cards appended.
pub(crate) fn primary_header(extra: &[&[u8]]) -> Vec<u8> {
    let mut cards: Vec<Vec<u8>> = vec![
        logical_card("SIMPLE", true),
        int_card("BITPIX", 8),
        int_card("NAXIS", 0),
    ];
    cards.extend(extra.iter().map(|c| c.to_vec()));
    let refs: Vec<&[u8]> = cards.iter().map(|c| c.as_slice()).collect();
    header(&refs)
}

/// A whole FITS file holding one plain primary HDU with a BITPIX=8 image.
pub(crate) fn plain_primary_fits(naxes: [i64; 2], data: &[u8]) -> Vec<u8> {
    assert_eq!((naxes[0] * naxes[1]) as usize, data.len());
    let cards = [
        logical_card("SIMPLE", true),
        int_card("BITPIX", 8),
        int_card("NAXIS", 2),
        int_card("NAXIS1", naxes[0]),
        int_card("NAXIS2", naxes[1]),
    ];
    let refs: Vec<&[u8]> = cards.iter().map(|c| c.as_slice()).collect();

    let mut out = header(&refs);
    out.extend_from_slice(data);
    while out.len() % BLOCK_SIZE != 0 {
        out.push(0);
    }
    out
}

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// GZIP_2-encodes big-endian element bytes: split into per-byte planes,
/// then deflate.
pub(crate) fn gzip2_encode(elements: &[u8], element_size: usize) -> Vec<u8> {
    let n = elements.len() / element_size;
    let mut planes = vec![0u8; elements.len()];
    for i in 0..element_size {
        for j in 0..n {
            planes[i * n + j] = elements[j * element_size + i];
        }
    }
    gzip(&planes)
}

pub(crate) fn gzip2_tile_i16(values: &[i16]) -> Vec<u8> {
    let mut be = vec![0u8; values.len() * 2];
    BigEndian::write_i16_into(values, &mut be);
    gzip2_encode(&be, 2)
}

pub(crate) fn gzip2_tile_f32(values: &[f32]) -> Vec<u8> {
    let mut be = vec![0u8; values.len() * 4];
    BigEndian::write_f32_into(values, &mut be);
    gzip2_encode(&be, 4)
}

/// Description of one tile-compressed image HDU.
pub(crate) struct CompressedImage {
    pub zbitpix: i64,
    pub znaxes: [i64; 2],
    pub ztile: [i64; 2],
    pub q_pointers: bool,
    pub zquantiz: Option<&'static str>,
    /// Compressed tile streams in row-major tile order.
    pub tiles: Vec<Vec<u8>>,
}

impl CompressedImage {
    /// Renders the HDU: binary-table header, descriptor table and heap,
    /// zero-padded to whole blocks.
    pub(crate) fn build(&self) -> Vec<u8> {
        let pointer_size: usize = if self.q_pointers { 8 } else { 4 };

        let mut table = Vec::new();
        let mut heap = Vec::new();
        for tile in &self.tiles {
            if self.q_pointers {
                let mut entry = [0u8; 16];
                BigEndian::write_u64(&mut entry[..8], tile.len() as u64);
                BigEndian::write_u64(&mut entry[8..], heap.len() as u64);
                table.extend_from_slice(&entry);
            } else {
                let mut entry = [0u8; 8];
                BigEndian::write_u32(&mut entry[..4], tile.len() as u32);
                BigEndian::write_u32(&mut entry[4..], heap.len() as u32);
                table.extend_from_slice(&entry);
            }
            heap.extend_from_slice(tile);
        }

        let tform = if self.q_pointers { "1QB" } else { "1PB" };
        let mut cards: Vec<Vec<u8>> = vec![
            str_card("XTENSION", "BINTABLE"),
            int_card("BITPIX", 8),
            int_card("NAXIS", 2),
            int_card("NAXIS1", (2 * pointer_size) as i64),
            int_card("NAXIS2", self.tiles.len() as i64),
            int_card("PCOUNT", heap.len() as i64),
            int_card("GCOUNT", 1),
            int_card("TFIELDS", 1),
            str_card("TTYPE1", "COMPRESSED_DATA"),
            str_card("TFORM1", &format!("{tform}({})", heap.len())),
            logical_card("ZIMAGE", true),
            str_card("ZCMPTYPE", "GZIP_2"),
            int_card("ZBITPIX", self.zbitpix),
            int_card("ZNAXIS", 2),
            int_card("ZNAXIS1", self.znaxes[0]),
            int_card("ZNAXIS2", self.znaxes[1]),
            int_card("ZTILE1", self.ztile[0]),
            int_card("ZTILE2", self.ztile[1]),
        ];
        if let Some(zquantiz) = self.zquantiz {
            cards.push(str_card("ZQUANTIZ", zquantiz));
        }

        let refs: Vec<&[u8]> = cards.iter().map(|c| c.as_slice()).collect();
        let mut out = header(&refs);
        out.extend_from_slice(&table);
        out.extend_from_slice(&heap);
        while out.len() % BLOCK_SIZE != 0 {
            out.push(0);
        }
        out
    }
}

/// A whole FITS file: empty primary HDU followed by `image`.
pub(crate) fn compressed_fits(image: &CompressedImage) -> Vec<u8> {
    let mut out = primary_header(&[]);
    out.extend_from_slice(&image.build());
    out
}

/// A 4x4 i16 image in 2x2 tiles whose expansion is the big-endian sequence
/// 0, 1, …, 15 in row-major order.
pub(crate) fn sequential_i16_4x4() -> CompressedImage {
    let tiles: [[i16; 4]; 4] = [[0, 1, 4, 5], [2, 3, 6, 7], [8, 9, 12, 13], [10, 11, 14, 15]];
    CompressedImage {
        zbitpix: 16,
        znaxes: [4, 4],
        ztile: [2, 2],
        q_pointers: false,
        zquantiz: None,
        tiles: tiles.iter().map(|t| gzip2_tile_i16(t)).collect(),
    }
}
