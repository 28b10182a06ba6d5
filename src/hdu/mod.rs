//! Header-data units and their lazy chain.

pub(crate) mod decoder;
pub mod header;

use std::sync::OnceLock;

use log::debug;

use crate::error::Error;
use crate::file::RegularFile;

use self::decoder::Decoder;
use self::header::{EssentialCards, Header};

/// Outcome of loading the HDU at some position: the HDU, a clean end of
/// file, or a sticky error every later walk re-observes.
pub(crate) type HduSlot = Result<Option<Box<Hdu>>, Error>;

/// One header-data unit, pinned in the chain once loaded.
///
/// Offsets are byte positions: `physical` ones address the source,
/// `logical` ones address the synthesized uncompressed view.
#[derive(Debug)]
pub(crate) struct Hdu {
    pub header: Header,
    pub decoder: Decoder,

    pub logical_offset_of_header: u64,
    pub logical_offset_of_body: u64,
    pub physical_offset_of_next_hdu: u64,
    pub logical_offset_of_next_hdu: u64,

    /// The next HDU, populated at most once under the chain lock.
    pub next: OnceLock<HduSlot>,
}

impl Hdu {
    /// Loads the HDU whose header starts at `physical_offset` in the source
    /// and at `logical_offset` in the logical view. `Ok(None)` is a clean
    /// end of file.
    pub(crate) fn load_from_file<R: RegularFile>(
        file: &R,
        physical_offset: u64,
        logical_offset: u64,
    ) -> Result<Option<Box<Hdu>>, Error> {
        let (mut header, physical_offset_of_body) =
            match Header::read_from(file, physical_offset)? {
                Some(read) => read,
                None => return Ok(None),
            };

        let cards = EssentialCards::parse(&header)?;
        let decoder = Decoder::select(physical_offset_of_body, &cards)?;
        decoder.decode_header(&cards, &mut header);

        let physical_body_size = cards.physical_body_size();
        let logical_body_size = decoder.logical_body_size(&cards);
        let header_size = physical_offset_of_body - physical_offset;

        let hdu = Hdu {
            logical_offset_of_header: logical_offset,
            logical_offset_of_body: logical_offset + header_size,
            physical_offset_of_next_hdu: physical_offset_of_body + physical_body_size,
            logical_offset_of_next_hdu: logical_offset + header_size + logical_body_size,
            header,
            decoder,
            next: OnceLock::new(),
        };

        debug!(
            "hdu at {} ({}): {} header bytes, {} -> {} body bytes",
            physical_offset,
            match hdu.decoder {
                Decoder::Plain(_) => "plain",
                Decoder::Tiled(_) => "tiled",
            },
            header_size,
            physical_body_size,
            logical_body_size,
        );

        Ok(Some(Box::new(hdu)))
    }
}
