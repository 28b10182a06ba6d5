//! Gzip decompression into a caller-sized buffer.

use std::io::Read;

use flate2::bufread::GzDecoder;

use crate::error::Error;

/// Inflates a whole gzip stream into `dest`.
///
/// `dest.len()` is the capacity; the returned value is the number of bytes
/// produced. A stream that would decode to more than the capacity is a
/// corrupt-data error, as is any malformed or truncated framing. A stream
/// that decodes to fewer bytes returns that smaller count.
pub fn inflate_into(source: &[u8], dest: &mut [u8]) -> Result<usize, Error> {
    let mut decoder = GzDecoder::new(source);

    let mut produced = 0;
    while produced < dest.len() {
        match decoder.read(&mut dest[produced..]) {
            Ok(0) => break,
            Ok(n) => produced += n,
            Err(err) => return Err(map_inflate_error(err)),
        }
    }

    if produced == dest.len() {
        // The trailer must follow immediately; any further plain byte means
        // the stream is longer than the advertised tile volume.
        let mut probe = [0u8; 1];
        match decoder.read(&mut probe) {
            Ok(0) => {}
            Ok(_) => {
                return Err(Error::IllegalSequence(
                    "gzip stream longer than the expected length",
                ))
            }
            Err(err) => return Err(map_inflate_error(err)),
        }
    }

    Ok(produced)
}

fn map_inflate_error(err: std::io::Error) -> Error {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
            Error::IllegalSequence("corrupt or truncated gzip stream")
        }
        kind => Error::Io(kind),
    }
}
