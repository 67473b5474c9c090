//-
// Copyright (c) 2026, the Bote developers
//
// This file is part of Bote.
//
// Bote is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Bote is distributed  in the hope  that it  will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Bote. If not, see <http://www.gnu.org/licenses/>.

//! Façade around the payload compression schemes of the email packet format.
//!
//! Every plaintext payload starts with a one-byte tag identifying the scheme
//! used for the rest of the buffer. The tag values are fixed by the published
//! protocol and must not be renumbered. LZMA exists for legacy inbound mail
//! only; it is recognised on decode and never produced.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use log::{debug, warn};

use crate::support::error::Error;

/// Payload compression schemes, in on-wire tag order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    Uncompressed = 0,
    Lzma = 1,
    Zlib = 2,
}

impl Compression {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Compression::Uncompressed),
            1 => Some(Compression::Lzma),
            2 => Some(Compression::Zlib),
            _ => None,
        }
    }
}

/// Compress `data` under `scheme`, returning the tag-prefixed payload.
///
/// A request for LZMA is downgraded to uncompressed since encoding LZMA is
/// not supported.
pub fn compress(scheme: Compression, data: &[u8]) -> Result<Vec<u8>, Error> {
    let scheme = match scheme {
        Compression::Lzma => {
            warn!("compress: LZMA output unsupported, storing uncompressed");
            Compression::Uncompressed
        },
        s => s,
    };

    match scheme {
        Compression::Uncompressed => {
            let mut out = Vec::with_capacity(1 + data.len());
            out.push(Compression::Uncompressed as u8);
            out.extend_from_slice(data);
            Ok(out)
        },
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(
                vec![Compression::Zlib as u8],
                flate2::Compression::default(),
            );
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        },
        Compression::Lzma => unreachable!(),
    }
}

/// Strip the tag byte from `data` and inflate the remainder.
///
/// An unknown tag is passed through as uncompressed rather than failing the
/// whole mail, since a misidentified content byte must not strand a mailbox.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let (&tag, body) = data.split_first().ok_or(Error::MalformedPacket)?;

    match Compression::from_tag(tag) {
        Some(Compression::Uncompressed) => Ok(body.to_vec()),
        Some(Compression::Zlib) => {
            debug!("decompress: ZLIB payload, {} bytes", body.len());
            let mut out = Vec::new();
            ZlibDecoder::new(body).read_to_end(&mut out)?;
            Ok(out)
        },
        Some(Compression::Lzma) => {
            debug!("decompress: LZMA payload, {} bytes", body.len());
            let mut input = body;
            let mut out = Vec::new();
            lzma_rs::lzma_decompress(&mut input, &mut out)
                .map_err(|_| Error::MalformedPacket)?;
            Ok(out)
        },
        None => {
            warn!("decompress: unknown tag {}, treating as uncompressed", tag);
            Ok(body.to_vec())
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uncompressed_round_trip() {
        let payload = compress(Compression::Uncompressed, b"hello").unwrap();
        assert_eq!(0, payload[0]);
        assert_eq!(b"hello".to_vec(), decompress(&payload).unwrap());
    }

    #[test]
    fn zlib_round_trip() {
        let text = b"hello hello hello hello hello".to_vec();
        let payload = compress(Compression::Zlib, &text).unwrap();
        assert_eq!(2, payload[0]);
        assert_eq!(text, decompress(&payload).unwrap());
    }

    #[test]
    fn lzma_request_downgrades_to_uncompressed() {
        let payload = compress(Compression::Lzma, b"legacy").unwrap();
        assert_eq!(0, payload[0]);
        assert_eq!(b"legacy".to_vec(), decompress(&payload).unwrap());
    }

    #[test]
    fn unknown_tag_is_passed_through() {
        assert_eq!(b"xyz".to_vec(), decompress(b"\x07xyz").unwrap());
    }

    #[test]
    fn empty_buffer_is_malformed() {
        assert_matches!(Err(Error::MalformedPacket), decompress(b""));
    }
}
