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

//! Serialisation and parsing of the on-wire packet formats.
//!
//! The unencrypted email packet is:
//!
//! - `u8`: type, `'U'`
//! - `u8`: version, `4`
//! - `[u8; 32]`: message ID (UUIDv4 hex with the dashes removed)
//! - `[u8; 32]`: delete authorisation nonce
//! - `u16`: fragment index
//! - `u16`: fragment count
//! - `u16`: payload length
//! - payload: compressed MIME bytes, prefixed by a one-byte compression tag
//!
//! The encrypted email packet is `key (32) | alg (1) | stored_time (4) |
//! length (2) | edata | delete_hash (32)` where `delete_hash = SHA256(DA)`
//! and `key = SHA256(length_be16 || edata)`. The index packet is `hash (32) |
//! nump (4) | entries`, each entry `key (32) | dv (32) | time (4)`.
//!
//! All multibyte integers are big-endian on the wire. Every parser takes a
//! `from_net` flag controlling the conversion to host order; every emitter
//! writes big-endian. The codec performs no I/O.

use byteorder::{BigEndian, ByteOrder, NativeEndian, WriteBytesExt};

use crate::support::error::Error;

pub type Hash32 = [u8; 32];

pub const EMAIL_PACKET_TYPE: u8 = b'U';
pub const EMAIL_PACKET_VERSION: u8 = 4;
/// Fixed header ahead of the email packet payload.
pub const EMAIL_PACKET_HEADER_LEN: usize = 72;
/// Fixed fields around the encrypted payload.
pub const ENCRYPTED_PACKET_OVERHEAD: usize = 32 + 1 + 4 + 2 + 32;
/// An index response shorter than this cannot name any entry.
pub const INDEX_PACKET_MIN_RESPONSE_LEN: usize = 38;

/// Type tag of a communication packet carrying a peer response.
pub const COMM_RESPONSE_TYPE: u8 = b'N';

fn read_u16(from_net: bool, buf: &[u8]) -> u16 {
    if from_net {
        BigEndian::read_u16(buf)
    } else {
        NativeEndian::read_u16(buf)
    }
}

fn read_u32(from_net: bool, buf: &[u8]) -> u32 {
    if from_net {
        BigEndian::read_u32(buf)
    } else {
        NativeEndian::read_u32(buf)
    }
}

fn read_hash(buf: &[u8]) -> Hash32 {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&buf[..32]);
    hash
}

/// The kinds of data a DHT peer stores, by wire discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DhtKind {
    Index = b'I',
    Email = b'E',
    Delete = b'D',
}

/// Peer response status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    GeneralError = 1,
    NoDataFound = 2,
    InvalidPacket = 3,
    InvalidHashcash = 4,
    InsufficientHashcash = 5,
    NoDiskSpace = 6,
}

impl StatusCode {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(StatusCode::Ok),
            1 => Some(StatusCode::GeneralError),
            2 => Some(StatusCode::NoDataFound),
            3 => Some(StatusCode::InvalidPacket),
            4 => Some(StatusCode::InvalidHashcash),
            5 => Some(StatusCode::InsufficientHashcash),
            6 => Some(StatusCode::NoDiskSpace),
            _ => None,
        }
    }
}

/// The plaintext email packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailPacket {
    pub mes_id: Hash32,
    pub da: Hash32,
    pub fr_id: u16,
    pub fr_count: u16,
    /// Tag-prefixed compressed MIME bytes.
    pub data: Vec<u8>,
}

impl EmailPacket {
    pub fn parse(buf: &[u8], from_net: bool) -> Result<Self, Error> {
        if buf.len() < EMAIL_PACKET_HEADER_LEN {
            return Err(Error::MalformedPacket);
        }
        if buf[0] != EMAIL_PACKET_TYPE || buf[1] != EMAIL_PACKET_VERSION {
            return Err(Error::MalformedPacket);
        }

        let mes_id = read_hash(&buf[2..]);
        let da = read_hash(&buf[34..]);
        let fr_id = read_u16(from_net, &buf[66..]);
        let fr_count = read_u16(from_net, &buf[68..]);
        let length = read_u16(from_net, &buf[70..]);

        if fr_id >= fr_count {
            return Err(Error::MalformedPacket);
        }
        if usize::from(length) != buf.len() - EMAIL_PACKET_HEADER_LEN {
            return Err(Error::MalformedPacket);
        }

        Ok(EmailPacket {
            mes_id,
            da,
            fr_id,
            fr_count,
            data: buf[EMAIL_PACKET_HEADER_LEN..].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(EMAIL_PACKET_HEADER_LEN + self.data.len());
        out.push(EMAIL_PACKET_TYPE);
        out.push(EMAIL_PACKET_VERSION);
        out.extend_from_slice(&self.mes_id);
        out.extend_from_slice(&self.da);
        out.write_u16::<BigEndian>(self.fr_id).unwrap();
        out.write_u16::<BigEndian>(self.fr_count).unwrap();
        out.write_u16::<BigEndian>(self.data.len() as u16).unwrap();
        out.extend_from_slice(&self.data);
        out
    }
}

/// The encrypted email packet as stored in the DHT.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailEncryptedPacket {
    /// `SHA256(length_be16 || edata)`; content address and DHT key.
    pub key: Hash32,
    /// The sender's key type, so the receiver picks the decrypt routine.
    pub alg: u8,
    pub stored_time: u32,
    pub edata: Vec<u8>,
    /// `SHA256(DA)`.
    pub delete_hash: Hash32,
}

impl EmailEncryptedPacket {
    pub fn parse(buf: &[u8], from_net: bool) -> Result<Self, Error> {
        if buf.len() < ENCRYPTED_PACKET_OVERHEAD {
            return Err(Error::MalformedPacket);
        }

        let key = read_hash(buf);
        let alg = buf[32];
        let stored_time = read_u32(from_net, &buf[33..]);
        let length = read_u16(from_net, &buf[37..]);

        // The declared length must account for everything after the fixed
        // header except the trailing delete hash.
        if usize::from(length) != buf.len() - ENCRYPTED_PACKET_OVERHEAD {
            return Err(Error::MalformedPacket);
        }

        let edata = buf[39..39 + usize::from(length)].to_vec();
        let delete_hash = read_hash(&buf[39 + usize::from(length)..]);

        Ok(EmailEncryptedPacket {
            key,
            alg,
            stored_time,
            edata,
            delete_hash,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(ENCRYPTED_PACKET_OVERHEAD + self.edata.len());
        out.extend_from_slice(&self.key);
        out.push(self.alg);
        out.write_u32::<BigEndian>(self.stored_time).unwrap();
        out.write_u16::<BigEndian>(self.edata.len() as u16).unwrap();
        out.extend_from_slice(&self.edata);
        out.extend_from_slice(&self.delete_hash);
        out
    }
}

/// One pointer inside an index packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// DHT key of the encrypted email packet.
    pub key: Hash32,
    /// The delete authorisation nonce.
    pub dv: Hash32,
    /// Sender-claimed deposit time.
    pub time: u32,
}

/// A per-identity pointer list naming the DHT keys of encrypted emails
/// addressed to that identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexPacket {
    /// The recipient's identity hash; also the packet's DHT key.
    pub hash: Hash32,
    pub entries: Vec<IndexEntry>,
}

impl IndexPacket {
    pub fn parse(buf: &[u8], from_net: bool) -> Result<Self, Error> {
        if buf.len() < 36 {
            return Err(Error::MalformedPacket);
        }

        let hash = read_hash(buf);
        let nump = read_u32(from_net, &buf[32..]) as usize;

        if buf.len() != 36 + nump * 68 {
            return Err(Error::MalformedPacket);
        }

        let mut entries = Vec::with_capacity(nump);
        let mut offset = 36;
        for _ in 0..nump {
            entries.push(IndexEntry {
                key: read_hash(&buf[offset..]),
                dv: read_hash(&buf[offset + 32..]),
                time: read_u32(from_net, &buf[offset + 64..]),
            });
            offset += 68;
        }

        Ok(IndexPacket { hash, entries })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(36 + self.entries.len() * 68);
        out.extend_from_slice(&self.hash);
        out.write_u32::<BigEndian>(self.entries.len() as u32).unwrap();
        for entry in &self.entries {
            out.extend_from_slice(&entry.key);
            out.extend_from_slice(&entry.dv);
            out.write_u32::<BigEndian>(entry.time).unwrap();
        }
        out
    }
}

/// Request that a peer drop the encrypted email packet at `key`.
///
/// The peer accepts only if `SHA256(da)` equals the stored delete hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailDeleteRequest {
    pub key: Hash32,
    pub da: Hash32,
}

impl EmailDeleteRequest {
    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != 64 {
            return Err(Error::MalformedPacket);
        }
        Ok(EmailDeleteRequest {
            key: read_hash(buf),
            da: read_hash(&buf[32..]),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.da);
        out
    }
}

/// Request that a peer drop entries from the index packet at `hash`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDeleteRequest {
    pub hash: Hash32,
    /// `(key, da)` pairs naming the entries to remove.
    pub entries: Vec<(Hash32, Hash32)>,
}

impl IndexDeleteRequest {
    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < 33 {
            return Err(Error::MalformedPacket);
        }

        let hash = read_hash(buf);
        let count = usize::from(buf[32]);

        if buf.len() != 33 + count * 64 {
            return Err(Error::MalformedPacket);
        }

        let mut entries = Vec::with_capacity(count);
        let mut offset = 33;
        for _ in 0..count {
            entries
                .push((read_hash(&buf[offset..]), read_hash(&buf[offset + 32..])));
            offset += 64;
        }

        Ok(IndexDeleteRequest { hash, entries })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(33 + self.entries.len() * 64);
        out.extend_from_slice(&self.hash);
        out.push(self.entries.len() as u8);
        for (key, da) in &self.entries {
            out.extend_from_slice(key);
            out.extend_from_slice(da);
        }
        out
    }
}

/// A store request as handed to DHT peers. The hashcash stamp is always
/// present; peers accept any well-formed value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreRequest {
    pub hashcash: Vec<u8>,
    pub data: Vec<u8>,
}

impl StoreRequest {
    pub fn new(hashcash: Vec<u8>, data: Vec<u8>) -> Self {
        StoreRequest { hashcash, data }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(4 + self.hashcash.len() + self.data.len());
        out.write_u16::<BigEndian>(self.hashcash.len() as u16).unwrap();
        out.extend_from_slice(&self.hashcash);
        out.write_u16::<BigEndian>(self.data.len() as u16).unwrap();
        out.extend_from_slice(&self.data);
        out
    }
}

/// An outbound packet queued for the transport, addressed to one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketForQueue {
    pub destination: String,
    pub payload: Vec<u8>,
}

/// A raw packet exchanged with a peer, as surfaced by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommunicationPacket {
    pub kind: u8,
    pub ver: u8,
    /// Peer identifier the transport attached to the packet.
    pub from: String,
    pub payload: Vec<u8>,
}

/// A peer's reply to a retrieve or store request.
///
/// A status other than `Ok` is informational; the pipeline treats such
/// responses as absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponsePacket {
    pub status: StatusCode,
    pub data: Vec<u8>,
}

impl ResponsePacket {
    pub fn from_comm_packet(
        comm: &CommunicationPacket,
        from_net: bool,
    ) -> Result<Self, Error> {
        if comm.kind != COMM_RESPONSE_TYPE {
            return Err(Error::MalformedPacket);
        }
        if comm.payload.len() < 3 {
            return Err(Error::MalformedPacket);
        }

        let status = StatusCode::from_wire(comm.payload[0])
            .ok_or(Error::MalformedPacket)?;
        let length = read_u16(from_net, &comm.payload[1..]);

        if usize::from(length) != comm.payload.len() - 3 {
            return Err(Error::MalformedPacket);
        }

        Ok(ResponsePacket {
            status,
            data: comm.payload[3..].to_vec(),
        })
    }

    pub fn to_comm_packet(&self, from: String) -> CommunicationPacket {
        let mut payload = Vec::with_capacity(3 + self.data.len());
        payload.push(self.status as u8);
        payload.write_u16::<BigEndian>(self.data.len() as u16).unwrap();
        payload.extend_from_slice(&self.data);
        CommunicationPacket {
            kind: COMM_RESPONSE_TYPE,
            ver: EMAIL_PACKET_VERSION,
            from,
            payload,
        }
    }
}

/// Decide whether `buf` holds an index or an encrypted email packet.
///
/// The stored formats carry no discriminator, so this leans on their strict
/// length arithmetic, trying the index interpretation first.
pub fn sniff_stored_packet(buf: &[u8]) -> Option<DhtKind> {
    if IndexPacket::parse(buf, true).is_ok() {
        Some(DhtKind::Index)
    } else if EmailEncryptedPacket::parse(buf, true).is_ok() {
        Some(DhtKind::Email)
    } else {
        None
    }
}
