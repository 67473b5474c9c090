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

//! The in-memory representation of a mail.
//!
//! An [`Email`] carries the MIME view (filtered headers plus body), the
//! plaintext packet view, and once encrypted, the cryptographic envelope.
//! The per-message flags follow the pipeline contract: `skip` latches any
//! unrecoverable handling failure for the current round, `deleted` is only
//! ever observed by POP3, and `encrypted` is monotone, after which the mail
//! must not be mutated.

pub mod headers;

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, WriteBytesExt};
use log::{debug, warn};
use openssl::sha::sha256;
use rand::{rngs::OsRng, Rng};

use crate::identity::{PrivateIdentity, PublicIdentity};
use crate::packet::{EmailEncryptedPacket, EmailPacket, Hash32};
use crate::support::compression::{self, Compression};
use crate::support::data_paths::MAIL_SUFFIX;
use crate::support::error::Error;
use crate::support::file_ops;

use self::headers::Headers;

pub const MESSAGE_ID_DOMAIN: &str = "@bote.i2p";

pub const HEADER_DHT_KEY: &str = "X-I2PBote-DHT-Key";
pub const HEADER_DELETE_AUTH: &str = "X-I2PBote-Delete-Auth";
pub const HEADER_DELETE_AUTH_HASH: &str = "X-I2PBote-Delete-Auth-Hash";
pub const HEADER_DELETED: &str = "X-I2PBote-Deleted";

/// The hashcash stamp attached to every store request. Peers accept any
/// well-formed value; nothing verifies it yet.
pub const HASHCASH_STAMP: &str =
    "1:20:1303030600:admin@example.com::McMybZIhxKXu57jd:FOvXX";

pub struct Email {
    headers: Headers,
    body: Vec<u8>,
    packet: EmailPacket,
    encrypted: Option<EmailEncryptedPacket>,
    sender: Option<PrivateIdentity>,
    recipient: Option<PublicIdentity>,
    filename: Option<PathBuf>,
    empty: bool,
    incomplete: bool,
    skip: bool,
    deleted: bool,
}

impl Email {
    /// Load a mail from its MIME serialisation (an outbox or inbox file).
    pub fn from_mime(bytes: &[u8]) -> Result<Self, Error> {
        let (headers, body) = headers::parse_mime(bytes)?;

        let mut email = Email {
            headers,
            body,
            packet: empty_packet(),
            encrypted: None,
            sender: None,
            recipient: None,
            filename: None,
            empty: false,
            incomplete: false,
            skip: false,
            deleted: false,
        };
        email.compose();
        Ok(email)
    }

    /// Reconstruct a mail from a plaintext email packet off the wire.
    pub fn from_packet_bytes(buf: &[u8], from_net: bool) -> Result<Self, Error> {
        let packet = EmailPacket::parse(buf, from_net)?;

        let incomplete = packet.fr_id + 1 != packet.fr_count;
        let empty = packet.data.is_empty();

        let (headers, body) = if empty {
            (Headers::default(), Vec::new())
        } else {
            let plain = compression::decompress(&packet.data)?;
            headers::parse_mime(&plain)?
        };

        Ok(Email {
            headers,
            body,
            packet,
            encrypted: None,
            sender: None,
            recipient: None,
            filename: None,
            empty,
            incomplete,
            skip: false,
            deleted: false,
        })
    }

    /// The MIME serialisation of the current header and body state.
    pub fn mime_bytes(&self) -> Vec<u8> {
        let mut out = self.headers.serialise().into_bytes();
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn from_field(&self) -> Option<&str> {
        self.headers.get("From")
    }

    pub fn to_field(&self) -> Option<&str> {
        self.headers.get("To")
    }

    /// The Message-ID, generating a fresh one if it is absent or does not
    /// look like a UUIDv4 (version nibble inspection).
    pub fn message_id(&mut self) -> String {
        let current = self.headers.get("Message-ID").unwrap_or("");
        if !valid_message_id(current) {
            let generated = format!("{}{}", generate_uuid_v4(), MESSAGE_ID_DOMAIN);
            debug!("mail: assigned Message-ID {}", generated);
            self.headers.set("Message-ID", &*generated);
            return generated;
        }
        current.to_owned()
    }

    /// Fill the plaintext packet from the MIME state.
    ///
    /// Ensures a Message-ID, derives `mes_id` from it, randomises the delete
    /// authorisation if still zero, and resets the fragment fields.
    pub fn compose(&mut self) {
        let message_id = self.message_id();
        let uuid = &message_id[..36];
        let mut mes_id = [0u8; 32];
        for (dst, c) in
            mes_id.iter_mut().zip(uuid.bytes().filter(|&c| c != b'-'))
        {
            *dst = c;
        }
        self.packet.mes_id = mes_id;

        if self.packet.da == [0u8; 32] {
            // A previous round may have persisted the nonce already
            let restored = self
                .headers
                .get(HEADER_DELETE_AUTH)
                .and_then(|v| {
                    base64::decode_config(v, base64::URL_SAFE_NO_PAD).ok()
                })
                .filter(|v| v.len() == 32);
            match restored {
                Some(da) => self.packet.da.copy_from_slice(&da),
                None => OsRng.fill(&mut self.packet.da),
            }
        }

        self.packet.fr_id = 0;
        self.packet.fr_count = 1;
        self.packet.data = self.mime_bytes();

        self.empty = false;
        self.incomplete = false;
    }

    /// Wrap the packet payload under `scheme`.
    pub fn compress(&mut self, scheme: Compression) -> Result<(), Error> {
        self.packet.data = compression::compress(scheme, &self.packet.data)?;
        Ok(())
    }

    pub fn set_sender(&mut self, sender: Option<PrivateIdentity>) {
        if sender.is_none() {
            warn!("mail: no sender identity, skipped");
            self.skip = true;
        }
        self.sender = sender;
    }

    pub fn set_recipient(&mut self, recipient: Option<PublicIdentity>) {
        if recipient.is_none() {
            warn!("mail: no recipient identity, skipped");
            self.skip = true;
        }
        self.recipient = recipient;
    }

    pub fn recipient(&self) -> Option<&PublicIdentity> {
        self.recipient.as_ref()
    }

    /// Build the encrypted packet. Idempotent once successful; any failure
    /// sets the skip latch and leaves the mail untouched on disk.
    pub fn encrypt(&mut self) -> Result<(), Error> {
        if self.skip || self.encrypted.is_some() {
            return Ok(());
        }

        let sender = match self.sender {
            Some(ref sender) => sender,
            None => {
                self.skip = true;
                return Err(Error::CryptoFailed);
            },
        };
        let recipient = match self.recipient {
            Some(ref recipient) => recipient,
            None => {
                self.skip = true;
                return Err(Error::CryptoFailed);
            },
        };

        let delete_hash = sha256(&self.packet.da);
        self.headers.set(
            HEADER_DELETE_AUTH_HASH,
            base64::encode_config(delete_hash, base64::URL_SAFE_NO_PAD),
        );
        // Persisted on the local copy only; the packet payload was captured
        // at compose time and never carries these stamps.
        self.headers.set(
            HEADER_DELETE_AUTH,
            base64::encode_config(self.packet.da, base64::URL_SAFE_NO_PAD),
        );

        let plain = self.packet.to_bytes();
        let edata = match sender.encrypt(&plain, recipient) {
            Ok(edata) if !edata.is_empty() => edata,
            _ => {
                warn!("mail: encryption produced nothing, skipped");
                self.skip = true;
                return Err(Error::CryptoFailed);
            },
        };

        let key = dht_key_of(&edata);
        self.headers.set(
            HEADER_DHT_KEY,
            base64::encode_config(key, base64::URL_SAFE_NO_PAD),
        );

        self.encrypted = Some(EmailEncryptedPacket {
            key,
            alg: sender.key_type() as u8,
            stored_time: 0,
            edata,
            delete_hash,
        });
        Ok(())
    }

    /// Check the delete authorisation against the hash advertised in an
    /// encrypted packet.
    pub fn verify(&self, expected_delete_hash: &Hash32) -> bool {
        sha256(&self.packet.da) == *expected_delete_hash
    }

    /// Attach the encrypted packet an inbound mail was carried in, making
    /// its DHT key available for filing.
    pub fn set_encrypted_packet(&mut self, packet: EmailEncryptedPacket) {
        self.headers.set(
            HEADER_DHT_KEY,
            base64::encode_config(packet.key, base64::URL_SAFE_NO_PAD),
        );
        self.encrypted = Some(packet);
    }

    pub fn encrypted_packet(&self) -> Option<&EmailEncryptedPacket> {
        self.encrypted.as_ref()
    }

    /// Persist the MIME serialisation.
    ///
    /// A mail that has never been on disk is placed at
    /// `<dir>/<Message-ID>.mail` and will not overwrite an existing file; a
    /// mail loaded from disk is rewritten in place.
    pub fn save(&mut self, dir: &Path) -> Result<(), Error> {
        let (path, overwrite) = match self.filename {
            Some(ref path) => (path.clone(), true),
            None => (
                dir.join(format!("{}{}", self.message_id(), MAIL_SUFFIX)),
                false,
            ),
        };

        let parent = path
            .parent()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "mail path has no parent directory",
                ))
            })?
            .to_owned();
        file_ops::spit(&parent, &path, overwrite, 0o600, &self.mime_bytes())
            .map_err(|e| {
                if io_already_exists(&e) {
                    Error::MailFileExists
                } else {
                    Error::Io(e)
                }
            })?;

        self.filename = Some(path);
        Ok(())
    }

    /// Rename the on-disk file into `<dir>/<DHT-Key>.mail`.
    pub fn move_to(&mut self, dir: &Path) -> Result<(), Error> {
        if self.skip {
            return Ok(());
        }

        let missing = |what: &str| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("mail cannot be filed: no {}", what),
            ))
        };
        let key = self
            .headers
            .get(HEADER_DHT_KEY)
            .ok_or_else(|| missing("DHT key"))?
            .to_owned();
        let old =
            self.filename.clone().ok_or_else(|| missing("backing file"))?;
        let new = dir.join(format!("{}{}", key, MAIL_SUFFIX));

        fs::rename(&old, &new)?;
        debug!("mail: moved {} to {}", old.display(), new.display());
        self.filename = Some(new);
        Ok(())
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn set_filename(&mut self, path: impl Into<PathBuf>) {
        self.filename = Some(path.into());
    }

    pub fn da(&self) -> &Hash32 {
        &self.packet.da
    }

    #[cfg(test)]
    pub fn set_da(&mut self, da: Hash32) {
        self.packet.da = da;
    }

    pub fn packet(&self) -> &EmailPacket {
        &self.packet
    }

    pub fn empty(&self) -> bool {
        self.empty
    }

    pub fn incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn skip(&self) -> bool {
        self.skip
    }

    pub fn set_skip(&mut self, skip: bool) {
        self.skip = skip;
    }

    pub fn deleted(&self) -> bool {
        self.deleted
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted.is_some()
    }
}

fn empty_packet() -> EmailPacket {
    EmailPacket {
        mes_id: [0u8; 32],
        da: [0u8; 32],
        fr_id: 0,
        fr_count: 1,
        data: Vec::new(),
    }
}

fn io_already_exists(e: &std::io::Error) -> bool {
    std::io::ErrorKind::AlreadyExists == e.kind()
}

/// The DHT key of an encrypted payload: `SHA256(length_be16 || edata)`.
pub fn dht_key_of(edata: &[u8]) -> Hash32 {
    let mut hashed = Vec::with_capacity(2 + edata.len());
    hashed.write_u16::<BigEndian>(edata.len() as u16).unwrap();
    hashed.extend_from_slice(edata);
    sha256(&hashed)
}

/// Whether `value` is `<uuid-v4>@bote.i2p` with the dashes in place.
fn valid_message_id(value: &str) -> bool {
    let uuid = match value.strip_suffix(MESSAGE_ID_DOMAIN) {
        Some(uuid) => uuid,
        None => return false,
    };
    if uuid.len() != 36 {
        return false;
    }

    let bytes = uuid.as_bytes();
    for (i, &c) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if c != b'-' {
                    return false;
                }
            },
            14 => {
                if c != b'4' {
                    return false;
                }
            },
            _ => {
                if !c.is_ascii_hexdigit() {
                    return false;
                }
            },
        }
    }
    true
}

fn generate_uuid_v4() -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(36);

    for i in 0..36 {
        match i {
            8 | 13 | 18 | 23 => out.push('-'),
            14 => out.push('4'),
            19 => out
                .push(HEX[OsRng.gen_range(8usize..12)] as char),
            _ => out.push(HEX[OsRng.gen_range(0usize..16)] as char),
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identity::{KeyType, PrivateIdentity};

    const SAMPLE: &[u8] = b"From: alice <alice>\r\n\
                            To: bob <b64.AAAA>\r\n\
                            Subject: hi\r\n\
                            \r\n\
                            hello\r\n";

    fn identity(key_type: KeyType) -> PrivateIdentity {
        PrivateIdentity::generate(key_type).unwrap()
    }

    #[test]
    fn compose_assigns_valid_message_id() {
        let mut email = Email::from_mime(SAMPLE).unwrap();
        let message_id = email.message_id();

        assert!(valid_message_id(&message_id));
        let uuid = &message_id[..36];
        for pos in [8, 13, 18, 23] {
            assert_eq!(b'-', uuid.as_bytes()[pos]);
        }

        // mes_id is the 32 hex characters with dashes removed
        let expected: Vec<u8> =
            uuid.bytes().filter(|&c| c != b'-').collect();
        assert_eq!(&expected[..], &email.packet().mes_id[..]);

        // Stable across repeated compose
        email.compose();
        assert_eq!(message_id, email.message_id());
    }

    #[test]
    fn compose_randomises_da_once() {
        let mut email = Email::from_mime(SAMPLE).unwrap();
        let da = *email.da();
        assert_ne!([0u8; 32], da);

        email.compose();
        assert_eq!(da, *email.da());
    }

    #[test]
    fn encrypt_builds_consistent_envelope() {
        let key_type = KeyType::X25519Ed25519Sha512Aes256Cbc;
        let sender = identity(key_type);
        let recipient = identity(key_type);

        let mut email = Email::from_mime(SAMPLE).unwrap();
        email.set_da([7u8; 32]);
        email.compose();
        email.compress(Compression::Zlib).unwrap();
        email.set_sender(Some(sender));
        email.set_recipient(Some(recipient.public().clone()));
        email.encrypt().unwrap();

        assert!(email.is_encrypted());
        let encrypted = email.encrypted_packet().unwrap().clone();
        assert_eq!(sha256(&[7u8; 32]), encrypted.delete_hash);
        assert_eq!(dht_key_of(&encrypted.edata), encrypted.key);
        assert_eq!(key_type as u8, encrypted.alg);
        assert!(email.verify(&encrypted.delete_hash));
        assert!(!email.verify(&[0u8; 32]));
        assert!(email.header(HEADER_DHT_KEY).is_some());
        assert!(email.header(HEADER_DELETE_AUTH_HASH).is_some());

        // Idempotent once successful
        email.encrypt().unwrap();
        assert_eq!(
            encrypted.key,
            email.encrypted_packet().unwrap().key
        );

        // The recipient can reverse the whole thing
        let plain = recipient.decrypt(&encrypted.edata).unwrap();
        let inbound = Email::from_packet_bytes(&plain, true).unwrap();
        assert_eq!(Some("hi"), inbound.header("Subject"));
        assert!(inbound.verify(&encrypted.delete_hash));
    }

    #[test]
    fn encrypt_without_identities_latches_skip() {
        let mut email = Email::from_mime(SAMPLE).unwrap();
        assert_matches!(Err(Error::CryptoFailed), email.encrypt());
        assert!(email.skip());
    }

    #[test]
    fn save_refuses_overwrite_then_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut email = Email::from_mime(SAMPLE).unwrap();
        let message_id = email.message_id();

        email.save(dir.path()).unwrap();
        let path = dir.path().join(format!("{}.mail", message_id));
        assert!(path.is_file());

        // A second fresh mail with the same Message-ID must not clobber
        let mut twin = Email::from_mime(&email.mime_bytes()).unwrap();
        assert_matches!(
            Err(Error::MailFileExists),
            twin.save(dir.path())
        );

        // The original rewrites in place
        email.set_header("Subject", "updated");
        email.save(dir.path()).unwrap();
        let reloaded =
            Email::from_mime(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(Some("updated"), reloaded.header("Subject"));
    }

    #[test]
    fn message_id_survives_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut email = Email::from_mime(SAMPLE).unwrap();
        let message_id = email.message_id();
        email.save(dir.path()).unwrap();

        let bytes =
            fs::read(dir.path().join(format!("{}.mail", message_id)))
                .unwrap();
        let mut reloaded = Email::from_mime(&bytes).unwrap();
        assert_eq!(message_id, reloaded.message_id());
    }

    #[test]
    fn move_to_uses_dht_key_filename() {
        let dir = tempfile::tempdir().unwrap();
        let mut email = Email::from_mime(SAMPLE).unwrap();
        email.save(dir.path()).unwrap();
        email.set_encrypted_packet(EmailEncryptedPacket {
            key: [0xab; 32],
            alg: 5,
            stored_time: 0,
            edata: vec![1],
            delete_hash: [0; 32],
        });

        email.move_to(dir.path()).unwrap();
        let expected = dir.path().join(format!(
            "{}.mail",
            base64::encode_config([0xab; 32], base64::URL_SAFE_NO_PAD)
        ));
        assert!(expected.is_file());
        assert_eq!(Some(&*expected), email.filename());
    }

    #[test]
    fn packet_round_trip_through_compression() {
        let mut email = Email::from_mime(SAMPLE).unwrap();
        email.compose();
        email.compress(Compression::Uncompressed).unwrap();

        let bytes = email.packet().to_bytes();
        let parsed = Email::from_packet_bytes(&bytes, true).unwrap();
        assert_eq!(Some("hi"), parsed.header("Subject"));
        assert!(!parsed.incomplete());
        assert!(!parsed.empty());
    }
}
