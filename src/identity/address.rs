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

//! Textual address forms.
//!
//! The current (v1) form wraps a versioned blob in base32 or base64, with a
//! prefix naming the wrapping: `b32.<base32>` or `b64.<base64>`. The blob is
//! `version (1) | crypto (1) | sign (1) | symm (1) | hash (1)` followed by
//! the raw public identity bytes.
//!
//! The legacy v0 form is pure base64 recognised by its exact length: the two
//! public keys side by side, each with its leading `A` character dropped.

use crate::identity::{KeyType, PublicIdentity};
use crate::support::error::Error;

pub const ADDRESS_B32_PREFIX: &str = "b32.";
pub const ADDRESS_B64_PREFIX: &str = "b64.";

pub const ADDRESS_FORMAT_V1: u8 = 1;

const CRYP_TYPE_ECDH256: u8 = 2;
const CRYP_TYPE_ECDH521: u8 = 3;
const CRYP_TYPE_X25519: u8 = 5;
const SIGN_TYPE_ECDSA256: u8 = 2;
const SIGN_TYPE_ECDSA521: u8 = 3;
const SIGN_TYPE_ED25519: u8 = 5;
const SYMM_TYPE_AES_256: u8 = 2;
const HASH_TYPE_SHA_256: u8 = 1;
const HASH_TYPE_SHA_512: u8 = 2;

/// Exact lengths of the two recognised v0 address forms.
const ECDH256_ECDSA256_PUBLIC_BASE64_LENGTH: usize = 86;
const ECDH521_ECDSA521_PUBLIC_BASE64_LENGTH: usize = 178;

const B32_ALPHABET: base32::Alphabet =
    base32::Alphabet::RFC4648 { padding: false };

fn suite_selectors(key_type: KeyType) -> [u8; 4] {
    match key_type {
        KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc => [
            CRYP_TYPE_ECDH256,
            SIGN_TYPE_ECDSA256,
            SYMM_TYPE_AES_256,
            HASH_TYPE_SHA_256,
        ],
        KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc => [
            CRYP_TYPE_ECDH521,
            SIGN_TYPE_ECDSA521,
            SYMM_TYPE_AES_256,
            HASH_TYPE_SHA_512,
        ],
        KeyType::X25519Ed25519Sha512Aes256Cbc => [
            CRYP_TYPE_X25519,
            SIGN_TYPE_ED25519,
            SYMM_TYPE_AES_256,
            HASH_TYPE_SHA_512,
        ],
    }
}

fn key_type_from_selectors(selectors: &[u8]) -> Option<KeyType> {
    match (selectors[0], selectors[1], selectors[2], selectors[3]) {
        (
            CRYP_TYPE_ECDH256,
            SIGN_TYPE_ECDSA256,
            SYMM_TYPE_AES_256,
            HASH_TYPE_SHA_256,
        ) => Some(KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc),
        (
            CRYP_TYPE_ECDH521,
            SIGN_TYPE_ECDSA521,
            SYMM_TYPE_AES_256,
            HASH_TYPE_SHA_512,
        ) => Some(KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc),
        (
            CRYP_TYPE_X25519,
            SIGN_TYPE_ED25519,
            SYMM_TYPE_AES_256,
            HASH_TYPE_SHA_512,
        ) => Some(KeyType::X25519Ed25519Sha512Aes256Cbc),
        _ => None,
    }
}

/// Render `identity` as a v1 `b64.` address.
pub fn to_address_v1(identity: &PublicIdentity) -> String {
    let mut blob = Vec::with_capacity(5 + identity.to_bytes().len());
    blob.push(ADDRESS_FORMAT_V1);
    blob.extend_from_slice(&suite_selectors(identity.key_type()));
    blob.extend_from_slice(&identity.to_bytes());

    format!(
        "{}{}",
        ADDRESS_B64_PREFIX,
        base64::encode_config(blob, base64::URL_SAFE_NO_PAD)
    )
}

/// Parse a textual address of either form into a public identity.
pub fn parse_address(address: &str) -> Result<PublicIdentity, Error> {
    if let Some(rest) = address.strip_prefix(ADDRESS_B32_PREFIX) {
        let blob = base32::decode(B32_ALPHABET, &rest.to_ascii_uppercase())
            .ok_or(Error::AddressUnresolved)?;
        parse_v1_blob(&blob)
    } else if let Some(rest) = address.strip_prefix(ADDRESS_B64_PREFIX) {
        let blob = base64::decode_config(rest, base64::URL_SAFE_NO_PAD)
            .map_err(|_| Error::AddressUnresolved)?;
        parse_v1_blob(&blob)
    } else {
        parse_address_v0(address)
    }
}

fn parse_v1_blob(blob: &[u8]) -> Result<PublicIdentity, Error> {
    if blob.len() < 5 {
        return Err(Error::AddressUnresolved);
    }
    if blob[0] != ADDRESS_FORMAT_V1 {
        return Err(Error::AddressUnresolved);
    }

    let key_type = key_type_from_selectors(&blob[1..5])
        .ok_or(Error::UnsupportedKeyType)?;

    let keys = &blob[5..];
    let crypto_len = key_type.crypto_pub_len();
    if keys.len() != crypto_len + key_type.sign_pub_len() {
        return Err(Error::AddressUnresolved);
    }

    PublicIdentity::from_parts(
        key_type,
        keys[..crypto_len].to_vec(),
        keys[crypto_len..].to_vec(),
    )
    .map_err(|_| Error::AddressUnresolved)
}

/// Parse the legacy pure-base64 form, recognised by exact length.
fn parse_address_v0(address: &str) -> Result<PublicIdentity, Error> {
    let key_type = match address.len() {
        ECDH256_ECDSA256_PUBLIC_BASE64_LENGTH => {
            KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc
        },
        ECDH521_ECDSA521_PUBLIC_BASE64_LENGTH => {
            KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc
        },
        _ => return Err(Error::AddressUnresolved),
    };

    let half = address.len() / 2;
    let decode = |part: &str| -> Result<Vec<u8>, Error> {
        // Each key is stored with its leading 'A' stripped; restore it.
        base64::decode_config(
            format!("A{}", part),
            base64::URL_SAFE_NO_PAD,
        )
        .map_err(|_| Error::AddressUnresolved)
    };

    let crypto_key = decode(&address[..half])?;
    let signing_key = decode(&address[half..])?;

    PublicIdentity::from_parts(key_type, crypto_key, signing_key)
        .map_err(|_| Error::AddressUnresolved)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identity::PrivateIdentity;

    #[test]
    fn v1_b64_round_trip() {
        for key_type in [
            KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc,
            KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc,
            KeyType::X25519Ed25519Sha512Aes256Cbc,
        ] {
            let identity = PrivateIdentity::generate(key_type).unwrap();
            let address = to_address_v1(identity.public());
            assert!(address.starts_with(ADDRESS_B64_PREFIX));

            let parsed = parse_address(&address).unwrap();
            assert_eq!(*identity.public(), parsed);
        }
    }

    #[test]
    fn v1_b32_round_trip() {
        let identity =
            PrivateIdentity::generate(KeyType::X25519Ed25519Sha512Aes256Cbc)
                .unwrap();

        let mut blob = vec![ADDRESS_FORMAT_V1];
        blob.extend_from_slice(&suite_selectors(identity.public().key_type()));
        blob.extend_from_slice(&identity.public().to_bytes());
        let address = format!(
            "{}{}",
            ADDRESS_B32_PREFIX,
            base32::encode(B32_ALPHABET, &blob).to_ascii_lowercase()
        );

        assert_eq!(*identity.public(), parse_address(&address).unwrap());
    }

    #[test]
    fn rejects_wrong_version_and_garbage() {
        let identity =
            PrivateIdentity::generate(KeyType::X25519Ed25519Sha512Aes256Cbc)
                .unwrap();

        let mut blob = vec![9u8];
        blob.extend_from_slice(&suite_selectors(identity.public().key_type()));
        blob.extend_from_slice(&identity.public().to_bytes());
        let address = format!(
            "{}{}",
            ADDRESS_B64_PREFIX,
            base64::encode_config(blob, base64::URL_SAFE_NO_PAD)
        );
        assert_matches!(
            Err(Error::AddressUnresolved),
            parse_address(&address)
        );

        assert_matches!(
            Err(Error::AddressUnresolved),
            parse_address("not-an-address")
        );
    }
}
