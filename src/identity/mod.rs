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

//! Cryptographic identities.
//!
//! An identity binds a public name (the mailbox local-part) to an asymmetric
//! key pair under one of the recognised suites. The public half is what gets
//! published in addresses; the private half decrypts inbound mail and signs.
//!
//! Message encryption is an ephemeral-static key agreement: a fresh key pair
//! on the recipient's curve, the shared secret hashed down to an AES-256-CBC
//! key, and the wire form `ephemeral_pub || iv || ciphertext`.

pub mod address;
pub mod storage;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use openssl::bn::{BigNum, BigNumContext};
use openssl::derive::Deriver;
use openssl::ec::{EcGroup, EcKey, EcPoint, PointConversionForm};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private, Public};
use openssl::sha::{sha256, sha512};
use openssl::sign::{Signer, Verifier};
use openssl::symm::{self, Cipher};
use rand::{rngs::OsRng, Rng};

use crate::packet::Hash32;
use crate::support::error::Error;

const AES_IV_LEN: usize = 16;

/// The recognised key suites, by wire algorithm id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyType {
    Ecdh256Ecdsa256Sha256Aes256Cbc = 2,
    Ecdh521Ecdsa521Sha512Aes256Cbc = 3,
    X25519Ed25519Sha512Aes256Cbc = 5,
}

impl KeyType {
    pub fn from_alg(alg: u8) -> Option<Self> {
        match alg {
            2 => Some(KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc),
            3 => Some(KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc),
            5 => Some(KeyType::X25519Ed25519Sha512Aes256Cbc),
            _ => None,
        }
    }

    /// Length of an encoded public key (compressed EC point or raw).
    pub fn crypto_pub_len(self) -> usize {
        match self {
            KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc => 33,
            KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc => 67,
            KeyType::X25519Ed25519Sha512Aes256Cbc => 32,
        }
    }

    pub fn sign_pub_len(self) -> usize {
        self.crypto_pub_len()
    }

    fn crypto_priv_len(self) -> usize {
        match self {
            KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc => 32,
            KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc => 66,
            KeyType::X25519Ed25519Sha512Aes256Cbc => 32,
        }
    }

    fn curve(self) -> Option<Nid> {
        match self {
            KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc => {
                Some(Nid::X9_62_PRIME256V1)
            },
            KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc => Some(Nid::SECP521R1),
            KeyType::X25519Ed25519Sha512Aes256Cbc => None,
        }
    }

    /// Reduce an agreed secret to the AES-256 key for this suite.
    fn kdf(self, shared: &[u8]) -> [u8; 32] {
        match self {
            KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc => sha256(shared),
            KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc
            | KeyType::X25519Ed25519Sha512Aes256Cbc => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&sha512(shared)[..32]);
                key
            },
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc => {
                "ECDH256_ECDSA256_SHA256_AES256CBC"
            },
            KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc => {
                "ECDH521_ECDSA521_SHA512_AES256CBC"
            },
            KeyType::X25519Ed25519Sha512Aes256Cbc => {
                "X25519_ED25519_SHA512_AES256CBC"
            },
        })
    }
}

impl FromStr for KeyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ECDH256_ECDSA256_SHA256_AES256CBC" => {
                Ok(KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc)
            },
            "ECDH521_ECDSA521_SHA512_AES256CBC" => {
                Ok(KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc)
            },
            "X25519_ED25519_SHA512_AES256CBC" => {
                Ok(KeyType::X25519Ed25519Sha512Aes256Cbc)
            },
            _ => Err(Error::UnsupportedKeyType),
        }
    }
}

/// The public half of an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicIdentity {
    key_type: KeyType,
    crypto_key: Vec<u8>,
    signing_key: Vec<u8>,
}

impl PublicIdentity {
    pub fn from_parts(
        key_type: KeyType,
        crypto_key: Vec<u8>,
        signing_key: Vec<u8>,
    ) -> Result<Self, Error> {
        if crypto_key.len() != key_type.crypto_pub_len()
            || signing_key.len() != key_type.sign_pub_len()
        {
            return Err(Error::MalformedPacket);
        }
        Ok(PublicIdentity {
            key_type,
            crypto_key,
            signing_key,
        })
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn crypto_key(&self) -> &[u8] {
        &self.crypto_key
    }

    pub fn signing_key(&self) -> &[u8] {
        &self.signing_key
    }

    /// The raw public identity bytes: crypto key then signing key.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(self.crypto_key.len() + self.signing_key.len());
        out.extend_from_slice(&self.crypto_key);
        out.extend_from_slice(&self.signing_key);
        out
    }

    /// 32-byte hash identifying this identity in the DHT.
    pub fn ident_hash(&self) -> Hash32 {
        sha256(&self.to_bytes())
    }

    pub fn to_base64(&self) -> String {
        base64::encode_config(self.to_bytes(), base64::URL_SAFE_NO_PAD)
    }

    /// Encrypt `plain` so that only the holder of this identity's private
    /// crypto key can read it.
    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, Error> {
        let (ephemeral_pub, shared) = match self.key_type.curve() {
            Some(nid) => {
                let group = EcGroup::from_curve_name(nid)?;
                let mut ctx = BigNumContext::new()?;
                let peer_point =
                    EcPoint::from_bytes(&group, &self.crypto_key, &mut ctx)?;
                let peer: PKey<Public> =
                    PKey::from_ec_key(EcKey::from_public_key(
                        &group,
                        &peer_point,
                    )?)?;

                let ephemeral = EcKey::generate(&group)?;
                let ephemeral_pub = ephemeral.public_key().to_bytes(
                    &group,
                    PointConversionForm::COMPRESSED,
                    &mut ctx,
                )?;

                let ephemeral: PKey<Private> = PKey::from_ec_key(ephemeral)?;
                let mut deriver = Deriver::new(&ephemeral)?;
                deriver.set_peer(&peer)?;
                (ephemeral_pub, deriver.derive_to_vec()?)
            },
            None => {
                let peer = PKey::public_key_from_raw_bytes(
                    &self.crypto_key,
                    Id::X25519,
                )?;
                let ephemeral = PKey::generate_x25519()?;
                let ephemeral_pub = ephemeral.raw_public_key()?;

                let mut deriver = Deriver::new(&ephemeral)?;
                deriver.set_peer(&peer)?;
                (ephemeral_pub, deriver.derive_to_vec()?)
            },
        };

        let key = self.key_type.kdf(&shared);
        let mut iv = [0u8; AES_IV_LEN];
        OsRng.fill(&mut iv);
        let cipher_text =
            symm::encrypt(Cipher::aes_256_cbc(), &key, Some(&iv), plain)?;

        let mut out = Vec::with_capacity(
            ephemeral_pub.len() + AES_IV_LEN + cipher_text.len(),
        );
        out.extend_from_slice(&ephemeral_pub);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&cipher_text);
        Ok(out)
    }

    /// Verify `signature` over `data` against the signing key.
    pub fn verify_signature(
        &self,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, Error> {
        match self.key_type.curve() {
            Some(nid) => {
                let group = EcGroup::from_curve_name(nid)?;
                let mut ctx = BigNumContext::new()?;
                let point =
                    EcPoint::from_bytes(&group, &self.signing_key, &mut ctx)?;
                let pkey =
                    PKey::from_ec_key(EcKey::from_public_key(&group, &point)?)?;
                let digest = match self.key_type {
                    KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc => {
                        MessageDigest::sha256()
                    },
                    _ => MessageDigest::sha512(),
                };
                let mut verifier = Verifier::new(digest, &pkey)?;
                Ok(verifier.verify_oneshot(signature, data)?)
            },
            None => {
                let pkey = PKey::public_key_from_raw_bytes(
                    &self.signing_key,
                    Id::ED25519,
                )?;
                let mut verifier = Verifier::new_without_digest(&pkey)?;
                Ok(verifier.verify_oneshot(signature, data)?)
            },
        }
    }
}

/// A full identity with private key material.
#[derive(Clone)]
pub struct PrivateIdentity {
    public: PublicIdentity,
    crypto_key: Vec<u8>,
    signing_key: Vec<u8>,
}

impl PrivateIdentity {
    pub fn from_parts(
        public: PublicIdentity,
        crypto_key: Vec<u8>,
        signing_key: Vec<u8>,
    ) -> Result<Self, Error> {
        if crypto_key.len() != public.key_type.crypto_priv_len() {
            return Err(Error::MalformedPacket);
        }
        Ok(PrivateIdentity {
            public,
            crypto_key,
            signing_key,
        })
    }

    /// Generate a fresh key pair under `key_type`.
    pub fn generate(key_type: KeyType) -> Result<Self, Error> {
        match key_type.curve() {
            Some(nid) => {
                let group = EcGroup::from_curve_name(nid)?;
                let mut ctx = BigNumContext::new()?;

                let crypto = EcKey::generate(&group)?;
                let signing = EcKey::generate(&group)?;

                let public = PublicIdentity::from_parts(
                    key_type,
                    crypto.public_key().to_bytes(
                        &group,
                        PointConversionForm::COMPRESSED,
                        &mut ctx,
                    )?,
                    signing.public_key().to_bytes(
                        &group,
                        PointConversionForm::COMPRESSED,
                        &mut ctx,
                    )?,
                )?;

                let priv_len = key_type.crypto_priv_len() as i32;
                PrivateIdentity::from_parts(
                    public,
                    crypto.private_key().to_vec_padded(priv_len)?,
                    signing.private_key().to_vec_padded(priv_len)?,
                )
            },
            None => {
                let crypto = PKey::generate_x25519()?;
                let signing = PKey::generate_ed25519()?;

                let public = PublicIdentity::from_parts(
                    key_type,
                    crypto.raw_public_key()?,
                    signing.raw_public_key()?,
                )?;

                PrivateIdentity::from_parts(
                    public,
                    crypto.raw_private_key()?,
                    signing.raw_private_key()?,
                )
            },
        }
    }

    pub fn public(&self) -> &PublicIdentity {
        &self.public
    }

    pub fn key_type(&self) -> KeyType {
        self.public.key_type
    }

    pub fn ident_hash(&self) -> Hash32 {
        self.public.ident_hash()
    }

    pub fn to_base64(&self) -> String {
        self.public.to_base64()
    }

    pub fn crypto_key_bytes(&self) -> &[u8] {
        &self.crypto_key
    }

    pub fn signing_key_bytes(&self) -> &[u8] {
        &self.signing_key
    }

    /// Encrypt `plain` to `recipient`.
    pub fn encrypt(
        &self,
        plain: &[u8],
        recipient: &PublicIdentity,
    ) -> Result<Vec<u8>, Error> {
        recipient.encrypt(plain)
    }

    /// Decrypt a buffer produced by [`PublicIdentity::encrypt`] against this
    /// identity's public key.
    pub fn decrypt(&self, cipher_text: &[u8]) -> Result<Vec<u8>, Error> {
        let key_type = self.public.key_type;
        let ephemeral_len = key_type.crypto_pub_len();
        if cipher_text.len() <= ephemeral_len + AES_IV_LEN {
            return Err(Error::CryptoFailed);
        }

        let (ephemeral_pub, rest) = cipher_text.split_at(ephemeral_len);
        let (iv, body) = rest.split_at(AES_IV_LEN);

        let shared = match key_type.curve() {
            Some(nid) => {
                let group = EcGroup::from_curve_name(nid)?;
                let mut ctx = BigNumContext::new()?;
                let own_point =
                    EcPoint::from_bytes(&group, &self.public.crypto_key, &mut ctx)?;
                let crypto_key_bn = BigNum::from_slice(&self.crypto_key)?;
                let own = EcKey::from_private_components(
                    &group,
                    &crypto_key_bn,
                    &own_point,
                )?;
                let own: PKey<Private> = PKey::from_ec_key(own)?;

                let ephemeral_point =
                    EcPoint::from_bytes(&group, ephemeral_pub, &mut ctx)?;
                let ephemeral: PKey<Public> = PKey::from_ec_key(
                    EcKey::from_public_key(&group, &ephemeral_point)?,
                )?;

                let mut deriver = Deriver::new(&own)?;
                deriver.set_peer(&ephemeral)?;
                deriver.derive_to_vec()?
            },
            None => {
                let own = PKey::private_key_from_raw_bytes(
                    &self.crypto_key,
                    Id::X25519,
                )?;
                let ephemeral = PKey::public_key_from_raw_bytes(
                    ephemeral_pub,
                    Id::X25519,
                )?;

                let mut deriver = Deriver::new(&own)?;
                deriver.set_peer(&ephemeral)?;
                deriver.derive_to_vec()?
            },
        };

        let key = key_type.kdf(&shared);
        symm::decrypt(Cipher::aes_256_cbc(), &key, Some(iv), body)
            .map_err(|_| Error::CryptoFailed)
    }

    /// Sign `data` with the identity's signing key.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        match self.public.key_type.curve() {
            Some(nid) => {
                let group = EcGroup::from_curve_name(nid)?;
                let mut ctx = BigNumContext::new()?;
                let point = EcPoint::from_bytes(
                    &group,
                    &self.public.signing_key,
                    &mut ctx,
                )?;
                let signing_key_bn = BigNum::from_slice(&self.signing_key)?;
                let eckey = EcKey::from_private_components(
                    &group,
                    &signing_key_bn,
                    &point,
                )?;
                let pkey = PKey::from_ec_key(eckey)?;
                let digest = match self.public.key_type {
                    KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc => {
                        MessageDigest::sha256()
                    },
                    _ => MessageDigest::sha512(),
                };
                let mut signer = Signer::new(digest, &pkey)?;
                Ok(signer.sign_oneshot_to_vec(data)?)
            },
            None => {
                let pkey = PKey::private_key_from_raw_bytes(
                    &self.signing_key,
                    Id::ED25519,
                )?;
                let mut signer = Signer::new_without_digest(&pkey)?;
                Ok(signer.sign_oneshot_to_vec(data)?)
            },
        }
    }
}

impl fmt::Debug for PrivateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PrivateIdentity")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// An identity as configured on this node: the key pair plus its public name.
#[derive(Clone, Debug)]
pub struct FullIdentity {
    pub public_name: String,
    pub identity: PrivateIdentity,
}

pub type SharedIdentity = Arc<FullIdentity>;

#[cfg(test)]
mod test {
    use super::*;

    const SUITES: [KeyType; 3] = [
        KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc,
        KeyType::Ecdh521Ecdsa521Sha512Aes256Cbc,
        KeyType::X25519Ed25519Sha512Aes256Cbc,
    ];

    #[test]
    fn encrypt_decrypt_all_suites() {
        for key_type in SUITES {
            let sender = PrivateIdentity::generate(key_type).unwrap();
            let recipient = PrivateIdentity::generate(key_type).unwrap();

            let cipher_text = sender
                .encrypt(b"the quick brown fox", recipient.public())
                .unwrap();
            assert_ne!(b"the quick brown fox".to_vec(), cipher_text);

            let plain = recipient.decrypt(&cipher_text).unwrap();
            assert_eq!(b"the quick brown fox".to_vec(), plain);
        }
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key_type = KeyType::X25519Ed25519Sha512Aes256Cbc;
        let recipient = PrivateIdentity::generate(key_type).unwrap();
        let outsider = PrivateIdentity::generate(key_type).unwrap();

        let cipher_text = recipient.public().encrypt(b"secret").unwrap();
        assert!(outsider.decrypt(&cipher_text).is_err());
    }

    #[test]
    fn sign_verify_all_suites() {
        for key_type in SUITES {
            let identity = PrivateIdentity::generate(key_type).unwrap();
            let signature = identity.sign(b"payload").unwrap();

            assert!(identity
                .public()
                .verify_signature(b"payload", &signature)
                .unwrap());
            assert!(!identity
                .public()
                .verify_signature(b"tampered", &signature)
                .unwrap_or(false));
        }
    }

    #[test]
    fn ident_hash_is_stable_and_distinct() {
        let a = PrivateIdentity::generate(
            KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc,
        )
        .unwrap();
        let b = PrivateIdentity::generate(
            KeyType::Ecdh256Ecdsa256Sha256Aes256Cbc,
        )
        .unwrap();

        assert_eq!(a.ident_hash(), a.public().ident_hash());
        assert_ne!(a.ident_hash(), b.ident_hash());
    }

    #[test]
    fn key_type_string_round_trip() {
        for key_type in SUITES {
            assert_eq!(
                key_type,
                key_type.to_string().parse::<KeyType>().unwrap()
            );
        }
        assert_matches!(
            Err(Error::UnsupportedKeyType),
            "NTRU1087_GMSS512".parse::<KeyType>()
        );
    }
}
