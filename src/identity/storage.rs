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

//! The on-disk identity store.
//!
//! Each identity is one TOML file under `identities/`, named
//! `<public_name>.toml`, holding the key type and the base64 of the four raw
//! keys. The store is loaded once at boot and read-only afterwards.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::identity::{FullIdentity, PrivateIdentity, PublicIdentity, SharedIdentity};
use crate::support::error::Error;
use crate::support::file_ops;

#[allow(clippy::ptr_arg)]
mod b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Vec<u8>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::encode_config(
            bytes,
            base64::URL_SAFE_NO_PAD,
        ))
    }

    pub fn deserialize<'a, D: Deserializer<'a>>(
        de: D,
    ) -> Result<Vec<u8>, D::Error> {
        use serde::de::Error;
        String::deserialize(de).and_then(|s| {
            base64::decode_config(s, base64::URL_SAFE_NO_PAD)
                .map_err(|err| Error::custom(err.to_string()))
        })
    }
}

#[derive(Deserialize, Serialize)]
struct IdentityFile {
    public_name: String,
    key_type: String,
    #[serde(with = "b64")]
    crypto_key: Vec<u8>,
    #[serde(with = "b64")]
    signing_key: Vec<u8>,
    #[serde(with = "b64")]
    crypto_key_private: Vec<u8>,
    #[serde(with = "b64")]
    signing_key_private: Vec<u8>,
}

/// All identities configured on this node.
#[derive(Clone, Debug, Default)]
pub struct IdentityStorage {
    identities: Vec<SharedIdentity>,
}

impl IdentityStorage {
    /// Load every parseable identity file under `dir`.
    ///
    /// Unparseable files are logged and skipped; they must not take the node
    /// down.
    pub fn load(dir: &Path) -> Result<Self, Error> {
        let mut identities = Vec::new();

        for path in file_ops::list_files(dir)? {
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("identities: can't read {}: {}", path.display(), e);
                    continue;
                },
            };

            match parse_identity_file(&raw) {
                Ok(identity) => {
                    info!(
                        "identities: loaded '{}' ({})",
                        identity.public_name,
                        identity.identity.key_type()
                    );
                    identities.push(Arc::new(identity));
                },
                Err(e) => {
                    warn!("identities: bad file {}: {}", path.display(), e);
                },
            }
        }

        Ok(IdentityStorage { identities })
    }

    pub fn from_identities(identities: Vec<FullIdentity>) -> Self {
        IdentityStorage {
            identities: identities.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn all(&self) -> &[SharedIdentity] {
        &self.identities
    }

    pub fn count(&self) -> usize {
        self.identities.len()
    }

    /// Look an identity up by its public name or its full v1 address.
    pub fn by_name(&self, name: &str) -> Option<SharedIdentity> {
        self.identities
            .iter()
            .find(|id| {
                id.public_name == name
                    || super::address::to_address_v1(id.identity.public())
                        == name
            })
            .cloned()
    }
}

fn parse_identity_file(raw: &str) -> Result<FullIdentity, Error> {
    let file: IdentityFile = toml::from_str(raw)?;
    let key_type = file.key_type.parse()?;

    let public =
        PublicIdentity::from_parts(key_type, file.crypto_key, file.signing_key)?;
    let identity = PrivateIdentity::from_parts(
        public,
        file.crypto_key_private,
        file.signing_key_private,
    )?;

    Ok(FullIdentity {
        public_name: file.public_name,
        identity,
    })
}

/// Write `identity` under `dir` as `<public_name>.toml`.
pub fn save_identity(dir: &Path, identity: &FullIdentity) -> Result<(), Error> {
    let file = IdentityFile {
        public_name: identity.public_name.clone(),
        key_type: identity.identity.key_type().to_string(),
        crypto_key: identity.identity.public().crypto_key().to_vec(),
        signing_key: identity.identity.public().signing_key().to_vec(),
        crypto_key_private: identity.identity.crypto_key_bytes().to_vec(),
        signing_key_private: identity.identity.signing_key_bytes().to_vec(),
    };

    let raw = toml::to_string_pretty(&file)
        .expect("identity file serialisation cannot fail");
    let path = dir.join(format!("{}.toml", identity.public_name));
    fs::write(path, raw)?;
    Ok(())
}
