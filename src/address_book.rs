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

//! The address book: local labels and aliases for destination addresses.
//!
//! Stored as `address_book.toml` at the node root. A missing file is an
//! empty book, not an error.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AddressBook {
    /// Contact label to destination address.
    #[serde(default)]
    names: BTreeMap<String, String>,
    /// `user@domain` style alias to destination address.
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

impl AddressBook {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                return Ok(AddressBook::default())
            },
            Err(e) => return Err(e.into()),
        };
        Ok(toml::from_str(&raw)?)
    }

    pub fn name_exists(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn alias_exists(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    pub fn address_for_name(&self, name: &str) -> Option<&str> {
        self.names.get(name).map(String::as_str)
    }

    pub fn address_for_alias(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    #[cfg(test)]
    pub fn insert_name(&mut self, name: impl Into<String>, address: impl Into<String>) {
        self.names.insert(name.into(), address.into());
    }

    #[cfg(test)]
    pub fn insert_alias(&mut self, alias: impl Into<String>, address: impl Into<String>) {
        self.aliases.insert(alias.into(), address.into());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let book = AddressBook::load(&dir.path().join("nx.toml")).unwrap();
        assert!(!book.name_exists("bob"));
    }

    #[test]
    fn load_resolves_names_and_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("address_book.toml");
        fs::write(
            &path,
            r#"
            [names]
            bob = "b64.BBBB"

            [aliases]
            "bob@bote.i2p" = "b64.BBBB"
            "#,
        )
        .unwrap();

        let book = AddressBook::load(&path).unwrap();
        assert_eq!(Some("b64.BBBB"), book.address_for_name("bob"));
        assert_eq!(
            Some("b64.BBBB"),
            book.address_for_alias("bob@bote.i2p")
        );
        assert_eq!(None, book.address_for_name("carol"));
    }
}
