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

//! Directory conventions under the node data directory.
//!
//! Mail files are MIME text with a `.mail` suffix. Outbox filenames are
//! client-chosen; inbox filenames are DHT keys in base64.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MAIL_SUFFIX: &str = ".mail";

/// The fixed directory layout under the node root.
#[derive(Clone, Debug)]
pub struct DataPaths {
    root: PathBuf,
    pub outbox: PathBuf,
    pub sent: PathBuf,
    pub inbox: PathBuf,
    pub incomplete: PathBuf,
    pub identities: PathBuf,
    pub dht_index: PathBuf,
    pub dht_email: PathBuf,
    pub tmp: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        DataPaths {
            outbox: root.join("outbox"),
            sent: root.join("sent"),
            inbox: root.join("inbox"),
            incomplete: root.join("incomplete"),
            identities: root.join("identities"),
            dht_index: root.join("DHTindex"),
            dht_email: root.join("DHTemail"),
            tmp: root.join("tmp"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every directory in the layout if not already present.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [
            &self.root,
            &self.outbox,
            &self.sent,
            &self.inbox,
            &self.incomplete,
            &self.identities,
            &self.dht_index,
            &self.dht_email,
            &self.tmp,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
