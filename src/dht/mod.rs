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

//! The narrow DHT contract the email pipeline consumes.
//!
//! The Kademlia routing layer itself lives behind this trait; the pipeline
//! only ever scatter-gathers responses, issues store and delete requests,
//! and reads/writes the local cache.

pub mod client;

#[cfg(test)]
pub mod mock;

use crate::packet::{
    CommunicationPacket, DhtKind, EmailDeleteRequest, Hash32, StoreRequest,
};

pub trait Dht: Send + Sync {
    /// Scatter-gather a retrieve to the peers closest to `key`, returning
    /// only the type-tagged response packets.
    fn find_all(&self, key: &Hash32, kind: DhtKind)
        -> Vec<CommunicationPacket>;

    /// Ask the peers closest to `key` to store `request`. Returns the ids of
    /// the peers that replied OK.
    fn store(
        &self,
        key: &Hash32,
        kind: DhtKind,
        request: &StoreRequest,
    ) -> Vec<String>;

    /// Local cache lookup of an encrypted email packet.
    fn get_email(&self, key: &Hash32) -> Option<Vec<u8>>;

    /// Local cache lookup of an index packet.
    fn get_index(&self, ident_hash: &Hash32) -> Option<Vec<u8>>;

    /// Write a stored packet into the local cache; idempotent by content
    /// hash. Returns whether anything was written.
    fn safe(&self, bytes: &[u8]) -> bool;

    /// Best-effort removal of the encrypted email packet at `key`.
    fn delete_email(
        &self,
        key: &Hash32,
        request: &EmailDeleteRequest,
    ) -> Vec<String>;

    /// Best-effort removal of one entry from the index packet at
    /// `ident_hash`.
    fn delete_index_entry(
        &self,
        ident_hash: &Hash32,
        key: &Hash32,
        da: &Hash32,
    ) -> Vec<String>;
}
