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

//! The node-local side of the DHT facade.
//!
//! The local cache mirrors what this node would serve to peers: index
//! packets under `DHTindex/` and encrypted email packets under `DHTemail/`,
//! each file named by the base64 of its 32-byte key. The network verbs go
//! through the transport send queue; with no reachable peers they complete
//! with zero responses and the pipeline's skip/retry machinery takes over.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, warn};

use crate::context::SharedContext;
use crate::dht::Dht;
use crate::packet::{
    sniff_stored_packet, CommunicationPacket, DhtKind, EmailDeleteRequest,
    EmailEncryptedPacket, Hash32, IndexPacket, PacketForQueue, StoreRequest,
};
use crate::support::log_prefix::LogPrefix;

pub struct DhtClient {
    context: SharedContext,
    log_prefix: LogPrefix,
    /// Serialises all cache file access.
    cache_lock: Mutex<()>,
    /// Peer destinations known to the router; empty until the transport
    /// layer hands some over.
    peers: Vec<String>,
}

fn cache_name(key: &Hash32) -> String {
    base64::encode_config(key, base64::URL_SAFE_NO_PAD)
}

impl DhtClient {
    pub fn new(context: SharedContext) -> Self {
        DhtClient {
            context,
            log_prefix: LogPrefix::new("DHT"),
            cache_lock: Mutex::new(()),
            peers: Vec::new(),
        }
    }

    pub fn with_peers(context: SharedContext, peers: Vec<String>) -> Self {
        DhtClient {
            peers,
            ..DhtClient::new(context)
        }
    }

    fn index_path(&self, key: &Hash32) -> PathBuf {
        self.context.paths().dht_index.join(cache_name(key))
    }

    fn email_path(&self, key: &Hash32) -> PathBuf {
        self.context.paths().dht_email.join(cache_name(key))
    }

    fn enqueue(&self, destination: &str, payload: Vec<u8>) {
        self.context.add_sent_bytes(payload.len() as u64);
        self.context.send_queue().put(PacketForQueue {
            destination: destination.to_owned(),
            payload,
        });
    }
}

impl Dht for DhtClient {
    fn find_all(
        &self,
        key: &Hash32,
        kind: DhtKind,
    ) -> Vec<CommunicationPacket> {
        if self.peers.is_empty() {
            debug!(
                "{} find_all({:?}, {}): no peers",
                self.log_prefix,
                kind,
                cache_name(key)
            );
            return Vec::new();
        }

        // Fan the retrieve out; responses come back asynchronously through
        // the receive queue and are collected by the batch timeout.
        for peer in &self.peers {
            let mut payload = vec![kind as u8];
            payload.extend_from_slice(key);
            self.enqueue(peer, payload);
        }

        let mut responses = Vec::new();
        while let Some(packet) =
            self.context.recv_queue().get_next_with_timeout(500)
        {
            self.context.add_recv_bytes(packet.payload.len() as u64);
            responses.push(packet);
        }
        responses
    }

    fn store(
        &self,
        key: &Hash32,
        kind: DhtKind,
        request: &StoreRequest,
    ) -> Vec<String> {
        if self.peers.is_empty() {
            warn!(
                "{} store({:?}, {}): no peers",
                self.log_prefix,
                kind,
                cache_name(key)
            );
            return Vec::new();
        }

        let payload = request.to_bytes();
        for peer in &self.peers {
            self.enqueue(peer, payload.clone());
        }

        // Peers that acknowledged before the collection window closed
        // count as stores.
        let mut ok_peers = Vec::new();
        while let Some(packet) =
            self.context.recv_queue().get_next_with_timeout(500)
        {
            self.context.add_recv_bytes(packet.payload.len() as u64);
            ok_peers.push(packet.from);
        }
        ok_peers
    }

    fn get_email(&self, key: &Hash32) -> Option<Vec<u8>> {
        let _guard = self.cache_lock.lock().unwrap();
        fs::read(self.email_path(key)).ok()
    }

    fn get_index(&self, ident_hash: &Hash32) -> Option<Vec<u8>> {
        let _guard = self.cache_lock.lock().unwrap();
        fs::read(self.index_path(ident_hash)).ok()
    }

    fn safe(&self, bytes: &[u8]) -> bool {
        let _guard = self.cache_lock.lock().unwrap();

        let (path, replace) = match sniff_stored_packet(bytes) {
            Some(DhtKind::Index) => {
                // Keyed by the recipient hash; the last parse wins.
                let packet = match IndexPacket::parse(bytes, true) {
                    Ok(packet) => packet,
                    Err(_) => return false,
                };
                (self.index_path(&packet.hash), true)
            },
            Some(DhtKind::Email) => {
                // Content-addressed, so an existing file is already right.
                let packet = match EmailEncryptedPacket::parse(bytes, true) {
                    Ok(packet) => packet,
                    Err(_) => return false,
                };
                (self.email_path(&packet.key), false)
            },
            _ => {
                warn!("{} safe: unrecognised packet, dropped", self.log_prefix);
                return false;
            },
        };

        if !replace && path.exists() {
            return false;
        }

        match fs::write(&path, bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "{} safe: can't write {}: {}",
                    self.log_prefix,
                    path.display(),
                    e
                );
                false
            },
        }
    }

    fn delete_email(
        &self,
        key: &Hash32,
        request: &EmailDeleteRequest,
    ) -> Vec<String> {
        let _guard = self.cache_lock.lock().unwrap();
        let path = self.email_path(key);

        let stored = match fs::read(&path) {
            Ok(stored) => stored,
            Err(_) => return Vec::new(),
        };
        let packet = match EmailEncryptedPacket::parse(&stored, true) {
            Ok(packet) => packet,
            Err(_) => return Vec::new(),
        };

        if openssl::sha::sha256(&request.da) != packet.delete_hash {
            warn!(
                "{} delete_email: authorisation mismatch for {}",
                self.log_prefix,
                cache_name(key)
            );
            return Vec::new();
        }

        match fs::remove_file(&path) {
            Ok(()) => vec!["local".to_owned()],
            Err(_) => Vec::new(),
        }
    }

    fn delete_index_entry(
        &self,
        ident_hash: &Hash32,
        key: &Hash32,
        da: &Hash32,
    ) -> Vec<String> {
        let _guard = self.cache_lock.lock().unwrap();
        let path = self.index_path(ident_hash);

        let stored = match fs::read(&path) {
            Ok(stored) => stored,
            Err(_) => return Vec::new(),
        };
        let mut packet = match IndexPacket::parse(&stored, true) {
            Ok(packet) => packet,
            Err(_) => return Vec::new(),
        };

        let before = packet.entries.len();
        packet
            .entries
            .retain(|entry| !(entry.key == *key && entry.dv == *da));

        if packet.entries.len() == before {
            return Vec::new();
        }

        let result = if packet.entries.is_empty() {
            fs::remove_file(&path)
        } else {
            fs::write(&path, packet.to_bytes())
        };

        match result {
            Ok(()) => vec!["local".to_owned()],
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::address_book::AddressBook;
    use crate::context::BoteContext;
    use crate::identity::storage::IdentityStorage;
    use crate::packet::IndexEntry;
    use crate::support::data_paths::DataPaths;

    fn client() -> (tempfile::TempDir, DhtClient) {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        paths.ensure().unwrap();

        let context = Arc::new(BoteContext::new(
            "test".to_owned(),
            paths,
            IdentityStorage::default(),
            AddressBook::default(),
        ));
        (dir, DhtClient::new(context))
    }

    fn email_packet(da: [u8; 32]) -> EmailEncryptedPacket {
        let edata = vec![9u8; 24];
        EmailEncryptedPacket {
            key: crate::mail::dht_key_of(&edata),
            alg: 5,
            stored_time: 0,
            edata,
            delete_hash: openssl::sha::sha256(&da),
        }
    }

    #[test]
    fn safe_is_idempotent_for_email_packets() {
        let (_dir, client) = client();
        let packet = email_packet([1; 32]);
        let bytes = packet.to_bytes();

        assert!(client.safe(&bytes));
        assert!(!client.safe(&bytes));
        assert_eq!(Some(bytes), client.get_email(&packet.key));
    }

    #[test]
    fn delete_email_checks_authorisation() {
        let (_dir, client) = client();
        let da = [7u8; 32];
        let packet = email_packet(da);
        client.safe(&packet.to_bytes());

        let bad = EmailDeleteRequest {
            key: packet.key,
            da: [8u8; 32],
        };
        assert!(client.delete_email(&packet.key, &bad).is_empty());
        assert!(client.get_email(&packet.key).is_some());

        let good = EmailDeleteRequest {
            key: packet.key,
            da,
        };
        assert_eq!(1, client.delete_email(&packet.key, &good).len());
        assert!(client.get_email(&packet.key).is_none());
    }

    #[test]
    fn delete_index_entry_rewrites_packet() {
        let (_dir, client) = client();
        let ident_hash = [1u8; 32];
        let index = IndexPacket {
            hash: ident_hash,
            entries: vec![
                IndexEntry {
                    key: [2; 32],
                    dv: [3; 32],
                    time: 1,
                },
                IndexEntry {
                    key: [4; 32],
                    dv: [5; 32],
                    time: 2,
                },
            ],
        };
        assert!(client.safe(&index.to_bytes()));

        assert_eq!(
            1,
            client
                .delete_index_entry(&ident_hash, &[2; 32], &[3; 32])
                .len()
        );
        let remaining = IndexPacket::parse(
            &client.get_index(&ident_hash).unwrap(),
            true,
        )
        .unwrap();
        assert_eq!(1, remaining.entries.len());
        assert_eq!([4; 32], remaining.entries[0].key);

        // Removing the last entry removes the file
        assert_eq!(
            1,
            client
                .delete_index_entry(&ident_hash, &[4; 32], &[5; 32])
                .len()
        );
        assert!(client.get_index(&ident_hash).is_none());
    }

    #[test]
    fn network_verbs_without_peers_return_nothing() {
        let (_dir, client) = client();
        let request = StoreRequest::new(b"hc".to_vec(), vec![1, 2, 3]);

        assert!(client.store(&[0; 32], DhtKind::Email, &request).is_empty());
        assert!(client.find_all(&[0; 32], DhtKind::Index).is_empty());
    }
}
