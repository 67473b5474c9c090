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

//! An in-memory DHT for tests: scripted responses, recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::dht::Dht;
use crate::packet::{
    sniff_stored_packet, CommunicationPacket, DhtKind, EmailDeleteRequest,
    EmailEncryptedPacket, Hash32, IndexPacket, ResponsePacket, StatusCode,
    StoreRequest,
};

#[derive(Default)]
pub struct MockDht {
    /// Payloads served for `find_all(key, kind)`, each wrapped in an OK
    /// response from a distinct mock peer.
    pub find_results: Mutex<HashMap<(Hash32, u8), Vec<Vec<u8>>>>,
    /// Scripted outcomes for successive `store` calls; exhausted entries
    /// default to success.
    pub store_script: Mutex<VecDeque<bool>>,

    pub stored: Mutex<Vec<(Hash32, DhtKind, Vec<u8>)>>,
    pub saved: Mutex<Vec<Vec<u8>>>,
    pub deleted_email: Mutex<Vec<(Hash32, Hash32)>>,
    pub deleted_index: Mutex<Vec<(Hash32, Hash32, Hash32)>>,

    /// Local cache fed by `safe`, as the real client keeps on disk.
    pub email_cache: Mutex<HashMap<Hash32, Vec<u8>>>,
    pub index_cache: Mutex<HashMap<Hash32, Vec<u8>>>,
}

impl MockDht {
    pub fn new() -> Self {
        MockDht::default()
    }

    pub fn serve(&self, key: Hash32, kind: DhtKind, data: Vec<u8>) {
        self.find_results
            .lock()
            .unwrap()
            .entry((key, kind as u8))
            .or_default()
            .push(data);
    }

    /// Script the next `store` calls; `false` simulates zero OK responses.
    pub fn script_store(&self, outcomes: &[bool]) {
        self.store_script.lock().unwrap().extend(outcomes);
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().unwrap().len()
    }
}

impl Dht for MockDht {
    fn find_all(
        &self,
        key: &Hash32,
        kind: DhtKind,
    ) -> Vec<CommunicationPacket> {
        self.find_results
            .lock()
            .unwrap()
            .get(&(*key, kind as u8))
            .map(|payloads| {
                payloads
                    .iter()
                    .enumerate()
                    .map(|(i, data)| {
                        ResponsePacket {
                            status: StatusCode::Ok,
                            data: data.clone(),
                        }
                        .to_comm_packet(format!("peer{}", i))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn store(
        &self,
        key: &Hash32,
        kind: DhtKind,
        request: &StoreRequest,
    ) -> Vec<String> {
        let ok = self
            .store_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(true);
        if !ok {
            return Vec::new();
        }

        self.stored
            .lock()
            .unwrap()
            .push((*key, kind, request.data.clone()));
        vec!["peer0".to_owned()]
    }

    fn get_email(&self, key: &Hash32) -> Option<Vec<u8>> {
        self.email_cache.lock().unwrap().get(key).cloned()
    }

    fn get_index(&self, ident_hash: &Hash32) -> Option<Vec<u8>> {
        self.index_cache.lock().unwrap().get(ident_hash).cloned()
    }

    fn safe(&self, bytes: &[u8]) -> bool {
        self.saved.lock().unwrap().push(bytes.to_vec());
        match sniff_stored_packet(bytes) {
            Some(DhtKind::Email) => {
                let packet = EmailEncryptedPacket::parse(bytes, true).unwrap();
                self.email_cache
                    .lock()
                    .unwrap()
                    .insert(packet.key, bytes.to_vec());
                true
            },
            Some(DhtKind::Index) => {
                let packet = IndexPacket::parse(bytes, true).unwrap();
                self.index_cache
                    .lock()
                    .unwrap()
                    .insert(packet.hash, bytes.to_vec());
                true
            },
            _ => false,
        }
    }

    fn delete_email(
        &self,
        key: &Hash32,
        request: &EmailDeleteRequest,
    ) -> Vec<String> {
        self.deleted_email.lock().unwrap().push((*key, request.da));
        vec!["peer0".to_owned()]
    }

    fn delete_index_entry(
        &self,
        ident_hash: &Hash32,
        key: &Hash32,
        da: &Hash32,
    ) -> Vec<String> {
        self.deleted_index
            .lock()
            .unwrap()
            .push((*ident_hash, *key, *da));
        vec!["peer0".to_owned()]
    }
}
