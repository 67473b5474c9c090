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

//! The process-wide context.
//!
//! Created once in `main` and threaded through constructors; the identity
//! and address tables are read-only after boot. The byte counters are plain
//! atomics and may be bumped from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::address_book::AddressBook;
use crate::identity::storage::IdentityStorage;
use crate::identity::SharedIdentity;
use crate::packet::{CommunicationPacket, PacketForQueue};
use crate::support::data_paths::DataPaths;
use crate::support::queue::Queue;

pub struct BoteContext {
    nickname: String,
    paths: DataPaths,
    identities: IdentityStorage,
    address_book: AddressBook,

    send_queue: Arc<Queue<PacketForQueue>>,
    recv_queue: Arc<Queue<CommunicationPacket>>,

    bytes_sent: AtomicU64,
    bytes_recv: AtomicU64,
    started_at: Instant,
}

pub type SharedContext = Arc<BoteContext>;

impl BoteContext {
    pub fn new(
        nickname: String,
        paths: DataPaths,
        identities: IdentityStorage,
        address_book: AddressBook,
    ) -> Self {
        BoteContext {
            nickname,
            paths,
            identities,
            address_book,
            send_queue: Arc::new(Queue::new()),
            recv_queue: Arc::new(Queue::new()),
            bytes_sent: AtomicU64::new(0),
            bytes_recv: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn identities(&self) -> &[SharedIdentity] {
        self.identities.all()
    }

    pub fn identities_count(&self) -> usize {
        self.identities.count()
    }

    pub fn identity_by_name(&self, name: &str) -> Option<SharedIdentity> {
        self.identities.by_name(name)
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }

    pub fn send_queue(&self) -> &Arc<Queue<PacketForQueue>> {
        &self.send_queue
    }

    pub fn recv_queue(&self) -> &Arc<Queue<CommunicationPacket>> {
        &self.recv_queue
    }

    pub fn add_sent_bytes(&self, count: u64) {
        self.bytes_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_recv_bytes(&self, count: u64) {
        self.bytes_recv.fetch_add(count, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_recv(&self) -> u64 {
        self.bytes_recv.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Current wall-clock time as the wire's 32-bit epoch seconds.
    pub fn ts_now(&self) -> u32 {
        chrono::Utc::now().timestamp() as u32
    }
}
