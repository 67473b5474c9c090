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

//! The background email worker.
//!
//! One send task scans the outbox and drives the outbound pipeline; one
//! check task per identity polls the DHT for inbound mail; one delivery
//! task watches `sent/`. A supervisor thread reconciles the task set every
//! minute and joins everything on stop. Cancellation is cooperative: every
//! task checks the shared running flag between sleeps and DHT calls, and
//! the queues are woken on shutdown so no waiter is stranded.
//!
//! Failure policy: no error in a round ever kills a task. An email that
//! cannot be handled this round gets its skip latch set and stays where it
//! is; the next scan starts it afresh.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::context::SharedContext;
use crate::dht::Dht;
use crate::identity::{address, KeyType, SharedIdentity};
use crate::mail::{
    headers, Email, HASHCASH_STAMP, HEADER_DELETED, HEADER_DHT_KEY,
};
use crate::packet::{
    DhtKind, EmailDeleteRequest, EmailEncryptedPacket, Hash32, IndexEntry,
    IndexPacket, ResponsePacket, StatusCode, StoreRequest,
    INDEX_PACKET_MIN_RESPONSE_LEN,
};
use crate::support::compression::Compression;
use crate::support::error::Error;
use crate::support::file_ops;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::IntervalConfig;

const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);
const SLEEP_QUANTUM: Duration = Duration::from_millis(100);

/// Sleep for `duration`, returning early with `false` once `started` clears.
fn sleep_while_running(started: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    while started.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLEEP_QUANTUM.min(deadline - now));
    }
    false
}

pub struct EmailWorker {
    context: SharedContext,
    dht: Arc<dyn Dht>,
    intervals: IntervalConfig,
    started: Arc<AtomicBool>,
    supervisor: Option<thread::JoinHandle<()>>,
}

impl EmailWorker {
    pub fn new(
        context: SharedContext,
        dht: Arc<dyn Dht>,
        intervals: IntervalConfig,
    ) -> Self {
        EmailWorker {
            context,
            dht,
            intervals,
            started: Arc::new(AtomicBool::new(false)),
            supervisor: None,
        }
    }

    pub fn start(&mut self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.context.identities_count() == 0 {
            error!("EmailWorker: have no identities for start");
        }

        let context = Arc::clone(&self.context);
        let dht = Arc::clone(&self.dht);
        let intervals = self.intervals.clone();
        let started = Arc::clone(&self.started);
        self.supervisor = Some(thread::spawn(move || {
            supervise(context, dht, intervals, started)
        }));
    }

    /// Signal every task to tear down at its next safe point and join them.
    pub fn stop(&mut self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }

        self.context.send_queue().wake_up();
        self.context.recv_queue().wake_up();

        if let Some(supervisor) = self.supervisor.take() {
            let _ = supervisor.join();
        }
        info!("EmailWorker: stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl Drop for EmailWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The worker thread: reconcile the task set every minute, join on stop.
fn supervise(
    context: SharedContext,
    dht: Arc<dyn Dht>,
    intervals: IntervalConfig,
    started: Arc<AtomicBool>,
) {
    let mut send_task: Option<thread::JoinHandle<()>> = None;
    let mut delivery_task: Option<thread::JoinHandle<()>> = None;
    // At most one check task per public name, ever.
    let mut check_tasks: HashMap<String, thread::JoinHandle<()>> =
        HashMap::new();

    while started.load(Ordering::SeqCst) {
        let id_count = context.identities_count();

        if id_count > 0 {
            debug!(
                "EmailWorker: identities now: {}, up {}s, {}B out / {}B in",
                id_count,
                context.uptime_secs(),
                context.bytes_sent(),
                context.bytes_recv()
            );

            for identity in context.identities() {
                if check_tasks.contains_key(&identity.public_name) {
                    continue;
                }

                info!(
                    "EmailWorker: start check task for {}",
                    identity.public_name
                );
                let context = Arc::clone(&context);
                let dht = Arc::clone(&dht);
                let identity = Arc::clone(identity);
                let started = Arc::clone(&started);
                let interval =
                    Duration::from_secs(intervals.check_email_secs);
                check_tasks.insert(
                    identity.public_name.clone(),
                    thread::spawn(move || {
                        check_email_task(
                            context, dht, identity, started, interval,
                        )
                    }),
                );
            }

            if send_task.is_none() {
                info!("EmailWorker: start send task");
                let context = Arc::clone(&context);
                let dht = Arc::clone(&dht);
                let started = Arc::clone(&started);
                let interval = Duration::from_secs(intervals.send_email_secs);
                send_task = Some(thread::spawn(move || {
                    send_email_task(context, dht, started, interval)
                }));
            }

            if delivery_task.is_none() {
                info!("EmailWorker: start check delivery task");
                let context = Arc::clone(&context);
                let started = Arc::clone(&started);
                let interval =
                    Duration::from_secs(intervals.check_email_secs);
                delivery_task = Some(thread::spawn(move || {
                    check_delivery_task(context, started, interval)
                }));
            }
        } else {
            warn!("EmailWorker: have no identities for start");
        }

        if !sleep_while_running(&started, RECONCILE_INTERVAL) {
            break;
        }
    }

    for (name, task) in check_tasks {
        info!("EmailWorker: stopping check task for {}", name);
        let _ = task.join();
    }
    if let Some(task) = send_task {
        info!("EmailWorker: stopping send task");
        let _ = task.join();
    }
    if let Some(task) = delivery_task {
        info!("EmailWorker: stopping check delivery task");
        let _ = task.join();
    }
}

fn check_email_task(
    context: SharedContext,
    dht: Arc<dyn Dht>,
    identity: SharedIdentity,
    started: Arc<AtomicBool>,
    interval: Duration,
) {
    let log = LogPrefix::new("EmailWorker");
    log.set_identity(&identity.public_name);

    let mut first_complete = false;
    while started.load(Ordering::SeqCst) {
        if first_complete && !sleep_while_running(&started, interval) {
            break;
        }
        first_complete = true;

        let processed = run_check_round(&context, &*dht, &identity, &log);
        info!("{} check round complete, {} email(s)", log, processed);
    }

    info!("{} check task stopped", log);
}

fn send_email_task(
    context: SharedContext,
    dht: Arc<dyn Dht>,
    started: Arc<AtomicBool>,
    interval: Duration,
) {
    let log = LogPrefix::new("EmailWorker");

    while started.load(Ordering::SeqCst) {
        if !sleep_while_running(&started, interval) {
            break;
        }

        let sent = run_send_round(&context, &*dht, &log);
        info!("{} send round complete, {} email(s)", log, sent);
    }

    info!("{} send task stopped", log);
}

fn check_delivery_task(
    context: SharedContext,
    started: Arc<AtomicBool>,
    interval: Duration,
) {
    let log = LogPrefix::new("EmailWorker");
    info!("{} check delivery started", log);

    while started.load(Ordering::SeqCst) {
        if !sleep_while_running(&started, interval) {
            break;
        }

        let pending = run_delivery_round(&context, &log);
        info!(
            "{} check delivery round complete, {} awaiting confirmation",
            log, pending
        );
    }

    info!("{} check delivery task stopped", log);
}

/// Scan the outbox and promote every sendable file into an [`Email`]:
/// resolve the sender identity and the recipient address, persist the
/// assigned Message-ID, and pick the payload compression.
pub fn check_outbox(context: &SharedContext, log: &LogPrefix) -> Vec<Email> {
    let paths = context.paths();
    let mut outbox = Vec::new();

    let files = match file_ops::list_files(&paths.outbox) {
        Ok(files) => files,
        Err(e) => {
            warn!("{} checkOutbox: can't read outbox: {}", log, e);
            return outbox;
        },
    };

    for path in files {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "{} checkOutbox: can't read {}: {}",
                    log,
                    path.display(),
                    e
                );
                continue;
            },
        };

        let mut email = match Email::from_mime(&bytes) {
            Ok(email) => email,
            Err(e) => {
                warn!(
                    "{} checkOutbox: can't parse {}: {}",
                    log,
                    path.display(),
                    e
                );
                continue;
            },
        };
        email.set_filename(&path);

        let from_field =
            email.from_field().unwrap_or_default().to_owned();
        if from_field.is_empty() {
            warn!("{} checkOutbox: FROM empty in {}", log, path.display());
            continue;
        }
        let from_label = headers::label_of(&from_field).to_owned();
        let from_mailbox = headers::mailbox_of(&from_field).to_owned();

        let sender = context
            .identity_by_name(&from_label)
            .or_else(|| context.identity_by_name(&from_mailbox));
        let sender = match sender {
            Some(sender) => sender,
            None => {
                warn!(
                    "{} checkOutbox: unknown sender, label: {}, address: {}",
                    log, from_label, from_mailbox
                );
                continue;
            },
        };

        let canonical_from = format!(
            "{} <{}>",
            sender.public_name,
            address::to_address_v1(sender.identity.public())
        );
        email.set_header("From", canonical_from);
        email.set_sender(Some(sender.identity.clone()));

        let to_field = email.to_field().unwrap_or_default().to_owned();
        if to_field.is_empty() {
            warn!("{} checkOutbox: TO empty in {}", log, path.display());
            continue;
        }
        let to_label = headers::label_of(&to_field).to_owned();
        let to_mailbox = headers::mailbox_of(&to_field).to_owned();

        let book = context.address_book();
        let destination = book
            .address_for_name(&to_label)
            .or_else(|| book.address_for_alias(&to_mailbox))
            .map(str::to_owned)
            .unwrap_or_else(|| {
                debug!(
                    "{} checkOutbox: {} not in address book, using as is",
                    log, to_mailbox
                );
                to_mailbox.clone()
            });
        email.set_header("To", format!("{} <{}>", to_label, destination));

        match address::parse_address(&destination) {
            Ok(recipient) => email.set_recipient(Some(recipient)),
            Err(e) => {
                warn!(
                    "{} checkOutbox: can't resolve {}: {}",
                    log, destination, e
                );
                continue;
            },
        }

        // Message-ID is assigned here and persisted, so a failed round
        // retries under the same id.
        email.compose();
        if let Err(e) = email.save(&paths.outbox) {
            warn!("{} checkOutbox: can't save {}: {}", log, path.display(), e);
            continue;
        }

        // Legacy suites may refuse ZLIB; only the current one gets it.
        let scheme = match email.recipient().map(|r| r.key_type()) {
            Some(KeyType::X25519Ed25519Sha512Aes256Cbc) => Compression::Zlib,
            _ => Compression::Uncompressed,
        };
        if let Err(e) = email.compress(scheme) {
            warn!("{} checkOutbox: compression failed: {}", log, e);
            continue;
        }

        if !email.empty() {
            outbox.push(email);
        }
    }

    info!("{} checkOutbox: got {} email(s)", log, outbox.len());
    outbox
}

/// One outbound round: store every outbox mail's encrypted packet, then its
/// index entry, then retire the file to `sent/`. Returns how many were
/// retired.
pub fn run_send_round(
    context: &SharedContext,
    dht: &dyn Dht,
    log: &LogPrefix,
) -> usize {
    let paths = context.paths();
    let mut outbox = check_outbox(context, log);

    if outbox.is_empty() {
        debug!("{} send: outbox empty", log);
        return 0;
    }

    // Store the encrypted email packets
    for email in &mut outbox {
        if email.skip() {
            continue;
        }

        // A previous round may have stored this packet already; if the
        // cached copy still matches the persisted delete auth, republishing
        // it would only waste a store.
        if let Some(encrypted) = resume_encrypted(dht, email) {
            debug!("{} send: encrypted packet already published", log);
            email.set_encrypted_packet(encrypted);
            continue;
        }

        if email.encrypt().is_err() {
            warn!("{} send: email skipped", log);
            continue;
        }

        let encrypted = email
            .encrypted_packet()
            .expect("encrypt succeeded without envelope")
            .clone();
        let request = StoreRequest::new(
            HASHCASH_STAMP.as_bytes().to_vec(),
            encrypted.to_bytes(),
        );

        let nodes = dht.store(&encrypted.key, DhtKind::Email, &request);
        if nodes.is_empty() {
            email.set_skip(true);
            warn!("{} send: email not sent", log);
            continue;
        }

        dht.safe(&encrypted.to_bytes());
        // Persist the envelope stamps so the next round can resume after a
        // partial failure instead of publishing a second packet.
        if let Err(e) = email.save(&paths.outbox) {
            warn!("{} send: can't persist envelope: {}", log, e);
        }
        debug!("{} send: email sent to {} node(s)", log, nodes.len());
    }

    // Store the index packets
    for email in &mut outbox {
        if email.skip() {
            continue;
        }

        let recipient = match email.recipient() {
            Some(recipient) => recipient,
            None => {
                email.set_skip(true);
                continue;
            },
        };
        let encrypted = match email.encrypted_packet() {
            Some(encrypted) => encrypted,
            None => {
                email.set_skip(true);
                continue;
            },
        };

        let index = IndexPacket {
            hash: recipient.ident_hash(),
            entries: vec![IndexEntry {
                key: encrypted.key,
                dv: *email.da(),
                time: context.ts_now(),
            }],
        };

        let request = StoreRequest::new(
            HASHCASH_STAMP.as_bytes().to_vec(),
            index.to_bytes(),
        );

        let nodes = dht.store(&index.hash, DhtKind::Index, &request);
        if nodes.is_empty() {
            email.set_skip(true);
            warn!("{} send: index not sent", log);
            continue;
        }

        dht.safe(&index.to_bytes());
        debug!("{} send: index sent to {} node(s)", log, nodes.len());
    }

    // Retire what made it all the way
    let mut sent = 0;
    for email in &mut outbox {
        if email.skip() {
            continue;
        }

        email.set_header(HEADER_DELETED, "false");
        if let Err(e) = email.save(&paths.outbox) {
            warn!("{} send: can't save metadata: {}", log, e);
            continue;
        }
        if let Err(e) = email.move_to(&paths.sent) {
            warn!("{} send: can't move to sent: {}", log, e);
            continue;
        }

        sent += 1;
        info!("{} send: email sent, removed from outbox", log);
    }

    sent
}

/// If this mail already carries a DHT key from an earlier round and the
/// matching encrypted packet is still in the local cache, return it.
fn resume_encrypted(
    dht: &dyn Dht,
    email: &Email,
) -> Option<EmailEncryptedPacket> {
    let key = email
        .header(HEADER_DHT_KEY)
        .and_then(|v| base64::decode_config(v, base64::URL_SAFE_NO_PAD).ok())
        .filter(|v| v.len() == 32)?;
    let mut hash: Hash32 = [0u8; 32];
    hash.copy_from_slice(&key);

    let cached = dht.get_email(&hash)?;
    let packet = EmailEncryptedPacket::parse(&cached, true).ok()?;

    if !email.verify(&packet.delete_hash) {
        return None;
    }
    Some(packet)
}

/// One inbound round for `identity`: retrieve index packets, fetch the
/// encrypted mails they point at, decrypt, verify, file into the inbox, and
/// ask the DHT to forget what was delivered. Returns the number of mails
/// filed.
pub fn run_check_round(
    context: &SharedContext,
    dht: &dyn Dht,
    identity: &SharedIdentity,
    log: &LogPrefix,
) -> usize {
    let paths = context.paths();
    let ident_hash = identity.identity.ident_hash();

    let index_packets = retrieve_index(dht, &ident_hash, log);
    if index_packets.is_empty() {
        debug!("{} check: have no indices", log);
        return 0;
    }

    let mail_packets = retrieve_email(dht, &index_packets, log);
    if mail_packets.is_empty() {
        debug!("{} check: have no mail for process", log);
        return 0;
    }

    let mut emails = process_email(identity, mail_packets, log);

    let mut delivered = 0;
    for email in &mut emails {
        match email.save(&paths.inbox) {
            Ok(()) => {},
            Err(Error::MailFileExists) => {
                // Same mail re-fetched before the deletes propagated
                debug!("{} check: already filed", log);
            },
            Err(e) => {
                warn!("{} check: can't save mail: {}", log, e);
                continue;
            },
        }

        let encrypted = match email.encrypted_packet() {
            Some(encrypted) => encrypted.clone(),
            None => continue,
        };

        let request = EmailDeleteRequest {
            key: encrypted.key,
            da: *email.da(),
        };
        if dht.delete_email(&encrypted.key, &request).is_empty() {
            info!("{} check: email not removed from DHT", log);
        }
        if dht
            .delete_index_entry(&ident_hash, &encrypted.key, email.da())
            .is_empty()
        {
            info!("{} check: index not removed from DHT", log);
        }

        if let Err(e) = email.move_to(&paths.inbox) {
            warn!("{} check: can't file mail: {}", log, e);
            continue;
        }
        delivered += 1;
    }

    delivered
}

/// Gather every index packet addressed to `ident_hash`, deduplicated by its
/// hash field with the last parse kept.
fn retrieve_index(
    dht: &dyn Dht,
    ident_hash: &Hash32,
    log: &LogPrefix,
) -> Vec<IndexPacket> {
    let mut indices: HashMap<Hash32, IndexPacket> = HashMap::new();

    for comm in dht.find_all(ident_hash, DhtKind::Index) {
        let response = match ResponsePacket::from_comm_packet(&comm, true) {
            Ok(response) => response,
            Err(_) => {
                debug!("{} retrieveIndex: can't parse response, skipped", log);
                continue;
            },
        };

        if response.status != StatusCode::Ok {
            warn!(
                "{} retrieveIndex: status {:?} from {}",
                log, response.status, comm.from
            );
            continue;
        }
        if response.data.len() < INDEX_PACKET_MIN_RESPONSE_LEN {
            debug!("{} retrieveIndex: empty packet, skipped", log);
            continue;
        }

        if dht.safe(&response.data) {
            debug!("{} retrieveIndex: index packet saved", log);
        }

        let packet = match IndexPacket::parse(&response.data, true) {
            Ok(packet) => packet,
            Err(_) => {
                debug!("{} retrieveIndex: can't parse packet, skipped", log);
                continue;
            },
        };
        if packet.entries.is_empty() {
            warn!("{} retrieveIndex: empty packet", log);
            continue;
        }

        indices.insert(packet.hash, packet);
    }

    // The local cache may hold an index from an interrupted round
    if let Some(local) = dht.get_index(ident_hash) {
        if let Ok(packet) = IndexPacket::parse(&local, true) {
            if !packet.entries.is_empty() {
                indices.insert(packet.hash, packet);
            }
        }
    } else {
        debug!("{} retrieveIndex: can't find local index", log);
    }

    debug!("{} retrieveIndex: indices parsed: {}", log, indices.len());
    indices.into_values().collect()
}

/// Fetch every encrypted packet the index entries point at, deduplicated by
/// DHT key.
fn retrieve_email(
    dht: &dyn Dht,
    indices: &[IndexPacket],
    log: &LogPrefix,
) -> Vec<EmailEncryptedPacket> {
    let mut mail_packets: HashMap<Hash32, EmailEncryptedPacket> =
        HashMap::new();

    for index in indices {
        for entry in &index.entries {
            if let Some(local) = dht.get_email(&entry.key) {
                if let Ok(packet) =
                    EmailEncryptedPacket::parse(&local, true)
                {
                    if !packet.edata.is_empty() {
                        mail_packets.insert(packet.key, packet);
                    }
                }
            }

            for comm in dht.find_all(&entry.key, DhtKind::Email) {
                let response =
                    match ResponsePacket::from_comm_packet(&comm, true) {
                        Ok(response) => response,
                        Err(_) => {
                            debug!(
                                "{} retrieveEmail: can't parse response",
                                log
                            );
                            continue;
                        },
                    };

                if response.status != StatusCode::Ok {
                    warn!(
                        "{} retrieveEmail: status {:?} from {}",
                        log, response.status, comm.from
                    );
                    continue;
                }
                if response.data.is_empty() {
                    debug!("{} retrieveEmail: empty packet, skipped", log);
                    continue;
                }

                if dht.safe(&response.data) {
                    debug!(
                        "{} retrieveEmail: encrypted packet saved locally",
                        log
                    );
                }

                match EmailEncryptedPacket::parse(&response.data, true) {
                    Ok(packet) if !packet.edata.is_empty() => {
                        mail_packets.insert(packet.key, packet);
                    },
                    _ => {
                        warn!(
                            "{} retrieveEmail: mail packet without entries",
                            log
                        );
                    },
                }
            }
        }
    }

    debug!(
        "{} retrieveEmail: mail packets: {}",
        log,
        mail_packets.len()
    );
    mail_packets.into_values().collect()
}

/// Decrypt and verify a batch of encrypted packets into emails.
fn process_email(
    identity: &SharedIdentity,
    mail_packets: Vec<EmailEncryptedPacket>,
    log: &LogPrefix,
) -> Vec<Email> {
    let mut emails = Vec::new();

    for encrypted in mail_packets {
        if encrypted.edata.is_empty() {
            warn!("{} processEmail: packet is empty", log);
            continue;
        }

        let plain = match identity.identity.decrypt(&encrypted.edata) {
            Ok(plain) if !plain.is_empty() => plain,
            _ => {
                warn!("{} processEmail: can't decrypt", log);
                continue;
            },
        };

        let mut email = match Email::from_packet_bytes(&plain, true) {
            Ok(email) => email,
            Err(e) => {
                warn!("{} processEmail: bad packet: {}", log, e);
                continue;
            },
        };

        if !email.verify(&encrypted.delete_hash) {
            warn!("{} processEmail: delete auth mismatch, dropped", log);
            continue;
        }

        if email.incomplete() {
            // TODO: multi-fragment reassembly through incomplete/, once the
            // fragmenting sender side exists
            warn!("{} processEmail: multipart email dropped", log);
            continue;
        }

        email.set_encrypted_packet(encrypted);

        if !email.empty() {
            emails.push(email);
        }
    }

    debug!("{} processEmail: emails processed: {}", log, emails.len());
    emails
}

/// One delivery-confirmation round: report how many sent mails still await
/// a deletion proof.
pub fn run_delivery_round(context: &SharedContext, log: &LogPrefix) -> usize {
    let paths = context.paths();
    let mut pending = 0;

    let files = match file_ops::list_files(&paths.sent) {
        Ok(files) => files,
        Err(e) => {
            warn!("{} delivery: can't read sent: {}", log, e);
            return 0;
        },
    };

    for path in files {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        let email = match Email::from_mime(&bytes) {
            Ok(email) => email,
            Err(_) => continue,
        };

        if email.header(HEADER_DELETED) != Some("false") {
            continue;
        }

        // TODO: issue a DeletionQuery for the mail's DHT key and compare
        // the returned deletion info against the stored delete auth, once
        // the DHT facade grows that verb.
        debug!(
            "{} delivery: {} awaiting deletion info",
            log,
            path.display()
        );
        pending += 1;
    }

    pending
}

/// Snapshot the inbox into memory, as served to a POP3 session.
pub fn check_inbox(context: &SharedContext) -> Vec<Email> {
    let paths = context.paths();
    let mut emails = Vec::new();

    let files = match file_ops::list_files(&paths.inbox) {
        Ok(files) => files,
        Err(e) => {
            warn!("EmailWorker: check_inbox: can't read inbox: {}", e);
            return emails;
        },
    };

    for path in files {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "EmailWorker: check_inbox: can't read {}: {}",
                    path.display(),
                    e
                );
                continue;
            },
        };

        match Email::from_mime(&bytes) {
            Ok(mut email) => {
                email.set_filename(&path);
                emails.push(email);
            },
            Err(e) => {
                warn!(
                    "EmailWorker: check_inbox: can't parse {}: {}",
                    path.display(),
                    e
                );
            },
        }
    }

    debug!("EmailWorker: check_inbox: found {} email(s)", emails.len());
    emails
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::address_book::AddressBook;
    use crate::context::BoteContext;
    use crate::dht::mock::MockDht;
    use crate::identity::storage::IdentityStorage;
    use crate::identity::{FullIdentity, PrivateIdentity};
    use crate::support::data_paths::DataPaths;

    fn make_identity(name: &str) -> FullIdentity {
        FullIdentity {
            public_name: name.to_owned(),
            identity: PrivateIdentity::generate(
                KeyType::X25519Ed25519Sha512Aes256Cbc,
            )
            .unwrap(),
        }
    }

    fn make_context(
        identities: Vec<FullIdentity>,
        address_book: AddressBook,
    ) -> (tempfile::TempDir, SharedContext) {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        paths.ensure().unwrap();

        let context = Arc::new(BoteContext::new(
            "test".to_owned(),
            paths,
            IdentityStorage::from_identities(identities),
            address_book,
        ));
        (dir, context)
    }

    /// Build the wire artifacts a remote sender would deposit for `to`.
    fn outbound_artifacts(
        to: &FullIdentity,
    ) -> (EmailEncryptedPacket, Hash32) {
        let sender = PrivateIdentity::generate(
            KeyType::X25519Ed25519Sha512Aes256Cbc,
        )
        .unwrap();

        let mut email = Email::from_mime(
            b"From: carol <carol>\r\n\
              To: alice <alice>\r\n\
              Subject: ping\r\n\
              \r\n\
              hello alice\r\n",
        )
        .unwrap();
        email.compose();
        email.compress(Compression::Zlib).unwrap();
        email.set_sender(Some(sender));
        email.set_recipient(Some(to.identity.public().clone()));
        email.encrypt().unwrap();

        let da = *email.da();
        (email.encrypted_packet().unwrap().clone(), da)
    }

    #[test]
    fn inbound_single_fragment_files_and_deletes() {
        crate::init_test_log();

        let alice = make_identity("alice");
        let ident_hash = alice.identity.ident_hash();
        let (_dir, context) =
            make_context(vec![alice], AddressBook::default());
        let identity = context.identity_by_name("alice").unwrap();

        let (encrypted, da) = outbound_artifacts(&identity);

        let dht = MockDht::new();
        let index = IndexPacket {
            hash: ident_hash,
            entries: vec![IndexEntry {
                key: encrypted.key,
                dv: da,
                time: 1,
            }],
        };
        dht.serve(ident_hash, DhtKind::Index, index.to_bytes());
        dht.serve(encrypted.key, DhtKind::Email, encrypted.to_bytes());

        let log = LogPrefix::new("test");
        let delivered =
            run_check_round(&context, &dht, &identity, &log);
        assert_eq!(1, delivered);

        let expected = context.paths().inbox.join(format!(
            "{}.mail",
            base64::encode_config(encrypted.key, base64::URL_SAFE_NO_PAD)
        ));
        assert!(expected.is_file());

        assert_eq!(
            vec![(encrypted.key, da)],
            dht.deleted_email.lock().unwrap().clone()
        );
        assert_eq!(
            vec![(ident_hash, encrypted.key, da)],
            dht.deleted_index.lock().unwrap().clone()
        );
    }

    #[test]
    fn inbound_drops_verify_mismatch() {
        let alice = make_identity("alice");
        let ident_hash = alice.identity.ident_hash();
        let (_dir, context) =
            make_context(vec![alice], AddressBook::default());
        let identity = context.identity_by_name("alice").unwrap();

        let (mut encrypted, da) = outbound_artifacts(&identity);
        // Corrupt the advertised delete hash
        encrypted.delete_hash = [0xde; 32];

        let dht = MockDht::new();
        let index = IndexPacket {
            hash: ident_hash,
            entries: vec![IndexEntry {
                key: encrypted.key,
                dv: da,
                time: 1,
            }],
        };
        dht.serve(ident_hash, DhtKind::Index, index.to_bytes());
        dht.serve(encrypted.key, DhtKind::Email, encrypted.to_bytes());

        let log = LogPrefix::new("test");
        assert_eq!(0, run_check_round(&context, &dht, &identity, &log));
        assert!(dht.deleted_email.lock().unwrap().is_empty());
    }

    fn seeded_outbox(
    ) -> (tempfile::TempDir, SharedContext, FullIdentity, String) {
        let alice = make_identity("alice");
        let bob = make_identity("bob");
        let bob_address = address::to_address_v1(bob.identity.public());

        let mut book = AddressBook::default();
        book.insert_name("bob", &*bob_address);

        let (dir, context) = make_context(vec![alice], book);
        fs::write(
            context.paths().outbox.join("draft.mail"),
            b"From: alice <alice>\r\n\
              To: bob <bob>\r\n\
              Subject: hi bob\r\n\
              \r\n\
              see you\r\n",
        )
        .unwrap();

        (dir, context, bob, bob_address)
    }

    fn outbox_message_id(context: &SharedContext) -> String {
        let bytes =
            fs::read(context.paths().outbox.join("draft.mail")).unwrap();
        Email::from_mime(&bytes)
            .unwrap()
            .header("Message-ID")
            .unwrap()
            .to_owned()
    }

    #[test]
    fn send_round_stores_and_retires() {
        crate::init_test_log();

        let (_dir, context, bob, _) = seeded_outbox();
        let dht = MockDht::new();
        let log = LogPrefix::new("test");

        assert_eq!(1, run_send_round(&context, &dht, &log));

        // Both kinds stored, in pipeline order
        let stored = dht.stored.lock().unwrap();
        assert_eq!(2, stored.len());
        assert_eq!(DhtKind::Email, stored[0].1);
        assert_eq!(DhtKind::Index, stored[1].1);
        assert_eq!(bob.identity.ident_hash(), stored[1].0);

        // The index entry names the stored email packet
        let index = IndexPacket::parse(&stored[1].2, true).unwrap();
        assert_eq!(1, index.entries.len());
        assert_eq!(stored[0].0, index.entries[0].key);

        // File moved out of outbox into sent/ under the DHT key
        assert!(!context.paths().outbox.join("draft.mail").exists());
        let sent = file_ops::list_files(&context.paths().sent).unwrap();
        assert_eq!(1, sent.len());
        let sent_mail =
            Email::from_mime(&fs::read(&sent[0]).unwrap()).unwrap();
        assert_eq!(Some("false"), sent_mail.header(HEADER_DELETED));

        // Bob can actually read it
        let stored_packet =
            EmailEncryptedPacket::parse(&stored[0].2, true).unwrap();
        let plain = bob.identity.decrypt(&stored_packet.edata).unwrap();
        let delivered = Email::from_packet_bytes(&plain, true).unwrap();
        assert_eq!(Some("hi bob"), delivered.header("Subject"));
    }

    #[test]
    fn store_failure_keeps_file_and_message_id() {
        let (_dir, context, _bob, _) = seeded_outbox();
        let dht = MockDht::new();
        let log = LogPrefix::new("test");

        // Round 1: the encrypted-packet store gets zero OK responses
        dht.script_store(&[false]);
        assert_eq!(0, run_send_round(&context, &dht, &log));
        assert!(context.paths().outbox.join("draft.mail").exists());
        let message_id = outbox_message_id(&context);

        // Round 2: the DHT recovered; the same file goes out unchanged
        assert_eq!(1, run_send_round(&context, &dht, &log));
        assert!(!context.paths().outbox.join("draft.mail").exists());

        let sent = file_ops::list_files(&context.paths().sent).unwrap();
        let sent_mail =
            Email::from_mime(&fs::read(&sent[0]).unwrap()).unwrap();
        assert_eq!(Some(&*message_id), sent_mail.header("Message-ID"));
    }

    #[test]
    fn index_store_failure_resumes_without_republish() {
        let (_dir, context, _bob, _) = seeded_outbox();
        let dht = MockDht::new();
        let log = LogPrefix::new("test");

        // Round 1: email packet stored, index store fails
        dht.script_store(&[true, false]);
        assert_eq!(0, run_send_round(&context, &dht, &log));
        assert!(context.paths().outbox.join("draft.mail").exists());
        assert_eq!(1, dht.stored_count());
        let first_key = dht.stored.lock().unwrap()[0].0;

        // Round 2: only the index is published; the encrypted packet is
        // resumed from the local cache, not re-encrypted
        assert_eq!(1, run_send_round(&context, &dht, &log));
        let stored = dht.stored.lock().unwrap();
        assert_eq!(2, stored.len());
        assert_eq!(DhtKind::Index, stored[1].1);
        let index = IndexPacket::parse(&stored[1].2, true).unwrap();
        assert_eq!(first_key, index.entries[0].key);
    }

    #[test]
    fn unresolvable_sender_leaves_file_alone() {
        let (_dir, context) =
            make_context(vec![make_identity("alice")], AddressBook::default());
        fs::write(
            context.paths().outbox.join("stray.mail"),
            b"From: mallory <mallory>\r\nTo: bob <bob>\r\n\r\nhi\r\n",
        )
        .unwrap();

        let dht = MockDht::new();
        let log = LogPrefix::new("test");
        assert_eq!(0, run_send_round(&context, &dht, &log));
        assert!(context.paths().outbox.join("stray.mail").exists());
        assert_eq!(0, dht.stored_count());
    }

    #[test]
    fn worker_start_stop_joins_cleanly() {
        let (_dir, context) =
            make_context(vec![make_identity("alice")], AddressBook::default());
        let dht: Arc<dyn Dht> = Arc::new(MockDht::new());

        let mut worker = EmailWorker::new(
            Arc::clone(&context),
            dht,
            IntervalConfig {
                check_email_secs: 1,
                send_email_secs: 1,
            },
        );

        worker.start();
        assert!(worker.is_started());
        std::thread::sleep(Duration::from_millis(300));
        worker.stop();
        assert!(!worker.is_started());

        // Second stop is a no-op
        worker.stop();
    }
}
