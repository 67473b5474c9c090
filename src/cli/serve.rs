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

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};
use nix::sys::signal::{SigSet, Signal};

use crate::address_book::AddressBook;
use crate::context::BoteContext;
use crate::dht::client::DhtClient;
use crate::identity::storage::IdentityStorage;
use crate::pop3::Pop3Server;
use crate::support::data_paths::DataPaths;
use crate::support::system_config::SystemConfig;
use crate::worker::EmailWorker;

// Startup-only fatal conditions exit through sysexits; after this point no
// error kills the node.
macro_rules! fatal {
    ($ex:ident, $($stuff:tt)*) => {{
        error!($($stuff)*);
        crate::support::sysexits::$ex.exit()
    }}
}

pub(super) fn serve(root: PathBuf) {
    let config = load_config(&root);

    let paths = DataPaths::new(&root);
    if let Err(e) = paths.ensure() {
        fatal!(EX_CANTCREAT, "Cannot create data directories: {}", e);
    }

    let identities = match IdentityStorage::load(&paths.identities) {
        Ok(identities) => identities,
        Err(e) => fatal!(EX_IOERR, "Cannot read identities: {}", e),
    };

    let address_book = match AddressBook::load(&root.join("address_book.toml"))
    {
        Ok(address_book) => address_book,
        Err(e) => fatal!(EX_CONFIG, "Cannot read address book: {}", e),
    };

    let context = Arc::new(BoteContext::new(
        config.nickname.clone(),
        paths,
        identities,
        address_book,
    ));

    let dht = Arc::new(DhtClient::new(Arc::clone(&context)));

    let mut worker = EmailWorker::new(
        Arc::clone(&context),
        dht,
        config.intervals.clone(),
    );
    worker.start();

    let mut pop3 = Pop3Server::new(
        Arc::clone(&context),
        config.pop3.listen_host.clone(),
        config.pop3.listen_port,
    );
    if let Err(e) = pop3.start() {
        fatal!(
            EX_UNAVAILABLE,
            "Cannot listen on {}:{}: {}",
            config.pop3.listen_host,
            config.pop3.listen_port,
            e
        );
    }

    info!(
        "bote: node '{}' up, {} identities",
        context.nickname(),
        context.identities_count()
    );

    wait_for_shutdown();

    info!("bote: shutting down");
    pop3.stop();
    worker.stop();
}

fn load_config(root: &PathBuf) -> SystemConfig {
    let path = root.join("bote.toml");
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if io::ErrorKind::NotFound == e.kind() => {
            info!("bote: no {} found, using defaults", path.display());
            return SystemConfig::default();
        },
        Err(e) => fatal!(EX_NOINPUT, "Cannot read {}: {}", path.display(), e),
    };

    match toml::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            fatal!(EX_CONFIG, "Invalid config {}: {}", path.display(), e)
        },
    }
}

fn wait_for_shutdown() {
    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);

    if let Err(e) = signals.thread_block() {
        fatal!(EX_OSERR, "Cannot configure signal handling: {}", e);
    }

    match signals.wait() {
        Ok(signal) => info!("bote: received {}", signal),
        Err(e) => error!("bote: signal wait failed: {}", e),
    }
}
