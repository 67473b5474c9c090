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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed packet")]
    MalformedPacket,
    #[error("Encryption or decryption failed")]
    CryptoFailed,
    #[error("Delete authorisation hash mismatch")]
    VerifyMismatch,
    #[error("Address could not be resolved to an identity")]
    AddressUnresolved,
    #[error("No peer accepted the store request")]
    StoreNoPeers,
    #[error("Unsupported key type")]
    UnsupportedKeyType,
    #[error("Mail has no usable MIME content")]
    EmptyMail,
    #[error("Mail file already exists")]
    MailFileExists,
    #[error("Protocol violation: {0}")]
    ProtocolViolation(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    Ssl(#[from] openssl::error::ErrorStack),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}
