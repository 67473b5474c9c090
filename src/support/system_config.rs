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

use serde::{Deserialize, Serialize};

/// The system-wide configuration for a Bote node.
///
/// This is stored in a file named `bote.toml` at the node root. It is read
/// once at boot; no runtime reloading happens.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SystemConfig {
    /// The node's public nickname.
    #[serde(default)]
    pub nickname: String,

    #[serde(default)]
    pub pop3: Pop3Config,

    #[serde(default)]
    pub intervals: IntervalConfig,

    #[serde(default)]
    pub router: RouterConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            nickname: String::new(),
            pop3: Pop3Config::default(),
            intervals: IntervalConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Pop3Config {
    pub listen_host: String,
    pub listen_port: u16,
}

impl Default for Pop3Config {
    fn default() -> Self {
        Pop3Config {
            listen_host: "127.0.0.1".to_owned(),
            listen_port: 7110,
        }
    }
}

/// Worker wake-up intervals, in seconds.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IntervalConfig {
    /// How often each identity's check task polls the DHT for new mail.
    pub check_email_secs: u64,
    /// How often the send task scans the outbox.
    pub send_email_secs: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        IntervalConfig {
            check_email_secs: 300,
            send_email_secs: 300,
        }
    }
}

/// Transport bootstrap data. Read at boot and handed to the transport layer;
/// nothing in the core consults it afterwards.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RouterConfig {
    pub host: String,
    pub port_tcp: u16,
    pub port_udp: u16,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            host: "127.0.0.1".to_owned(),
            port_tcp: 7670,
            port_udp: 7655,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: SystemConfig = toml::from_str(
            r#"
            nickname = "test-node"

            [pop3]
            listen_host = "0.0.0.0"
            listen_port = 110
            "#,
        )
        .unwrap();

        assert_eq!("test-node", config.nickname);
        assert_eq!(110, config.pop3.listen_port);
        assert_eq!(300, config.intervals.check_email_secs);
        assert_eq!(7670, config.router.port_tcp);
    }

    #[test]
    fn empty_config_is_valid() {
        let config: SystemConfig = toml::from_str("").unwrap();
        assert_eq!("127.0.0.1", config.pop3.listen_host);
    }
}
