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

//! The MIME header view of a mail.
//!
//! Only headers on the allow-list survive loading. Anything else is stripped
//! before the mail is processed further; this is a security contract, not a
//! convenience, since arbitrary headers would otherwise travel into the DHT.

use log::debug;

use crate::support::error::Error;

/// Headers that survive loading. `X-I2PBote-*` is allowed as a prefix.
pub const HEADER_ALLOW_LIST: &[&str] = &[
    "From",
    "To",
    "Subject",
    "Date",
    "Message-ID",
    "References",
    "In-Reply-To",
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
];

const ALLOWED_PREFIX: &str = "X-I2PBote-";

fn is_allowed(name: &str) -> bool {
    HEADER_ALLOW_LIST.iter().any(|h| h.eq_ignore_ascii_case(name))
        || name
            .get(..ALLOWED_PREFIX.len())
            .map_or(false, |p| p.eq_ignore_ascii_case(ALLOWED_PREFIX))
}

/// An ordered header block with case-insensitive lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first occurrence of `name`, or append it.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        for (n, v) in &mut self.entries {
            if n.eq_ignore_ascii_case(name) {
                *v = value;
                return;
            }
        }
        self.entries.push((name.to_owned(), value));
    }

    pub fn serialise(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.entries {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out
    }
}

/// Split `bytes` into the filtered header block and the raw body.
pub fn parse_mime(bytes: &[u8]) -> Result<(Headers, Vec<u8>), Error> {
    let text = String::from_utf8_lossy(bytes);

    let mut entries: Vec<(String, String)> = Vec::new();
    let mut consumed = 0usize;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(|c| c == '\r' || c == '\n');

        if trimmed.is_empty() {
            consumed += line.len();
            break;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            // Folded continuation of the previous header
            if let Some((_, value)) = entries.last_mut() {
                value.push(' ');
                value.push_str(trimmed.trim_start());
            }
        } else {
            let (name, value) =
                trimmed.split_once(':').ok_or(Error::EmptyMail)?;
            entries.push((
                name.trim().to_owned(),
                value.trim_start().to_owned(),
            ));
        }

        consumed += line.len();
    }

    entries.retain(|(name, _)| {
        let keep = is_allowed(name);
        if !keep {
            debug!("mail: forbidden header {} removed", name);
        }
        keep
    });

    let body = bytes.get(consumed..).unwrap_or(&[]).to_vec();
    Ok((Headers { entries }, body))
}

/// Extract the addr-spec from a `Name <addr>` style field.
pub fn mailbox_of(field: &str) -> &str {
    match (field.find('<'), field.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            field[open + 1..close].trim()
        },
        _ => field.trim(),
    }
}

/// Extract the display name ahead of a `<addr>` part, if any.
pub fn label_of(field: &str) -> &str {
    match field.find('<') {
        Some(open) => field[..open].trim(),
        None => field.trim(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_filters_and_folds() {
        let (headers, body) = parse_mime(
            b"From: alice <alice>\r\n\
              To: bob\r\n\
              Subject: a long\r\n subject line\r\n\
              X-Evil: payload\r\n\
              X-I2PBote-DHT-Key: abc\r\n\
              \r\n\
              body text\r\n",
        )
        .unwrap();

        assert_eq!(Some("alice <alice>"), headers.get("from"));
        assert_eq!(Some("a long subject line"), headers.get("Subject"));
        assert_eq!(None, headers.get("X-Evil"));
        assert_eq!(Some("abc"), headers.get("X-I2PBote-DHT-Key"));
        assert_eq!(b"body text\r\n".to_vec(), body);
    }

    #[test]
    fn parse_tolerates_missing_body() {
        let (headers, body) = parse_mime(b"Subject: hi\r\n").unwrap();
        assert_eq!(Some("hi"), headers.get("Subject"));
        assert!(body.is_empty());
    }

    #[test]
    fn set_replaces_in_place() {
        let (mut headers, _) =
            parse_mime(b"Subject: one\r\n\r\n").unwrap();
        headers.set("subject", "two");
        headers.set("Message-ID", "x@bote.i2p");

        let text = headers.serialise();
        assert_eq!(
            "Subject: two\r\nMessage-ID: x@bote.i2p\r\n",
            text
        );
    }

    #[test]
    fn mailbox_and_label_extraction() {
        assert_eq!("b64.AAAA", mailbox_of("bob <b64.AAAA>"));
        assert_eq!("bob", label_of("bob <b64.AAAA>"));
        assert_eq!("plain", mailbox_of("plain"));
        assert_eq!("plain", label_of("plain"));
    }
}
