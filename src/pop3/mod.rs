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

//! The POP3 adapter over the on-disk inbox (RFC 1939).
//!
//! The server accepts one client at a time. On PASS the session snapshots
//! the inbox into memory and serves it under transaction semantics: DELE
//! only marks, RSET unmarks, and the files are removed from disk only when
//! QUIT leaves the transaction state (the UPDATE phase). Message numbers
//! are fixed at snapshot time; a deleted message keeps its number and
//! simply stops being addressable.

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::context::SharedContext;
use crate::mail::Email;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::worker;

const ACCEPT_POLL: Duration = Duration::from_millis(200);

pub struct Pop3Server {
    context: SharedContext,
    listen_host: String,
    listen_port: u16,
    started: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Pop3Server {
    pub fn new(
        context: SharedContext,
        listen_host: String,
        listen_port: u16,
    ) -> Self {
        Pop3Server {
            context,
            listen_host,
            listen_port,
            started: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Bind and start the accept loop. A bind failure is a boot-time fatal
    /// condition and is reported to the caller.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let listener = TcpListener::bind((
            self.listen_host.as_str(),
            self.listen_port,
        ))?;
        listener.set_nonblocking(true)?;
        info!(
            "POP3: listening on {}:{}",
            self.listen_host, self.listen_port
        );

        let context = Arc::clone(&self.context);
        let started = Arc::clone(&self.started);
        self.thread = Some(thread::spawn(move || {
            accept_loop(listener, context, started)
        }));
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        info!("POP3: stopped");
    }
}

impl Drop for Pop3Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    context: SharedContext,
    started: Arc<AtomicBool>,
) {
    while started.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!("POP3: received connection from {}", peer);
                if let Err(e) = stream.set_nonblocking(false) {
                    error!("POP3: can't configure socket: {}", e);
                    continue;
                }

                let mut session = Session::new(Arc::clone(&context));
                let reader = match stream.try_clone() {
                    Ok(reader) => BufReader::new(reader),
                    Err(e) => {
                        error!("POP3: can't clone socket: {}", e);
                        continue;
                    },
                };
                if let Err(e) = session.run(reader, &stream) {
                    warn!("POP3: session ended with error: {}", e);
                }
                // Socket closes when stream drops here
            },
            Err(e) if io::ErrorKind::WouldBlock == e.kind() => {
                thread::sleep(ACCEPT_POLL);
            },
            Err(e) => {
                error!("POP3: accept error: {}", e);
                thread::sleep(ACCEPT_POLL);
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    AuthorizationUser,
    AuthorizationPass,
    Transaction,
    Quit,
}

pub struct Session {
    context: SharedContext,
    state: State,
    emails: Vec<Email>,
    log: LogPrefix,
}

impl Session {
    pub fn new(context: SharedContext) -> Self {
        Session {
            context,
            state: State::AuthorizationUser,
            emails: Vec::new(),
            log: LogPrefix::new("POP3"),
        }
    }

    /// Drive one client connection to completion.
    pub fn run(
        &mut self,
        mut reader: impl BufRead,
        mut writer: impl Write,
    ) -> Result<(), Error> {
        self.state = State::AuthorizationUser;
        reply(&mut writer, &self.log, "+OK POP3 server ready\r\n")?;

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                // Client hung up without QUIT; nothing is committed
                debug!("{} connection closed by client", self.log);
                return Ok(());
            }

            let request = line.trim_end_matches(|c| c == '\r' || c == '\n');
            debug!("{} request stream: {}", self.log, request);

            self.respond(request, &mut writer)?;
            if State::Quit == self.state {
                return Ok(());
            }
        }
    }

    fn respond(
        &mut self,
        request: &str,
        writer: &mut impl Write,
    ) -> Result<(), Error> {
        let mut parts = request.split_whitespace();
        let command = parts.next().unwrap_or("").to_ascii_uppercase();
        let arg1 = parts.next();
        let arg2 = parts.next();

        match command.as_str() {
            "USER" => self.cmd_user(writer, arg1),
            "PASS" => self.cmd_pass(writer),
            "STAT" => self.cmd_stat(writer),
            "LIST" => self.cmd_list(writer, arg1),
            "RETR" => self.cmd_retr(writer, arg1),
            "DELE" => self.cmd_dele(writer, arg1),
            "NOOP" => self.in_transaction(writer, |_, w| {
                reply_line(w, "+OK")
            }),
            "RSET" => self.cmd_rset(writer),
            "QUIT" => self.cmd_quit(writer),
            "CAPA" => self.cmd_capa(writer),
            "APOP" => self.cmd_apop(writer, arg1, arg2),
            "TOP" => self.cmd_top(writer, arg1, arg2),
            "UIDL" => self.cmd_uidl(writer, arg1),
            _ => reply_line(writer, "-ERR denied"),
        }
    }

    fn in_transaction(
        &mut self,
        writer: &mut impl Write,
        f: impl FnOnce(&mut Self, &mut dyn Write) -> Result<(), Error>,
    ) -> Result<(), Error> {
        if State::Transaction != self.state {
            return reply_line(writer, "-ERR denied");
        }
        f(self, writer)
    }

    fn cmd_user(
        &mut self,
        writer: &mut impl Write,
        name: Option<&str>,
    ) -> Result<(), Error> {
        if State::AuthorizationUser != self.state {
            return reply_line(writer, "-ERR denied");
        }

        let name = name.unwrap_or("");
        if self.context.identity_by_name(name).is_some() {
            self.log.set_identity(name);
            self.state = State::AuthorizationPass;
            reply_line(writer, &format!("+OK {} is a valid mailbox", name))
        } else {
            reply_line(
                writer,
                &format!("-ERR never heard of mailbox {}", name),
            )
        }
    }

    fn cmd_pass(&mut self, writer: &mut impl Write) -> Result<(), Error> {
        if State::AuthorizationPass != self.state {
            return reply_line(writer, "-ERR denied");
        }

        // Single local user; the password is pass-through
        self.emails = worker::check_inbox(&self.context);
        self.state = State::Transaction;
        reply_line(writer, "+OK maildrop locked and ready")
    }

    fn cmd_apop(
        &mut self,
        writer: &mut impl Write,
        user: Option<&str>,
        digest: Option<&str>,
    ) -> Result<(), Error> {
        if State::AuthorizationUser != self.state {
            return reply_line(writer, "-ERR denied");
        }
        if user.is_none() || digest.is_none() {
            return reply_line(writer, "-ERR denied");
        }

        self.emails = worker::check_inbox(&self.context);
        self.state = State::Transaction;
        reply_line(writer, "+OK maildrop locked and ready")
    }

    fn live_stats(&self) -> (usize, usize) {
        let live: Vec<usize> = self
            .emails
            .iter()
            .filter(|email| !email.deleted())
            .map(|email| email.mime_bytes().len())
            .collect();
        (live.len(), live.iter().sum())
    }

    fn cmd_stat(&mut self, writer: &mut impl Write) -> Result<(), Error> {
        self.in_transaction(writer, |this, w| {
            let (count, size) = this.live_stats();
            reply_line(w, &format!("+OK {} {}", count, size))
        })
    }

    fn cmd_list(
        &mut self,
        writer: &mut impl Write,
        arg: Option<&str>,
    ) -> Result<(), Error> {
        self.in_transaction(writer, |this, w| match arg {
            Some(arg) => match this.live_message(arg) {
                Some((number, email)) => reply_line(
                    w,
                    &format!("+OK {} {}", number, email.mime_bytes().len()),
                ),
                None => reply_line(w, "-ERR no such message"),
            },
            None => {
                let (count, size) = this.live_stats();
                let mut out = format!(
                    "+OK {} messages ({} octets)\r\n",
                    count, size
                );
                for (i, email) in this.emails.iter().enumerate() {
                    if email.deleted() {
                        continue;
                    }
                    out.push_str(&format!(
                        "{} {}\r\n",
                        i + 1,
                        email.mime_bytes().len()
                    ));
                }
                out.push_str(".\r\n");
                reply(w, &this.log, &out)
            },
        })
    }

    fn cmd_retr(
        &mut self,
        writer: &mut impl Write,
        arg: Option<&str>,
    ) -> Result<(), Error> {
        self.in_transaction(writer, |this, w| {
            let (bytes, size) = match arg.and_then(|a| {
                this.live_message(a)
                    .map(|(_, email)| email.mime_bytes())
            }) {
                Some(bytes) => {
                    let size = bytes.len();
                    (bytes, size)
                },
                None => return reply_line(w, "-ERR no such message"),
            };

            let mut out = format!("+OK {} octets\r\n", size);
            out.push_str(&dot_stuff(&bytes));
            out.push_str(".\r\n");
            reply(w, &this.log, &out)
        })
    }

    fn cmd_top(
        &mut self,
        writer: &mut impl Write,
        arg: Option<&str>,
        lines: Option<&str>,
    ) -> Result<(), Error> {
        self.in_transaction(writer, |this, w| {
            let lines: usize = match lines.and_then(|l| l.parse().ok()) {
                Some(lines) => lines,
                None => return reply_line(w, "-ERR denied"),
            };
            let bytes = match arg.and_then(|a| {
                this.live_message(a)
                    .map(|(_, email)| email.mime_bytes())
            }) {
                Some(bytes) => bytes,
                None => return reply_line(w, "-ERR no such message"),
            };

            let text = String::from_utf8_lossy(&bytes);
            let mut out = String::from("+OK\r\n");
            let mut in_body = false;
            let mut body_lines = 0;
            for line in text.split_terminator('\n') {
                let line = line.trim_end_matches('\r');
                if in_body {
                    if body_lines >= lines {
                        break;
                    }
                    body_lines += 1;
                } else if line.is_empty() {
                    in_body = true;
                }

                if line.starts_with('.') {
                    out.push('.');
                }
                out.push_str(line);
                out.push_str("\r\n");
            }
            out.push_str(".\r\n");
            reply(w, &this.log, &out)
        })
    }

    fn cmd_uidl(
        &mut self,
        writer: &mut impl Write,
        arg: Option<&str>,
    ) -> Result<(), Error> {
        self.in_transaction(writer, |this, w| {
            // Message-ID is the unique identifier
            match arg {
                Some(arg) => {
                    let uid = match this.live_message_index(arg) {
                        Some(index) => this.emails[index].message_id(),
                        None => {
                            return reply_line(w, "-ERR no such message")
                        },
                    };
                    reply_line(
                        w,
                        &format!("+OK {} {}", arg.trim(), uid),
                    )
                },
                None => {
                    let mut out = String::from("+OK\r\n");
                    for i in 0..this.emails.len() {
                        if this.emails[i].deleted() {
                            continue;
                        }
                        let uid = this.emails[i].message_id();
                        out.push_str(&format!("{} {}\r\n", i + 1, uid));
                    }
                    out.push_str(".\r\n");
                    reply(w, &this.log, &out)
                },
            }
        })
    }

    fn cmd_dele(
        &mut self,
        writer: &mut impl Write,
        arg: Option<&str>,
    ) -> Result<(), Error> {
        self.in_transaction(writer, |this, w| {
            let index = match arg.and_then(|a| this.message_index(a)) {
                Some(index) => index,
                None => return reply_line(w, "-ERR no such message"),
            };

            if this.emails[index].deleted() {
                return reply_line(
                    w,
                    &format!("-ERR message {} already deleted", index + 1),
                );
            }

            this.emails[index].set_deleted(true);
            reply_line(w, &format!("+OK message {} deleted", index + 1))
        })
    }

    fn cmd_rset(&mut self, writer: &mut impl Write) -> Result<(), Error> {
        self.in_transaction(writer, |this, w| {
            for email in &mut this.emails {
                email.set_deleted(false);
            }
            let (count, size) = this.live_stats();
            reply_line(
                w,
                &format!(
                    "+OK maildrop has {} messages ({} octets)",
                    count, size
                ),
            )
        })
    }

    fn cmd_capa(&mut self, writer: &mut impl Write) -> Result<(), Error> {
        reply(
            writer,
            &self.log,
            "+OK Capability list follows\r\nUSER\r\nTOP\r\nUIDL\r\n.\r\n",
        )
    }

    fn cmd_quit(&mut self, writer: &mut impl Write) -> Result<(), Error> {
        if State::Transaction == self.state {
            // The UPDATE phase: only now do marked messages leave the disk
            for email in &self.emails {
                if !email.deleted() {
                    continue;
                }
                if let Some(path) = email.filename() {
                    match std::fs::remove_file(path) {
                        Ok(()) => {
                            info!(
                                "{} removed {}",
                                self.log,
                                path.display()
                            );
                        },
                        Err(e) => {
                            warn!(
                                "{} can't remove {}: {}",
                                self.log,
                                path.display(),
                                e
                            );
                        },
                    }
                }
            }
        }

        self.state = State::Quit;
        reply_line(writer, "+OK POP3 server signing off")
    }

    fn message_index(&self, arg: &str) -> Option<usize> {
        let number: usize = arg.trim().parse().ok()?;
        if number == 0 || number > self.emails.len() {
            return None;
        }
        Some(number - 1)
    }

    /// Index of a message that exists and is not marked deleted.
    fn live_message_index(&self, arg: &str) -> Option<usize> {
        let index = self.message_index(arg)?;
        if self.emails[index].deleted() {
            return None;
        }
        Some(index)
    }

    fn live_message(&self, arg: &str) -> Option<(usize, &Email)> {
        let index = self.live_message_index(arg)?;
        Some((index + 1, &self.emails[index]))
    }
}

fn reply(
    writer: &mut (impl Write + ?Sized),
    log: &LogPrefix,
    data: &str,
) -> Result<(), Error> {
    writer.write_all(data.as_bytes())?;
    writer.flush()?;

    debug!(
        "{} reply stream: {}",
        log,
        data.trim_end_matches(|c| c == '\r' || c == '\n')
    );
    Ok(())
}

fn reply_line(
    writer: &mut (impl Write + ?Sized),
    line: &str,
) -> Result<(), Error> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\r\n")?;
    writer.flush()?;
    Ok(())
}

/// Re-terminate every line with CRLF and double any leading dot.
fn dot_stuff(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out = String::with_capacity(text.len());

    for line in text.split_terminator('\n') {
        let line = line.trim_end_matches('\r');
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::Cursor;
    use std::sync::Arc;

    use super::*;
    use crate::address_book::AddressBook;
    use crate::context::BoteContext;
    use crate::identity::storage::IdentityStorage;
    use crate::identity::{FullIdentity, KeyType, PrivateIdentity};
    use crate::support::data_paths::DataPaths;

    fn make_context() -> (tempfile::TempDir, SharedContext) {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        paths.ensure().unwrap();

        let alice = FullIdentity {
            public_name: "alice".to_owned(),
            identity: PrivateIdentity::generate(
                KeyType::X25519Ed25519Sha512Aes256Cbc,
            )
            .unwrap(),
        };

        let context = Arc::new(BoteContext::new(
            "test".to_owned(),
            paths,
            IdentityStorage::from_identities(vec![alice]),
            AddressBook::default(),
        ));
        (dir, context)
    }

    fn seed_inbox(context: &SharedContext, n: usize) -> Vec<std::path::PathBuf> {
        let mut paths = Vec::new();
        for i in 0..n {
            let path = context
                .paths()
                .inbox
                .join(format!("mail{}.mail", i));
            fs::write(
                &path,
                format!(
                    "From: carol <carol>\r\n\
                     To: alice <alice>\r\n\
                     Subject: mail {}\r\n\
                     Message-ID: 00000000-0000-4000-8000-00000000000{}@bote.i2p\r\n\
                     \r\n\
                     body {}\r\n",
                    i, i, i
                ),
            )
            .unwrap();
            paths.push(path);
        }
        paths
    }

    fn drive(context: &SharedContext, script: &str) -> String {
        let mut session = Session::new(Arc::clone(context));
        let mut output = Vec::new();
        session
            .run(Cursor::new(script.as_bytes().to_vec()), &mut output)
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn greeting_and_auth_flow() {
        let (_dir, context) = make_context();
        seed_inbox(&context, 1);

        let output = drive(
            &context,
            "USER alice\r\nPASS x\r\nSTAT\r\nQUIT\r\n",
        );
        assert!(output.starts_with("+OK POP3 server ready\r\n"));
        assert!(output.contains("+OK alice is a valid mailbox"));
        assert!(output.contains("+OK maildrop locked and ready"));
        assert!(output.contains("+OK 1 "));
    }

    #[test]
    fn unknown_user_and_out_of_state_commands_denied() {
        let (_dir, context) = make_context();
        seed_inbox(&context, 1);

        let output = drive(
            &context,
            "USER mallory\r\nSTAT\r\nRETR 1\r\nPASS x\r\nQUIT\r\n",
        );
        assert!(output.contains("-ERR never heard of mailbox mallory"));
        // STAT, RETR and PASS all outside their state
        assert_eq!(3, output.matches("-ERR denied").count());
    }

    #[test]
    fn dele_quit_commits_deletion() {
        let (_dir, context) = make_context();
        let files = seed_inbox(&context, 2);

        let output = drive(
            &context,
            "USER alice\r\nPASS x\r\nDELE 1\r\nQUIT\r\n",
        );
        assert!(output.contains("+OK message 1 deleted"));

        assert!(!files[0].exists());
        assert!(files[1].exists());
    }

    #[test]
    fn dele_rset_preserves_files() {
        let (_dir, context) = make_context();
        let files = seed_inbox(&context, 2);

        let output = drive(
            &context,
            "USER alice\r\nPASS x\r\nDELE 1\r\nRSET\r\nRETR 1\r\nQUIT\r\n",
        );
        assert!(output.contains("+OK maildrop has 2 messages"));
        // Message 1 is retrievable again after RSET
        assert!(output.contains("body 0"));

        assert!(files[0].exists());
        assert!(files[1].exists());
    }

    #[test]
    fn session_without_quit_deletes_nothing() {
        let (_dir, context) = make_context();
        let files = seed_inbox(&context, 2);

        // Client hangs up after DELE; no UPDATE phase runs
        let output =
            drive(&context, "USER alice\r\nPASS x\r\nDELE 1\r\n");
        assert!(output.contains("+OK message 1 deleted"));
        assert!(files[0].exists());
        assert!(files[1].exists());
    }

    #[test]
    fn deleted_message_keeps_number_and_is_unaddressable() {
        let (_dir, context) = make_context();
        seed_inbox(&context, 2);

        let output = drive(
            &context,
            "USER alice\r\nPASS x\r\nDELE 1\r\nDELE 1\r\nLIST\r\nRETR 1\r\nSTAT\r\nQUIT\r\n",
        );
        assert!(output.contains("-ERR message 1 already deleted"));
        // The listing shows only message 2 under its original number
        assert!(output.contains("+OK 1 messages"));
        assert!(output.contains("\r\n2 "));
        assert!(output.contains("-ERR no such message"));
        // STAT counts the survivor only
        assert!(output.contains("+OK 1 "));
    }

    #[test]
    fn retr_dot_stuffs_body() {
        let (_dir, context) = make_context();
        let path = context.paths().inbox.join("dots.mail");
        fs::write(
            &path,
            "Subject: dots\r\n\r\n.hidden\r\nplain\r\n",
        )
        .unwrap();

        let output = drive(
            &context,
            "USER alice\r\nPASS x\r\nRETR 1\r\nQUIT\r\n",
        );
        assert!(output.contains("\r\n..hidden\r\n"));
        assert!(output.contains("\r\nplain\r\n"));
        assert!(output.contains("\r\n.\r\n"));
    }

    #[test]
    fn uidl_reports_message_ids() {
        let (_dir, context) = make_context();
        seed_inbox(&context, 1);

        let output = drive(
            &context,
            "USER alice\r\nPASS x\r\nUIDL\r\nUIDL 1\r\nQUIT\r\n",
        );
        assert!(output.contains(
            "1 00000000-0000-4000-8000-000000000000@bote.i2p"
        ));
        assert!(output.contains(
            "+OK 1 00000000-0000-4000-8000-000000000000@bote.i2p"
        ));
    }

    #[test]
    fn top_limits_body_lines() {
        let (_dir, context) = make_context();
        let path = context.paths().inbox.join("long.mail");
        fs::write(
            &path,
            "Subject: long\r\n\r\nline1\r\nline2\r\nline3\r\n",
        )
        .unwrap();

        let output = drive(
            &context,
            "USER alice\r\nPASS x\r\nTOP 1 1\r\nQUIT\r\n",
        );
        assert!(output.contains("Subject: long"));
        assert!(output.contains("line1"));
        assert!(!output.contains("line2"));
    }

    #[test]
    fn capa_works_in_any_state() {
        let (_dir, context) = make_context();
        let output = drive(&context, "CAPA\r\nQUIT\r\n");
        assert!(output.contains("+OK Capability list follows"));
        assert!(output.contains("UIDL"));
    }

    #[test]
    fn apop_authenticates_directly() {
        let (_dir, context) = make_context();
        seed_inbox(&context, 1);

        let output = drive(
            &context,
            "APOP alice 0123456789abcdef\r\nSTAT\r\nQUIT\r\n",
        );
        assert!(output.contains("+OK maildrop locked and ready"));
        assert!(output.contains("+OK 1 "));
    }

    #[test]
    fn server_binds_and_stops() {
        let (_dir, context) = make_context();
        let mut server =
            Pop3Server::new(Arc::clone(&context), "127.0.0.1".to_owned(), 0);
        server.start().unwrap();
        server.stop();
    }
}
