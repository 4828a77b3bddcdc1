//! Mailbox access: IMAP over TLS for review notifications.
//!
//! Fetching uses `BODY.PEEK[]` so reading a message never flags it; the
//! pipeline marks a message `\Seen` only after it produced an event.

use std::io::{Read, Write as IoWrite};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mail_parser::MessageParser;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::MailConfig;
use crate::error::MailError;
use crate::mail::types::RawMailMessage;

/// Source of raw notification messages.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// All messages not yet flagged `\Seen`. Must not flag them.
    async fn fetch_unseen(&self) -> Result<Vec<RawMailMessage>, MailError>;

    /// Flag the given UIDs as `\Seen`.
    async fn mark_seen(&self, uids: &[String]) -> Result<(), MailError>;
}

/// IMAP-backed mailbox. Each call opens a short-lived session.
pub struct ImapMailbox {
    config: MailConfig,
}

impl ImapMailbox {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn fetch_unseen(&self) -> Result<Vec<RawMailMessage>, MailError> {
        let cfg = self.config.clone();
        tokio::task::spawn_blocking(move || fetch_unseen_imap(&cfg))
            .await
            .map_err(|e| MailError::Protocol(format!("IMAP fetch task panicked: {e}")))?
    }

    async fn mark_seen(&self, uids: &[String]) -> Result<(), MailError> {
        if uids.is_empty() {
            return Ok(());
        }
        let cfg = self.config.clone();
        let uids = uids.to_vec();
        tokio::task::spawn_blocking(move || mark_seen_imap(&cfg, &uids))
            .await
            .map_err(|e| MailError::Protocol(format!("IMAP store task panicked: {e}")))?
    }
}

// ── IMAP session ────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Tagged lines and literal payloads of one command's response.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

impl Response {
    fn is_ok(&self) -> bool {
        self.lines
            .last()
            .is_some_and(|l| l.split_whitespace().nth(1) == Some("OK"))
    }
}

struct ImapSession {
    tls: TlsStream,
    tag_counter: u32,
}

fn io_error(e: std::io::Error) -> MailError {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            MailError::Timeout(e.to_string())
        }
        _ => MailError::Connect(e.to_string()),
    }
}

impl ImapSession {
    /// Connect, negotiate TLS, log in and select the configured mailbox.
    fn open(config: &MailConfig) -> Result<Self, MailError> {
        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port)).map_err(io_error)?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))
            .map_err(io_error)?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| MailError::Connect(format!("invalid IMAP host name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailError::Connect(format!("TLS setup failed: {e}")))?;

        let mut session = Self {
            tls: rustls::StreamOwned::new(conn, tcp),
            tag_counter: 0,
        };

        let _greeting = session.read_line()?;

        let login = session.command(&format!(
            "LOGIN \"{}\" \"{}\"",
            config.username,
            config.password.expose_secret()
        ))?;
        if !login.is_ok() {
            return Err(MailError::AuthFailed {
                username: config.username.clone(),
            });
        }

        let select = session.command(&format!("SELECT \"{}\"", config.mailbox))?;
        if !select.is_ok() {
            return Err(MailError::Protocol(format!(
                "SELECT {} rejected",
                config.mailbox
            )));
        }

        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => return Err(MailError::Connect("IMAP connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(io_error(e)),
            }
        }
    }

    /// Send one tagged command and collect its full response, including
    /// `{n}` literals.
    fn command(&mut self, cmd: &str) -> Result<Response, MailError> {
        self.tag_counter += 1;
        let tag = format!("A{}", self.tag_counter);
        let full = format!("{tag} {cmd}\r\n");
        self.tls.write_all(full.as_bytes()).map_err(io_error)?;
        self.tls.flush().map_err(io_error)?;

        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_length(&line) {
                let mut literal = vec![0u8; len];
                self.tls.read_exact(&mut literal).map_err(io_error)?;
                response.literals.push(literal);
            }
            let done = line.starts_with(&format!("{tag} "));
            response.lines.push(line);
            if done {
                return Ok(response);
            }
        }
    }

    fn logout(mut self) {
        // Best effort; the server closes the session either way.
        let _ = self.command("LOGOUT");
    }
}

/// Length of a trailing `{n}` literal marker, if the line ends with one.
fn literal_length(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches("\r\n");
    let body = trimmed.strip_suffix('}')?;
    let open = body.rfind('{')?;
    body[open + 1..].parse().ok()
}

/// UIDs from `* SEARCH` lines.
fn parse_search_uids(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|l| l.starts_with("* SEARCH"))
        .flat_map(|l| l.split_whitespace().skip(2).map(str::to_string))
        .collect()
}

/// Decode an RFC 822 message into sender and HTML body.
pub fn decode_message(uid: &str, raw: &[u8]) -> Option<RawMailMessage> {
    let parsed = MessageParser::default().parse(raw)?;
    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())?;
    let html = parsed.body_html(0).map(|h| h.to_string()).unwrap_or_default();
    Some(RawMailMessage {
        sender,
        html,
        uid: uid.to_string(),
    })
}

/// Fetch unseen messages without flagging them (blocking, run in spawn_blocking).
fn fetch_unseen_imap(config: &MailConfig) -> Result<Vec<RawMailMessage>, MailError> {
    let mut session = ImapSession::open(config)?;

    let search = session.command("UID SEARCH UNSEEN")?;
    let uids = parse_search_uids(&search.lines);

    let mut messages = Vec::new();
    for uid in &uids {
        let fetch = session.command(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
        match fetch.literals.first().and_then(|raw| decode_message(uid, raw)) {
            Some(message) => messages.push(message),
            None => debug!(uid = %uid, "Skipping undecodable message"),
        }
    }

    session.logout();
    Ok(messages)
}

fn mark_seen_imap(config: &MailConfig, uids: &[String]) -> Result<(), MailError> {
    let mut session = ImapSession::open(config)?;
    for uid in uids {
        let store = session.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
        if !store.is_ok() {
            return Err(MailError::MarkSeen {
                uid: uid.clone(),
                reason: store.lines.last().cloned().unwrap_or_default(),
            });
        }
    }
    session.logout();
    Ok(())
}
