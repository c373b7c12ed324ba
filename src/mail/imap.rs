//! IMAP over implicit TLS. The `imap` crate is blocking, so every protocol
//! step hops onto the blocking pool and hands the session back when done.

use std::net::TcpStream;

use async_trait::async_trait;
use native_tls::{TlsConnector, TlsStream};

use super::{
    parse_message, FetchedMessage, IngestError, MailConnection, MailSession, MailSource,
    MessageSummary,
};
use crate::config::MailConfig;

type Client = ::imap::Client<TlsStream<TcpStream>>;
type Session = ::imap::Session<TlsStream<TcpStream>>;

const INBOX: &str = "INBOX";

#[derive(Debug, Clone)]
pub struct ImapSource {
    config: MailConfig,
}

impl ImapSource {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailSource for ImapSource {
    async fn connect(&self) -> Result<Box<dyn MailConnection>, IngestError> {
        let host = self.config.host.clone();
        let port = self.config.port;
        let client = tokio::task::spawn_blocking(move || -> Result<Client, IngestError> {
            let connection_error = |reason: String| IngestError::Connection {
                host: format!("{}:{}", host, port),
                reason,
            };
            let tls = TlsConnector::new().map_err(|err| connection_error(err.to_string()))?;
            ::imap::connect((host.as_str(), port), host.as_str(), &tls)
                .map_err(|err| connection_error(err.to_string()))
        })
        .await??;

        Ok(Box::new(ImapConnection {
            client,
            config: self.config.clone(),
        }))
    }
}

struct ImapConnection {
    client: Client,
    config: MailConfig,
}

#[async_trait]
impl MailConnection for ImapConnection {
    async fn authenticate(self: Box<Self>) -> Result<Box<dyn MailSession>, IngestError> {
        let ImapConnection { client, config } = *self;
        let session = tokio::task::spawn_blocking(move || {
            client
                .login(&config.username, &config.password)
                .map_err(|(err, _client)| IngestError::Authentication {
                    user: config.username.clone(),
                    reason: err.to_string(),
                })
        })
        .await??;

        Ok(Box::new(ImapSession {
            session: Some(session),
            exists: 0,
        }))
    }
}

struct ImapSession {
    session: Option<Session>,
    exists: u32,
}

impl ImapSession {
    async fn with_session<T, F>(&mut self, op: F) -> Result<T, IngestError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> Result<T, IngestError> + Send + 'static,
    {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| IngestError::Protocol("session already closed".to_string()))?;
        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut session);
            (session, result)
        })
        .await?;
        self.session = Some(session);
        result
    }
}

fn command_error(err: ::imap::error::Error) -> IngestError {
    match err {
        ::imap::error::Error::No(ref text) | ::imap::error::Error::Bad(ref text)
            if text.to_lowercase().contains("uid") =>
        {
            IngestError::StaleIdentifiers(text.clone())
        }
        other => IngestError::Protocol(other.to_string()),
    }
}

fn decode_header(name: &str, raw: &[u8]) -> Option<String> {
    let mut line = format!("{}: ", name).into_bytes();
    line.extend_from_slice(raw);
    mailparse::parse_header(&line)
        .ok()
        .map(|(header, _)| header.get_value())
        .filter(|value| !value.is_empty())
}

fn format_address(mailbox: Option<&[u8]>, host: Option<&[u8]>) -> Option<String> {
    match (mailbox, host) {
        (Some(mailbox), Some(host)) if !mailbox.is_empty() && !host.is_empty() => Some(format!(
            "{}@{}",
            String::from_utf8_lossy(mailbox),
            String::from_utf8_lossy(host)
        )),
        _ => None,
    }
}

fn summarize(fetch: &::imap::types::Fetch) -> Option<MessageSummary> {
    let uid = fetch.uid?;
    let envelope = fetch.envelope();
    let from = envelope
        .and_then(|env| env.from.as_ref())
        .and_then(|addresses| addresses.first())
        .and_then(|address| format_address(address.mailbox, address.host));
    let subject = envelope
        .and_then(|env| env.subject)
        .and_then(|raw| decode_header("Subject", raw));
    Some(MessageSummary { uid, from, subject })
}

#[async_trait]
impl MailSession for ImapSession {
    async fn open_inbox(&mut self) -> Result<(), IngestError> {
        let exists = self
            .with_session(|session| {
                session.examine(INBOX).map(|mailbox| mailbox.exists).map_err(command_error)
            })
            .await?;
        self.exists = exists;
        Ok(())
    }

    async fn list(&mut self) -> Result<Vec<MessageSummary>, IngestError> {
        if self.exists == 0 {
            return Ok(Vec::new());
        }
        self.with_session(|session| {
            let fetches = session
                .uid_fetch("1:*", "(UID ENVELOPE)")
                .map_err(command_error)?;
            Ok(fetches.iter().filter_map(summarize).collect())
        })
        .await
    }

    async fn fetch(&mut self, uid: u32) -> Result<FetchedMessage, IngestError> {
        let raw = self
            .with_session(move |session| {
                let fetches = session
                    .uid_fetch(uid.to_string(), "BODY.PEEK[]")
                    .map_err(command_error)?;
                let body = fetches
                    .iter()
                    .find(|fetch| fetch.uid == Some(uid))
                    .and_then(|fetch| fetch.body())
                    .map(|body| body.to_vec());
                body.ok_or_else(|| {
                    IngestError::StaleIdentifiers(format!("no message with UID {} in inbox", uid))
                })
            })
            .await?;
        parse_message(uid, &raw)
    }

    async fn logout(self: Box<Self>) {
        let ImapSession { session, .. } = *self;
        if let Some(mut session) = session {
            let _ = tokio::task::spawn_blocking(move || {
                if let Err(err) = session.logout() {
                    log::debug!("imap logout failed: {}", err);
                }
            })
            .await;
        }
    }
}
