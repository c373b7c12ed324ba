//! Mailbox access split into the phases an ingestion run walks through:
//! connect, authenticate, open the inbox read-only, list summaries, fetch bodies.

mod error;
pub mod imap;

use async_trait::async_trait;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

pub use self::error::IngestError;

/// Lightweight per-message metadata from the listing phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub uid: u32,
    pub from: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct FetchedMessage {
    pub uid: u32,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub text_body: Option<String>,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait MailSource: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn MailConnection>, IngestError>;
}

#[async_trait]
pub trait MailConnection: Send {
    async fn authenticate(self: Box<Self>) -> Result<Box<dyn MailSession>, IngestError>;
}

#[async_trait]
pub trait MailSession: Send {
    /// (Re)opens the inbox without write access.
    async fn open_inbox(&mut self) -> Result<(), IngestError>;
    async fn list(&mut self) -> Result<Vec<MessageSummary>, IngestError>;
    async fn fetch(&mut self, uid: u32) -> Result<FetchedMessage, IngestError>;
    async fn logout(self: Box<Self>);
}

/// Parses a raw RFC 822 message into the parts ingestion cares about.
pub fn parse_message(uid: u32, raw: &[u8]) -> Result<FetchedMessage, IngestError> {
    let parsed = mailparse::parse_mail(raw).map_err(|err| IngestError::Parse {
        uid,
        reason: err.to_string(),
    })?;

    let mut message = FetchedMessage {
        uid,
        message_id: parsed
            .headers
            .get_first_value("Message-ID")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
        subject: parsed.headers.get_first_value("Subject"),
        ..FetchedMessage::default()
    };
    collect_parts(uid, &parsed, &mut message)?;
    Ok(message)
}

fn collect_parts(uid: u32, part: &ParsedMail<'_>, out: &mut FetchedMessage) -> Result<(), IngestError> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(uid, sub, out)?;
        }
        return Ok(());
    }

    let disposition = part.get_content_disposition();
    let file_name = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();

    match file_name {
        Some(file_name) => {
            let content = part.get_body_raw().map_err(|err| IngestError::Parse {
                uid,
                reason: err.to_string(),
            })?;
            out.attachments.push(Attachment { file_name, content });
        }
        None if disposition.disposition != DispositionType::Attachment
            && part.ctype.mimetype == "text/plain"
            && out.text_body.is_none() =>
        {
            out.text_body = part.get_body().ok().map(|body| body.trim().to_string());
        }
        None => {}
    }
    Ok(())
}
