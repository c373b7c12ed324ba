use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not connect to {host}: {reason}")]
    Connection { host: String, reason: String },
    #[error("authentication failed for {user}: {reason}")]
    Authentication { user: String, reason: String },
    #[error("message identifiers went stale: {0}")]
    StaleIdentifiers(String),
    #[error("mail protocol error: {0}")]
    Protocol(String),
    #[error("could not parse message {uid}: {reason}")]
    Parse { uid: u32, reason: String },
    #[error("could not write attachment to {}: {source}", path.display())]
    AttachmentWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mail worker failed: {0}")]
    Worker(String),
}

impl IngestError {
    /// Faults that end the whole run rather than a single message.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Connection { .. } | IngestError::Authentication { .. } | IngestError::Worker(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Connection { .. } => "ConnectionError",
            IngestError::Authentication { .. } => "AuthenticationError",
            IngestError::StaleIdentifiers(_) => "ProtocolFault",
            IngestError::Protocol(_) => "ProtocolError",
            IngestError::Parse { .. } => "ParseError",
            IngestError::AttachmentWrite { .. } => "AttachmentWriteError",
            IngestError::Worker(_) => "WorkerError",
        }
    }
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Worker(err.to_string())
    }
}
