//! Recognizes coursework attachments by file name and stores them under a
//! canonical, never-overwriting name.

use std::fmt;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::Serialize;

use crate::io::{create_io_file, write_all_to};
use crate::mail::IngestError;

const MAX_SUFFIX_ATTEMPTS: usize = 8;

lazy_static! {
    static ref LAB_PATTERN: Regex =
        Regex::new(r"(?i)лабораторная\s+работа\s*№?\s*(\d+)").expect("lab pattern compiles");
    static ref PRACTICAL_PATTERN: Regex =
        Regex::new(r"(?i)практическая\s+работа\s*№?\s*(\d+)").expect("practical pattern compiles");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkKind {
    Laboratory,
    Practical,
}

impl WorkKind {
    pub fn label(self) -> &'static str {
        match self {
            WorkKind::Laboratory => "Лабораторная работа",
            WorkKind::Practical => "Практическая работа",
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: WorkKind,
    pub number: u32,
    extension: String,
}

impl Classification {
    /// `"<kind> <N><.ext>"`
    pub fn canonical_name(&self) -> String {
        format!("{} {}{}", self.kind, self.number, self.extension)
    }

    fn suffixed_name(&self, suffix: &str) -> String {
        format!("{} {}_{}{}", self.kind, self.number, suffix, self.extension)
    }
}

#[derive(Debug, Clone)]
pub struct StoredAttachment {
    pub classification: Classification,
    pub path: PathBuf,
}

/// Strips any directory components a mail client left in the attachment name.
pub fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name)
        .trim()
}

pub fn classify(file_name: &str) -> Option<Classification> {
    let name = base_name(file_name);
    let (kind, captures) = if let Some(captures) = LAB_PATTERN.captures(name) {
        (WorkKind::Laboratory, captures)
    } else {
        (WorkKind::Practical, PRACTICAL_PATTERN.captures(name)?)
    };

    let number = captures.get(1)?.as_str().parse::<u32>().ok()?;
    if number == 0 {
        return None;
    }

    let extension = Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    Some(Classification {
        kind,
        number,
        extension,
    })
}

fn random_suffix() -> String {
    format!("{:04x}", rand::thread_rng().gen::<u16>())
}

#[derive(Debug, Clone)]
pub struct AttachmentClassifier {
    target_dir: PathBuf,
}

impl AttachmentClassifier {
    pub fn new<P: Into<PathBuf>>(target_dir: P) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }

    /// Classifies the attachment and writes it out. `Ok(None)` means the name is
    /// not coursework and nothing was written.
    pub async fn store(
        &self,
        file_name: &str,
        content: &[u8],
    ) -> Result<Option<StoredAttachment>, IngestError> {
        let classification = match classify(file_name) {
            Some(c) => c,
            None => return Ok(None),
        };

        let mut candidate = self.target_dir.join(classification.canonical_name());
        for _ in 0..=MAX_SUFFIX_ATTEMPTS {
            let created = create_io_file(&candidate)
                .await
                .map_err(|source| IngestError::AttachmentWrite {
                    path: candidate.clone(),
                    source,
                })?;

            if let Some(file) = created {
                if let Err(source) = write_all_to(file, content).await {
                    let _ = tokio::fs::remove_file(&candidate).await;
                    return Err(IngestError::AttachmentWrite {
                        path: candidate,
                        source,
                    });
                }
                log::debug!("stored attachment `{}` as {}", file_name, candidate.display());
                return Ok(Some(StoredAttachment {
                    classification,
                    path: candidate,
                }));
            }

            candidate = self
                .target_dir
                .join(classification.suffixed_name(&random_suffix()));
        }

        Err(IngestError::AttachmentWrite {
            path: candidate,
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free file name left for attachment",
            ),
        })
    }
}
