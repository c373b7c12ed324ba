//! One mailbox ingestion run:
//! `Idle → Connecting → Authenticating → Listing → ProcessingMessage(i) → Idle`.
//!
//! Connection and authentication faults end the run. Anything that goes wrong
//! with a single message or attachment is logged and the run moves on; stale
//! message identifiers send the run back to `Listing`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

use crate::classify::AttachmentClassifier;
use crate::directory::Directory;
use crate::mail::{IngestError, MailSession, MailSource, MessageSummary};
use crate::models::LabSubmission;

/// Re-lists allowed per run before stale identifiers count as a protocol failure.
const MAX_RELISTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Idle,
    Connecting,
    Authenticating,
    Listing,
    ProcessingMessage(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerSource {
    Timer,
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Size of the first listing; re-lists do not change it.
    pub listed: usize,
    pub matched: usize,
    pub attachments_stored: usize,
    pub submissions_created: usize,
    pub duplicates: usize,
    pub attachment_failures: usize,
    pub message_failures: usize,
    pub relists: usize,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Another run held the guard; nothing was done.
    AlreadyRunning,
    Completed(RunReport),
    Failed(IngestError),
}

/// Held for the lifetime of a run. Dropping it, by completion, error, panic or
/// cancellation, clears the flag and returns the phase to `Idle`.
struct InFlight {
    flag: Arc<AtomicBool>,
    phase: Arc<watch::Sender<RunPhase>>,
}

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>, phase: &Arc<watch::Sender<RunPhase>>) -> Option<InFlight> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                flag: flag.clone(),
                phase: phase.clone(),
            })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let _ = self.phase.send(RunPhase::Idle);
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct MailIngestionService {
    source: Arc<dyn MailSource>,
    directory: Directory,
    classifier: AttachmentClassifier,
    in_flight: Arc<AtomicBool>,
    phase: Arc<watch::Sender<RunPhase>>,
    phase_rx: watch::Receiver<RunPhase>,
}

impl MailIngestionService {
    pub fn new(source: Arc<dyn MailSource>, directory: Directory, classifier: AttachmentClassifier) -> Self {
        let (phase, phase_rx) = watch::channel(RunPhase::Idle);
        Self {
            source,
            directory,
            classifier,
            in_flight: Arc::new(AtomicBool::new(false)),
            phase: Arc::new(phase),
            phase_rx,
        }
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn enter(&self, phase: RunPhase) {
        log::debug!("mail check phase: {:?}", phase);
        let _ = self.phase.send(phase);
    }

    /// Single-flight entry point shared by the timer and manual triggers.
    pub async fn check_mail(&self, trigger: TriggerSource) -> RunOutcome {
        let _guard = match InFlight::acquire(&self.in_flight, &self.phase) {
            Some(guard) => guard,
            None => {
                log::debug!("mail check ({:?}) skipped, a run is already in progress", trigger);
                return RunOutcome::AlreadyRunning;
            }
        };

        log::info!("mail check started ({:?})", trigger);
        match self.run().await {
            Ok(report) => {
                log::info!(
                    "mail check finished: {} listed, {} from students, {} new submissions, {} failed messages",
                    report.listed,
                    report.matched,
                    report.submissions_created,
                    report.message_failures
                );
                let purged = self.directory.purge_orphan_submissions().await;
                if report.submissions_created > 0 || purged > 0 {
                    if let Err(err) = self.directory.save().await {
                        log::error!("could not save diary after mail check: {:#}", err);
                    }
                }
                RunOutcome::Completed(report)
            }
            Err(err) => {
                log::error!("mail check failed: {}", err);
                RunOutcome::Failed(err)
            }
        }
    }

    async fn run(&self) -> Result<RunReport, IngestError> {
        self.enter(RunPhase::Connecting);
        let connection = self.source.connect().await?;
        self.enter(RunPhase::Authenticating);
        let mut session = connection.authenticate().await?;

        let result = self.process_inbox(session.as_mut()).await;
        session.logout().await;
        result
    }

    async fn relist(&self, session: &mut dyn MailSession) -> Result<Vec<MessageSummary>, IngestError> {
        self.enter(RunPhase::Listing);
        session.open_inbox().await?;
        session.list().await
    }

    async fn process_inbox(&self, session: &mut dyn MailSession) -> Result<RunReport, IngestError> {
        let mut report = RunReport::default();
        let queue = self.relist(session).await?;
        report.listed = queue.len();

        let mut processed = 0;
        let mut pending = VecDeque::from(queue);
        while let Some(summary) = pending.pop_front() {
            self.enter(RunPhase::ProcessingMessage(processed));
            processed += 1;

            match self.process_message(session, &summary, &mut report).await {
                Ok(()) => {}
                Err(IngestError::StaleIdentifiers(reason)) => {
                    report.message_failures += 1;
                    if report.relists >= MAX_RELISTS {
                        return Err(IngestError::Protocol(format!(
                            "identifiers still stale after {} re-lists: {}",
                            MAX_RELISTS, reason
                        )));
                    }
                    log::warn!("message {} has a stale identifier ({}), re-listing", summary.uid, reason);
                    report.relists += 1;
                    // Positions shift after an expunge; UIDs only grow, so resume after this one.
                    pending = self
                        .relist(session)
                        .await?
                        .into_iter()
                        .filter(|next| next.uid > summary.uid)
                        .collect();
                }
                Err(err) if err.is_run_fatal() => return Err(err),
                Err(err) => {
                    report.message_failures += 1;
                    log::warn!("skipping message {}: {}", summary.uid, err);
                }
            }
        }
        Ok(report)
    }

    async fn process_message(
        &self,
        session: &mut dyn MailSession,
        summary: &MessageSummary,
        report: &mut RunReport,
    ) -> Result<(), IngestError> {
        let sender = match summary.from.as_deref() {
            Some(sender) => sender,
            None => return Ok(()),
        };
        let student_id = match self.directory.resolve_sender(sender).await {
            Some(id) => id,
            None => {
                log::debug!("message {} from {} has no bound student", summary.uid, sender);
                return Ok(());
            }
        };
        report.matched += 1;

        let message = session.fetch(summary.uid).await?;
        let subject = message.subject.clone().or_else(|| summary.subject.clone());

        for attachment in &message.attachments {
            let stored = match self
                .classifier
                .store(&attachment.file_name, &attachment.content)
                .await
            {
                Ok(Some(stored)) => stored,
                Ok(None) => {
                    log::debug!("attachment `{}` is not coursework", attachment.file_name);
                    continue;
                }
                Err(err) => {
                    report.attachment_failures += 1;
                    log::warn!("attachment `{}` of message {}: {}", attachment.file_name, summary.uid, err);
                    continue;
                }
            };
            report.attachments_stored += 1;

            let submission = LabSubmission {
                student_id,
                title: subject
                    .clone()
                    .unwrap_or_else(|| stored.classification.canonical_name()),
                content: message.text_body.clone(),
                received_at: Utc::now(),
                file_path: Some(stored.path),
                message_id: message.message_id.clone(),
            };
            match self.directory.record_submission(submission).await {
                Some(_) => report.submissions_created += 1,
                None => report.duplicates += 1,
            }
        }
        Ok(())
    }
}
