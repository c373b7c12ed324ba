#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Weekday;

use opendiary_attendance::mail::{
    Attachment, FetchedMessage, MailConnection, MailSession, MailSource, MessageSummary,
};
use opendiary_attendance::models::{Group, GroupId, ScheduleDay, Student, StudentId};
use opendiary_attendance::{IngestError, Roster};

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub uid: u32,
    pub from: String,
    pub subject: String,
    pub message_id: String,
    pub attachments: Vec<(String, Vec<u8>)>,
}

impl FakeMessage {
    pub fn new(uid: u32, from: &str, attachments: &[(&str, &[u8])]) -> Self {
        Self {
            uid,
            from: from.to_string(),
            subject: format!("Работа от {}", from),
            message_id: format!("<{}@mail.test>", uid),
            attachments: attachments
                .iter()
                .map(|(name, bytes)| (name.to_string(), bytes.to_vec()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Connect,
    Authenticate,
}

#[derive(Default)]
struct Inner {
    messages: Vec<FakeMessage>,
    failure: Option<Failure>,
    connect_delay: Duration,
    stale_once: Mutex<HashSet<u32>>,
    broken: HashSet<u32>,
    always_stale: Mutex<HashSet<u32>>,
    expunged: Mutex<HashSet<u32>>,
    connects: AtomicUsize,
    lists: AtomicUsize,
    fetched: Mutex<Vec<u32>>,
}

/// In-memory mailbox counting sessions, listings and fetches.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    inner: Arc<Inner>,
}

impl FakeMailbox {
    pub fn new(messages: Vec<FakeMessage>) -> Self {
        Self::build(messages, None, Duration::ZERO, &[], &[])
    }

    pub fn build(
        messages: Vec<FakeMessage>,
        failure: Option<Failure>,
        connect_delay: Duration,
        stale_once: &[u32],
        broken: &[u32],
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                messages,
                failure,
                connect_delay,
                stale_once: Mutex::new(stale_once.iter().copied().collect()),
                broken: broken.iter().copied().collect(),
                ..Inner::default()
            }),
        }
    }

    /// Every fetch of these UIDs reports a stale identifier.
    pub fn always_stale(&self, uids: &[u32]) {
        self.inner.always_stale.lock().unwrap().extend(uids);
    }

    /// These UIDs vanish from every listing after the first one.
    pub fn expunge_after_first_list(&self, uids: &[u32]) {
        self.inner.expunged.lock().unwrap().extend(uids);
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.inner.lists.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<u32> {
        self.inner.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSource for FakeMailbox {
    async fn connect(&self) -> Result<Box<dyn MailConnection>, IngestError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if !self.inner.connect_delay.is_zero() {
            tokio::time::sleep(self.inner.connect_delay).await;
        }
        if self.inner.failure == Some(Failure::Connect) {
            return Err(IngestError::Connection {
                host: "imap.test:993".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl MailConnection for FakeMailbox {
    async fn authenticate(self: Box<Self>) -> Result<Box<dyn MailSession>, IngestError> {
        if self.inner.failure == Some(Failure::Authenticate) {
            return Err(IngestError::Authentication {
                user: "teacher@mail.test".to_string(),
                reason: "invalid credentials".to_string(),
            });
        }
        Ok(self)
    }
}

#[async_trait]
impl MailSession for FakeMailbox {
    async fn open_inbox(&mut self) -> Result<(), IngestError> {
        Ok(())
    }

    async fn list(&mut self) -> Result<Vec<MessageSummary>, IngestError> {
        let earlier = self.inner.lists.fetch_add(1, Ordering::SeqCst);
        let expunged = if earlier > 0 {
            self.inner.expunged.lock().unwrap().clone()
        } else {
            HashSet::new()
        };
        Ok(self
            .inner
            .messages
            .iter()
            .filter(|m| !expunged.contains(&m.uid))
            .map(|m| MessageSummary {
                uid: m.uid,
                from: Some(m.from.clone()),
                subject: Some(m.subject.clone()),
            })
            .collect())
    }

    async fn fetch(&mut self, uid: u32) -> Result<FetchedMessage, IngestError> {
        self.inner.fetched.lock().unwrap().push(uid);
        if self.inner.stale_once.lock().unwrap().remove(&uid) {
            return Err(IngestError::StaleIdentifiers(format!("UID {} is invalid", uid)));
        }
        if self.inner.always_stale.lock().unwrap().contains(&uid) {
            return Err(IngestError::StaleIdentifiers(format!("UID {} keeps going stale", uid)));
        }
        if self.inner.broken.contains(&uid) {
            return Err(IngestError::Protocol("connection hiccup".to_string()));
        }
        let message = self
            .inner
            .messages
            .iter()
            .find(|m| m.uid == uid)
            .ok_or_else(|| IngestError::StaleIdentifiers(format!("no UID {}", uid)))?;
        Ok(FetchedMessage {
            uid,
            message_id: Some(message.message_id.clone()),
            subject: Some(message.subject.clone()),
            text_body: Some("см. вложение".to_string()),
            attachments: message
                .attachments
                .iter()
                .map(|(name, bytes)| Attachment {
                    file_name: name.clone(),
                    content: bytes.clone(),
                })
                .collect(),
        })
    }

    async fn logout(self: Box<Self>) {}
}

pub struct Fixture {
    pub roster: Roster,
    pub group_id: GroupId,
    pub student_id: StudentId,
}

/// One group with a 3-pair numerator Monday, one student bound to
/// `ivanov@mail.test`.
pub fn fixture() -> Fixture {
    let mut roster = Roster::default();
    let mut group = Group::new("ИВТ-21");
    group.numerator.push(ScheduleDay::new(Weekday::Mon, 3));
    group.denominator.push(ScheduleDay::new(Weekday::Tue, 2));
    let group_id = roster.insert_group(group);
    let student_id = roster
        .insert_student(Student::new("Иванов Иван", group_id))
        .unwrap();
    roster.bind_email("Ivanov@Mail.test", student_id).unwrap();
    Fixture {
        roster,
        group_id,
        student_id,
    }
}
