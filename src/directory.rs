//! The roster document and its single owner.
//!
//! Every structural change to groups, students, attendance records or
//! submissions goes through [`Directory`], which serializes them behind one
//! lock and announces them on a broadcast channel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

use crate::attendance;
use crate::models::{
    AttendanceRecord, EmailMapping, Group, GroupId, LabSubmission, Student, StudentId,
};
use crate::schedule::{ScheduleCalendar, WeekParity};
use crate::store::Store;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    AttendanceRecordAdded { student_id: StudentId, date: NaiveDate },
    AttendanceMarked { student_id: StudentId, date: NaiveDate, slot: usize, present: bool },
    SubmissionAdded { student_id: StudentId, file_path: Option<PathBuf> },
    SubmissionsPurged { count: usize },
    EmailMappingAdded { email: String, student_id: StudentId },
    EmailMappingsPurged { count: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("group {0} does not exist")]
    UnknownGroup(GroupId),
    #[error("student {0} does not exist")]
    UnknownStudent(StudentId),
    #[error("email `{0}` is already bound")]
    EmailTaken(String),
    #[error("email address must not be empty")]
    EmptyEmail,
    #[error("no attendance record for {student_id} on {date}")]
    NoRecord { student_id: StudentId, date: NaiveDate },
    #[error("slot {slot} is outside the {len} pairs recorded for {date}")]
    SlotOutOfRange { slot: usize, len: usize, date: NaiveDate },
}

/// The persisted document plus id indexes rebuilt by [`Roster::relink`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    students: Vec<Student>,
    #[serde(default)]
    email_mappings: Vec<EmailMapping>,
    #[serde(default)]
    submissions: Vec<LabSubmission>,
    #[serde(skip)]
    group_index: HashMap<GroupId, usize>,
    #[serde(skip)]
    student_index: HashMap<StudentId, usize>,
}

impl Roster {
    /// Rebuilds the id indexes and drops email bindings whose student is gone.
    /// Returns the number of purged bindings.
    pub fn relink(&mut self) -> usize {
        self.group_index = self
            .groups
            .iter()
            .enumerate()
            .map(|(index, group)| (group.id, index))
            .collect();
        self.student_index = self
            .students
            .iter()
            .enumerate()
            .map(|(index, student)| (student.id, index))
            .collect();

        let before = self.email_mappings.len();
        let students = &self.student_index;
        self.email_mappings
            .retain(|mapping| students.contains_key(&mapping.student_id));
        let purged = before - self.email_mappings.len();
        if purged > 0 {
            log::info!("dropped {} email bindings of removed students", purged);
        }
        purged
    }

    pub fn insert_group(&mut self, group: Group) -> GroupId {
        let id = group.id;
        self.group_index.insert(id, self.groups.len());
        self.groups.push(group);
        id
    }

    pub fn insert_student(&mut self, student: Student) -> Result<StudentId, DirectoryError> {
        if !self.group_index.contains_key(&student.group_id) {
            return Err(DirectoryError::UnknownGroup(student.group_id));
        }
        let id = student.id;
        self.student_index.insert(id, self.students.len());
        self.students.push(student);
        Ok(id)
    }

    pub fn bind_email(&mut self, email: &str, student_id: StudentId) -> Result<(), DirectoryError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(DirectoryError::EmptyEmail);
        }
        if !self.student_index.contains_key(&student_id) {
            return Err(DirectoryError::UnknownStudent(student_id));
        }
        if self.email_mappings.iter().any(|m| m.matches(email)) {
            return Err(DirectoryError::EmailTaken(email.to_string()));
        }
        self.email_mappings.push(EmailMapping {
            email: email.to_string(),
            student_id,
        });
        Ok(())
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.group_index.get(&id).and_then(|&index| self.groups.get(index))
    }

    pub fn student(&self, id: StudentId) -> Option<&Student> {
        self.student_index.get(&id).and_then(|&index| self.students.get(index))
    }

    fn student_mut(&mut self, id: StudentId) -> Option<&mut Student> {
        let index = *self.student_index.get(&id)?;
        self.students.get_mut(index)
    }

    pub fn group_of(&self, student: &Student) -> Option<&Group> {
        self.group(student.group_id)
    }

    pub fn students_in(&self, group_id: GroupId) -> impl Iterator<Item = &Student> {
        self.students.iter().filter(move |s| s.group_id == group_id)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn email_mappings(&self) -> &[EmailMapping] {
        &self.email_mappings
    }

    pub fn submissions(&self) -> &[LabSubmission] {
        &self.submissions
    }

    /// Case-insensitive exact match; bindings to missing students never resolve.
    pub fn resolve_sender(&self, address: &str) -> Option<StudentId> {
        self.email_mappings
            .iter()
            .find(|mapping| mapping.matches(address))
            .map(|mapping| mapping.student_id)
            .filter(|id| self.student_index.contains_key(id))
    }

    pub fn has_submission_at(&self, path: &std::path::Path) -> bool {
        self.submissions
            .iter()
            .any(|s| s.file_path.as_deref() == Some(path))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRow {
    pub student_id: StudentId,
    pub name: String,
    pub marks: Vec<bool>,
    pub attended_total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceSheet {
    pub group_id: GroupId,
    pub date: NaiveDate,
    pub parity: WeekParity,
    pub pairs: u32,
    pub rows: Vec<AttendanceRow>,
}

#[derive(Clone)]
pub struct Directory {
    roster: Arc<Mutex<Roster>>,
    events: broadcast::Sender<ChangeEvent>,
    calendar: ScheduleCalendar,
    store: Option<Store>,
}

impl Directory {
    pub fn new(mut roster: Roster, calendar: ScheduleCalendar) -> Self {
        roster.relink();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            roster: Arc::new(Mutex::new(roster)),
            events,
            calendar,
            store: None,
        }
    }

    pub fn with_store(roster: Roster, calendar: ScheduleCalendar, store: Store) -> Self {
        Self {
            store: Some(store),
            ..Self::new(roster, calendar)
        }
    }

    pub fn calendar(&self) -> &ScheduleCalendar {
        &self.calendar
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: ChangeEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    pub async fn snapshot(&self) -> Roster {
        self.roster.lock().await.clone()
    }

    pub async fn resolve_sender(&self, address: &str) -> Option<StudentId> {
        self.roster.lock().await.resolve_sender(address)
    }

    pub async fn bind_email(&self, email: &str, student_id: StudentId) -> Result<(), DirectoryError> {
        self.roster.lock().await.bind_email(email, student_id)?;
        self.publish(ChangeEvent::EmailMappingAdded {
            email: email.trim().to_string(),
            student_id,
        });
        Ok(())
    }

    /// Appends the submission unless one with the same file path exists.
    /// Check and append happen under one lock.
    pub async fn record_submission(&self, submission: LabSubmission) -> Option<LabSubmission> {
        let mut roster = self.roster.lock().await;
        if let Some(path) = submission.file_path.as_deref() {
            if roster.has_submission_at(path) {
                log::debug!("submission for {} already recorded", path.display());
                return None;
            }
        }
        roster.submissions.push(submission.clone());
        drop(roster);

        self.publish(ChangeEvent::SubmissionAdded {
            student_id: submission.student_id,
            file_path: submission.file_path.clone(),
        });
        Some(submission)
    }

    pub async fn submissions(&self) -> Vec<LabSubmission> {
        self.roster.lock().await.submissions.clone()
    }

    pub async fn purge_orphan_submissions(&self) -> usize {
        let mut roster = self.roster.lock().await;
        let before = roster.submissions.len();
        let students = roster.student_index.clone();
        roster
            .submissions
            .retain(|s| students.contains_key(&s.student_id));
        let count = before - roster.submissions.len();
        drop(roster);

        if count > 0 {
            log::info!("purged {} submissions of removed students", count);
            self.publish(ChangeEvent::SubmissionsPurged { count });
        }
        count
    }

    pub async fn required_pairs(&self, group_id: GroupId, date: NaiveDate) -> Result<u32, DirectoryError> {
        let roster = self.roster.lock().await;
        let group = roster.group(group_id).ok_or(DirectoryError::UnknownGroup(group_id))?;
        Ok(self.calendar.required_pairs(group, date))
    }

    /// Brings every student of the group in line with the schedule for `date`
    /// and returns the resulting sheet.
    pub async fn sync_attendance(
        &self,
        group_id: GroupId,
        date: NaiveDate,
    ) -> Result<AttendanceSheet, DirectoryError> {
        let mut roster = self.roster.lock().await;
        let pairs = {
            let group = roster.group(group_id).ok_or(DirectoryError::UnknownGroup(group_id))?;
            self.calendar.required_pairs(group, date)
        };

        let mut created = Vec::new();
        let mut rows = Vec::new();
        for student in roster.students.iter_mut().filter(|s| s.group_id == group_id) {
            if attendance::synchronize(student, date, pairs as usize) {
                created.push(student.id);
            }
            let marks = attendance::record_for(student, date)
                .map(|r| r.marks.clone())
                .unwrap_or_default();
            rows.push(AttendanceRow {
                student_id: student.id,
                name: student.name.clone(),
                marks,
                attended_total: attendance::attended_total(student),
            });
        }
        drop(roster);

        for student_id in created {
            self.publish(ChangeEvent::AttendanceRecordAdded { student_id, date });
        }

        Ok(AttendanceSheet {
            group_id,
            date,
            parity: self.calendar.week_parity(date),
            pairs,
            rows,
        })
    }

    pub async fn set_mark(
        &self,
        student_id: StudentId,
        date: NaiveDate,
        slot: usize,
        present: bool,
    ) -> Result<AttendanceRecord, DirectoryError> {
        let mut roster = self.roster.lock().await;
        let student = roster
            .student_mut(student_id)
            .ok_or(DirectoryError::UnknownStudent(student_id))?;
        let record = student
            .attendance
            .iter_mut()
            .find(|r| r.date == date)
            .ok_or(DirectoryError::NoRecord { student_id, date })?;
        let len = record.marks.len();
        let mark = record
            .marks
            .get_mut(slot)
            .ok_or(DirectoryError::SlotOutOfRange { slot, len, date })?;
        *mark = present;
        let updated = record.clone();
        drop(roster);

        self.publish(ChangeEvent::AttendanceMarked {
            student_id,
            date,
            slot,
            present,
        });
        Ok(updated)
    }

    /// Writes the document when a store is attached; no-op otherwise.
    pub async fn save(&self) -> anyhow::Result<()> {
        if let Some(store) = &self.store {
            let roster = self.roster.lock().await.clone();
            store.save(&roster).await?;
        }
        Ok(())
    }
}
