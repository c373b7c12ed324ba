use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type GroupId = Uuid;
pub type StudentId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDay {
    pub day: Weekday,
    pub pairs: u32,
}

impl ScheduleDay {
    pub fn new(day: Weekday, pairs: u32) -> Self {
        Self { day, pairs }
    }
}

/// A study group with its two alternating weekly timetables.
///
/// The roster is not stored here; students point at their group by id and
/// [`crate::directory::Roster::students_in`] derives the back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub numerator: Vec<ScheduleDay>,
    #[serde(default)]
    pub denominator: Vec<ScheduleDay>,
}

impl Group {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            numerator: Vec::new(),
            denominator: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub group_id: GroupId,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
}

impl Student {
    pub fn new<S: Into<String>>(name: S, group_id: GroupId) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            group_id,
            attendance: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: StudentId,
    pub date: NaiveDate,
    #[serde(default)]
    pub marks: Vec<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMapping {
    pub email: String,
    pub student_id: StudentId,
}

impl EmailMapping {
    pub fn matches(&self, address: &str) -> bool {
        self.email.trim().to_lowercase() == address.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabSubmission {
    pub student_id: StudentId,
    pub title: String,
    pub content: Option<String>,
    pub received_at: DateTime<Utc>,
    pub file_path: Option<PathBuf>,
    pub message_id: Option<String>,
}
