//! Attendance tracking against a biweekly timetable, plus ingestion of lab
//! and practical work mailed in by students.

pub mod attendance;
pub mod classify;
pub mod config;
pub mod directory;
pub mod err;
pub mod ingest;
pub mod io;
pub mod mail;
pub mod models;
pub mod poller;
pub mod routes;
pub mod schedule;
pub mod store;

use axum::Json;
use serde::Serialize;

use crate::err::{Error, Fine, Maybe, Nothing};

pub use crate::classify::{classify, AttachmentClassifier, Classification, WorkKind};
pub use crate::config::{Config, MailConfig};
pub use crate::directory::{ChangeEvent, Directory, DirectoryError, Roster};
pub use crate::ingest::{MailIngestionService, RunOutcome, RunPhase, RunReport, TriggerSource};
pub use crate::mail::IngestError;
pub use crate::schedule::{ScheduleCalendar, WeekParity};
pub use crate::store::Store;

pub type Payload<T> = Result<Json<Maybe<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Fine(value)))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Nothing(err)))
}
