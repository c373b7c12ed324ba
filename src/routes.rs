use axum::extract::Path;
use axum::handler::Handler;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::{AttendanceSheet, Directory};
use crate::err::{self, Error};
use crate::ingest::{MailIngestionService, RunOutcome, RunPhase, RunReport};
use crate::models::{AttendanceRecord, LabSubmission, StudentId};
use crate::poller::PollerHandle;
use crate::schedule::WeekParity;
use crate::{breaks, proceeds, Payload};

#[derive(Clone)]
pub struct MailControl {
    pub service: MailIngestionService,
    pub poller: PollerHandle,
}

#[derive(Clone)]
pub struct AppState {
    pub directory: Directory,
    /// Absent when the mailbox is not configured.
    pub mail: Option<MailControl>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/schedule/:group/:date", get(schedule))
        .route("/attendance/:group/:date", get(attendance_sheet))
        .route("/marks/:student/:date/:slot", put(set_mark))
        .route("/emails", post(bind_email))
        .route("/submissions", get(submissions))
        .route("/mail/check", post(check_mail))
        .route("/mail/status", get(mail_status))
        .fallback(err::handler404.into_service())
        .layer(Extension(state))
}

async fn schedule(
    Path((group_id, date)): Path<(Uuid, NaiveDate)>,
    Extension(state): Extension<AppState>,
) -> Payload<ScheduleView> {
    let pairs = state.directory.required_pairs(group_id, date).await?;
    let parity = state.directory.calendar().week_parity(date);
    proceeds(ScheduleView {
        group_id,
        date,
        parity,
        week: parity.label(),
        pairs,
    })
}

async fn attendance_sheet(
    Path((group_id, date)): Path<(Uuid, NaiveDate)>,
    Extension(state): Extension<AppState>,
) -> Payload<AttendanceSheet> {
    let sheet = state.directory.sync_attendance(group_id, date).await?;
    state.directory.save().await?;
    proceeds(sheet)
}

async fn set_mark(
    Path((student_id, date, slot)): Path<(Uuid, NaiveDate, usize)>,
    Extension(state): Extension<AppState>,
    Json(body): Json<SetMark>,
) -> Payload<MarkedRecord> {
    let record = state
        .directory
        .set_mark(student_id, date, slot, body.present)
        .await?;
    state.directory.save().await?;
    proceeds(MarkedRecord { record })
}

async fn bind_email(
    Extension(state): Extension<AppState>,
    Json(body): Json<BindEmail>,
) -> Payload<BoundEmail> {
    state
        .directory
        .bind_email(&body.email, body.student_id)
        .await?;
    state.directory.save().await?;
    proceeds(BoundEmail {
        email: body.email.trim().to_string(),
        student_id: body.student_id,
    })
}

async fn submissions(Extension(state): Extension<AppState>) -> Payload<SubmissionList> {
    proceeds(SubmissionList {
        submissions: state.directory.submissions().await,
    })
}

async fn check_mail(Extension(state): Extension<AppState>) -> Payload<MailCheck> {
    let control = match &state.mail {
        Some(control) => control,
        None => {
            return breaks(Error::InvalidPayload {
                message: "mailbox is not configured".to_string(),
            })
        }
    };
    let outcome = control.poller.trigger().await.map_err(|err| Error::InternalError {
        kind: "PollerError",
        message: err.to_string(),
    })?;
    match outcome {
        RunOutcome::AlreadyRunning => proceeds(MailCheck {
            status: "already_running",
            report: None,
        }),
        RunOutcome::Completed(report) => proceeds(MailCheck {
            status: "completed",
            report: Some(report),
        }),
        RunOutcome::Failed(err) => breaks(err.into()),
    }
}

async fn mail_status(Extension(state): Extension<AppState>) -> Payload<MailStatus> {
    proceeds(MailStatus {
        enabled: state.mail.is_some(),
        phase: state.mail.as_ref().map(|control| control.service.phase()),
    })
}

#[derive(Debug, Serialize)]
struct ScheduleView {
    group_id: Uuid,
    date: NaiveDate,
    parity: WeekParity,
    week: &'static str,
    pairs: u32,
}

#[derive(Debug, Deserialize)]
struct SetMark {
    present: bool,
}

#[derive(Debug, Serialize)]
struct MarkedRecord {
    record: AttendanceRecord,
}

#[derive(Debug, Deserialize)]
struct BindEmail {
    email: String,
    student_id: StudentId,
}

#[derive(Debug, Serialize)]
struct BoundEmail {
    email: String,
    student_id: StudentId,
}

#[derive(Debug, Serialize)]
struct SubmissionList {
    submissions: Vec<LabSubmission>,
}

#[derive(Debug, Serialize)]
struct MailCheck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<RunReport>,
}

#[derive(Debug, Serialize)]
struct MailStatus {
    enabled: bool,
    phase: Option<RunPhase>,
}
