mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::fixture;
use opendiary_attendance::routes::{router, AppState};
use opendiary_attendance::{Directory, ScheduleCalendar};

async fn call(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn state() -> (AppState, common::Fixture) {
    let fx = fixture();
    let directory = Directory::new(fx.roster.clone(), ScheduleCalendar::default());
    (
        AppState {
            directory,
            mail: None,
        },
        fx,
    )
}

#[tokio::test]
async fn schedule_reports_parity_and_pairs() {
    let (state, fx) = state();
    let (status, body) = call(
        &state,
        Method::GET,
        &format!("/schedule/{}/2023-09-04", fx.group_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["pairs"], 3);
    assert_eq!(body["week"], "Числитель");

    let (_, body) = call(
        &state,
        Method::GET,
        &format!("/schedule/{}/2023-09-12", fx.group_id),
        None,
    )
    .await;
    assert_eq!(body["parity"], "Denominator");
    assert_eq!(body["pairs"], 2);
}

#[tokio::test]
async fn attendance_sheet_then_mark() {
    let (state, fx) = state();
    let (status, body) = call(
        &state,
        Method::GET,
        &format!("/attendance/{}/2023-09-04", fx.group_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"][0]["marks"], json!([false, false, false]));

    let (status, body) = call(
        &state,
        Method::PUT,
        &format!("/marks/{}/2023-09-04/1", fx.student_id),
        Some(json!({ "present": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["marks"], json!([false, true, false]));

    let (status, body) = call(
        &state,
        Method::PUT,
        &format!("/marks/{}/2023-09-04/5", fx.student_id),
        Some(json!({ "present": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidPayload");
}

#[tokio::test]
async fn unknown_group_and_path_are_not_found() {
    let (state, _) = state();
    let (status, body) = call(
        &state,
        Method::GET,
        &format!("/attendance/{}/2023-09-04", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let (status, body) = call(&state, Method::GET, "/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn email_binding_rejects_duplicates() {
    let (state, fx) = state();
    let (status, body) = call(
        &state,
        Method::POST,
        "/emails",
        Some(json!({ "email": "IVANOV@mail.test", "student_id": fx.student_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidPayload");

    let (status, body) = call(
        &state,
        Method::POST,
        "/emails",
        Some(json!({ "email": " ivan@home.test ", "student_id": fx.student_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ivan@home.test");
}

#[tokio::test]
async fn mail_check_without_mailbox_is_refused() {
    let (state, _) = state();
    let (_, body) = call(&state, Method::POST, "/mail/check", None).await;
    assert_eq!(body["error"], "InvalidPayload");

    let (_, body) = call(&state, Method::GET, "/mail/status", None).await;
    assert_eq!(body["enabled"], false);
    assert_eq!(body["phase"], Value::Null);

    let (_, body) = call(&state, Method::GET, "/submissions", None).await;
    assert_eq!(body["submissions"], json!([]));
}
