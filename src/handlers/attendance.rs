use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::{
        attendance::{AttendanceRecord, CheckInOutcome, Event},
        user::PublicUser,
    },
    services::attendance::{self as attendance_service, EventQr},
    state::AppState,
    validation::attendance::{validate_event_title, validate_validity_minutes},
};

#[derive(Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct QrQuery {
    pub validity_minutes: Option<i64>,
}

#[derive(Deserialize)]
pub struct CheckInRequest {
    pub token: String,
}

#[derive(Serialize)]
pub struct CheckInResponse {
    pub success: bool,
    pub event_id: i64,
    pub already_checked_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_in_at: Option<DateTime<Utc>>,
}

/// Creates an event. Organizers only.
pub async fn create_event(
    State(state): State<AppState>,
    Extension(user): Extension<PublicUser>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>)> {
    validate_event_title(&payload.title)?;

    let location = payload
        .location
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty());

    let event = attendance_service::create_event(
        &state.db,
        payload.title.trim(),
        location,
        payload.starts_at,
        user.id,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// Issues a check-in QR code for an event. Organizers only.
pub async fn event_qr(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Query(query): Query<QrQuery>,
) -> Result<Json<EventQr>> {
    let validity = query
        .validity_minutes
        .unwrap_or(state.config.attendance_validity_minutes);
    validate_validity_minutes(validity)?;

    let qr = attendance_service::issue_event_qr(
        &state.db,
        &state.attendance_codec,
        event_id,
        validity,
    )
    .await?;

    Ok(Json(qr))
}

/// Records the signed-in member's attendance from a scanned token.
pub async fn check_in(
    State(state): State<AppState>,
    Extension(user): Extension<PublicUser>,
    Json(payload): Json<CheckInRequest>,
) -> Result<Response> {
    let (event_id, outcome) = attendance_service::check_in(
        &state.db,
        &state.attendance_codec,
        user.id,
        &payload.token,
    )
    .await?;

    let response = match outcome {
        CheckInOutcome::Recorded { checked_in_at } => (
            StatusCode::CREATED,
            Json(CheckInResponse {
                success: true,
                event_id,
                already_checked_in: false,
                checked_in_at: Some(checked_in_at),
            }),
        ),
        CheckInOutcome::AlreadyCheckedIn => (
            StatusCode::OK,
            Json(CheckInResponse {
                success: true,
                event_id,
                already_checked_in: true,
                checked_in_at: None,
            }),
        ),
    };

    Ok(response.into_response())
}

/// Lists attendees of an event. Organizers only.
pub async fn list_attendance(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<Vec<AttendanceRecord>>> {
    let records = attendance_service::list_attendance(&state.db, event_id).await?;
    Ok(Json(records))
}
