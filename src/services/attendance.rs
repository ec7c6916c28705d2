use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::attendance::{AttendanceTokenCodec, render_qr_svg};
use crate::error::{AppError, Result};
use crate::models::attendance::{AttendanceRecord, CheckInOutcome, Event};
use crate::repositories::attendance as attendance_repo;

/// A check-in code ready to be shown to members.
#[derive(Debug, Serialize)]
pub struct EventQr {
    pub event_id: i64,
    pub token: String,
    pub expires_at_ms: i64,
    pub svg: String,
}

/// Creates an event owned by `created_by`.
pub async fn create_event(
    db: &Pool,
    title: &str,
    location: Option<&str>,
    starts_at: DateTime<Utc>,
    created_by: Uuid,
) -> Result<Event> {
    let event = attendance_repo::create_event(db, title, location, starts_at, &created_by).await?;
    tracing::info!("📅 Event {} created by user: {}", event.id, created_by);
    Ok(event)
}

/// Issues a signed check-in token and its QR rendering for an event.
pub async fn issue_event_qr(
    db: &Pool,
    codec: &AttendanceTokenCodec,
    event_id: i64,
    validity_minutes: i64,
) -> Result<EventQr> {
    attendance_repo::find_event(db, event_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let token = codec.encode(event_id, validity_minutes);
    let claim = codec.decode(&token)?;
    let svg = render_qr_svg(&token)?;

    tracing::info!("🔳 Check-in QR issued for event: {}", event_id);

    Ok(EventQr {
        event_id,
        token,
        expires_at_ms: claim.expires_at_ms,
        svg,
    })
}

/// Validates a scanned token and records the user's attendance.
pub async fn check_in(
    db: &Pool,
    codec: &AttendanceTokenCodec,
    user_id: Uuid,
    token: &str,
) -> Result<(i64, CheckInOutcome)> {
    let claim = codec.decode(token.trim()).inspect_err(|e| {
        tracing::info!("❌ Check-in rejected for user {}: {}", user_id, e.code());
    })?;

    attendance_repo::find_event(db, claim.event_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let outcome = attendance_repo::record_check_in(db, claim.event_id, &user_id).await?;

    match &outcome {
        CheckInOutcome::Recorded { .. } => {
            tracing::info!("✅ User {} checked in to event {}", user_id, claim.event_id)
        }
        CheckInOutcome::AlreadyCheckedIn => {
            tracing::debug!("User {} already checked in to event {}", user_id, claim.event_id)
        }
    }

    Ok((claim.event_id, outcome))
}

/// Lists attendees of an existing event.
pub async fn list_attendance(db: &Pool, event_id: i64) -> Result<Vec<AttendanceRecord>> {
    attendance_repo::find_event(db, event_id)
        .await?
        .ok_or(AppError::NotFound)?;

    attendance_repo::list_attendance(db, event_id).await
}
