use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A working-group meeting members can check in to.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One member's check-in for an event.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub event_id: i64,
    pub user_id: Uuid,
    pub name: String,
    pub username: String,
    pub checked_in_at: DateTime<Utc>,
}

/// Result of recording a check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    Recorded { checked_in_at: DateTime<Utc> },
    AlreadyCheckedIn,
}
