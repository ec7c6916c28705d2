use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::attendance::{AttendanceRecord, CheckInOutcome, Event},
};

fn row_to_event(row: &Row) -> Result<Event> {
    Ok(Event {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        title: row.try_get("title").map_err(|_| AppError::MissingData("title".to_string()))?,
        location: row.try_get("location").map_err(|_| AppError::MissingData("location".to_string()))?,
        starts_at: row.try_get("starts_at").map_err(|_| AppError::MissingData("starts_at".to_string()))?,
        created_by: row.try_get("created_by").map_err(|_| AppError::MissingData("created_by".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
    })
}

/// Inserts a new event.
pub async fn create_event(
    pool: &Pool,
    title: &str,
    location: Option<&str>,
    starts_at: DateTime<Utc>,
    created_by: &Uuid,
) -> Result<Event> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            INSERT INTO events (title, location, starts_at, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, location, starts_at, created_by, created_at
            "#,
            &[&title, &location, &starts_at, created_by],
        )
        .await?;
    row_to_event(&row)
}

/// Finds an event by its ID.
pub async fn find_event(pool: &Pool, event_id: i64) -> Result<Option<Event>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, title, location, starts_at, created_by, created_at
            FROM events
            WHERE id = $1
            "#,
            &[&event_id],
        )
        .await?;
    row.map(|r| row_to_event(&r)).transpose()
}

/// Records a check-in; the `(event_id, user_id)` constraint absorbs repeats.
pub async fn record_check_in(pool: &Pool, event_id: i64, user_id: &Uuid) -> Result<CheckInOutcome> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            INSERT INTO attendance (event_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (event_id, user_id) DO NOTHING
            RETURNING checked_in_at
            "#,
            &[&event_id, user_id],
        )
        .await?;

    match row {
        Some(row) => Ok(CheckInOutcome::Recorded {
            checked_in_at: row
                .try_get("checked_in_at")
                .map_err(|_| AppError::MissingData("checked_in_at".to_string()))?,
        }),
        None => Ok(CheckInOutcome::AlreadyCheckedIn),
    }
}

/// Lists everyone who checked in to an event, earliest first.
pub async fn list_attendance(pool: &Pool, event_id: i64) -> Result<Vec<AttendanceRecord>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT a.event_id, a.user_id, u.name, u.username, a.checked_in_at
            FROM attendance a
            JOIN users u ON u.id = a.user_id
            WHERE a.event_id = $1
            ORDER BY a.checked_in_at ASC
            "#,
            &[&event_id],
        )
        .await?;

    rows.iter()
        .map(|row| {
            Ok(AttendanceRecord {
                event_id: row.try_get("event_id").map_err(|_| AppError::MissingData("event_id".to_string()))?,
                user_id: row.try_get("user_id").map_err(|_| AppError::MissingData("user_id".to_string()))?,
                name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
                username: row.try_get("username").map_err(|_| AppError::MissingData("username".to_string()))?,
                checked_in_at: row.try_get("checked_in_at").map_err(|_| AppError::MissingData("checked_in_at".to_string()))?,
            })
        })
        .collect()
}
