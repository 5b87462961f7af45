use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewTrip, Participant, Trip};
use crate::error::AppResult;

const TRIP_COLUMNS: &str = "t.id, t.destination, t.departure_city, t.arrival_city, t.start_at, \
     t.end_at, t.occasion, t.journey_token, t.created_by, t.created_at";

pub async fn insert<'e>(db: impl PgExecutor<'e>, new: NewTrip<'_>) -> AppResult<Trip> {
    let trip = sqlx::query_as::<_, Trip>(
        r#"
        INSERT INTO trips AS t (id, destination, departure_city, arrival_city,
                                start_at, end_at, occasion, journey_token, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING t.id, t.destination, t.departure_city, t.arrival_city, t.start_at,
                  t.end_at, t.occasion, t.journey_token, t.created_by, t.created_at
        "#,
    )
    .bind(new.id)
    .bind(new.destination)
    .bind(new.departure_city)
    .bind(new.arrival_city)
    .bind(new.start_at)
    .bind(new.end_at)
    .bind(new.occasion)
    .bind(new.journey_token)
    .bind(new.created_by)
    .fetch_one(db)
    .await?;
    Ok(trip)
}

pub async fn find<'e>(db: impl PgExecutor<'e>, id: Uuid) -> AppResult<Option<Trip>> {
    let trip = sqlx::query_as::<_, Trip>(&format!("SELECT {TRIP_COLUMNS} FROM trips t WHERE t.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(trip)
}

/// Locks the trip row until the surrounding transaction ends.
pub async fn find_for_update<'e>(db: impl PgExecutor<'e>, id: Uuid) -> AppResult<Option<Trip>> {
    let trip = sqlx::query_as::<_, Trip>(&format!(
        "SELECT {TRIP_COLUMNS} FROM trips t WHERE t.id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(trip)
}

/// Duplicate pairs are skipped.
pub async fn add_participants<'e>(
    db: impl PgExecutor<'e>,
    trip_id: Uuid,
    user_ids: &[Uuid],
) -> AppResult<u64> {
    if user_ids.is_empty() {
        return Ok(0);
    }
    let res = sqlx::query(
        r#"
        INSERT INTO trip_participants (trip_id, user_id)
        SELECT $1, UNNEST($2::uuid[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(trip_id)
    .bind(user_ids)
    .execute(db)
    .await?;
    Ok(res.rows_affected())
}

pub async fn clear_participants<'e>(db: impl PgExecutor<'e>, trip_id: Uuid) -> AppResult<u64> {
    let res = sqlx::query("DELETE FROM trip_participants WHERE trip_id = $1")
        .bind(trip_id)
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}

/// Participants and expenses cascade.
pub async fn delete<'e>(db: impl PgExecutor<'e>, id: Uuid) -> AppResult<u64> {
    let res = sqlx::query("DELETE FROM trips WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}

pub async fn update_occasion<'e>(
    db: impl PgExecutor<'e>,
    id: Uuid,
    occasion: Option<&str>,
) -> AppResult<u64> {
    let res = sqlx::query("UPDATE trips SET occasion = $2 WHERE id = $1")
        .bind(id)
        .bind(occasion)
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}

pub async fn list_all<'e>(db: impl PgExecutor<'e>) -> AppResult<Vec<Trip>> {
    let rows = sqlx::query_as::<_, Trip>(&format!(
        "SELECT {TRIP_COLUMNS} FROM trips t ORDER BY t.start_at ASC, t.created_at ASC"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Trips the user created or takes part in.
pub async fn list_visible<'e>(db: impl PgExecutor<'e>, user_id: Uuid) -> AppResult<Vec<Trip>> {
    let rows = sqlx::query_as::<_, Trip>(&format!(
        r#"
        SELECT {TRIP_COLUMNS}
          FROM trips t
         WHERE t.created_by = $1
            OR EXISTS (SELECT 1 FROM trip_participants p
                        WHERE p.trip_id = t.id AND p.user_id = $1)
         ORDER BY t.start_at ASC, t.created_at ASC
        "#
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_created_by<'e>(db: impl PgExecutor<'e>, manager: Uuid) -> AppResult<Vec<Trip>> {
    let rows = sqlx::query_as::<_, Trip>(&format!(
        "SELECT {TRIP_COLUMNS} FROM trips t WHERE t.created_by = $1 \
         ORDER BY t.start_at ASC, t.created_at ASC"
    ))
    .bind(manager)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Trips with `user_id` as participant, optionally those overlapping `[from, to]`.
pub async fn list_for_user<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    from: Option<OffsetDateTime>,
    to: Option<OffsetDateTime>,
) -> AppResult<Vec<Trip>> {
    let rows = sqlx::query_as::<_, Trip>(&format!(
        r#"
        SELECT {TRIP_COLUMNS}
          FROM trips t
          JOIN trip_participants p ON p.trip_id = t.id
         WHERE p.user_id = $1
           AND ($2::timestamptz IS NULL OR t.end_at >= $2)
           AND ($3::timestamptz IS NULL OR t.start_at <= $3)
         ORDER BY t.start_at ASC, t.created_at ASC
        "#
    ))
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn participants_of<'e>(db: impl PgExecutor<'e>, trip_id: Uuid) -> AppResult<Vec<Participant>> {
    let rows = sqlx::query_as::<_, Participant>(
        r#"
        SELECT u.id, u.username, u.email
          FROM users u
          JOIN trip_participants p ON p.user_id = u.id
         WHERE p.trip_id = $1
         ORDER BY u.username
        "#,
    )
    .bind(trip_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn is_participant<'e>(db: impl PgExecutor<'e>, trip_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let found = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM trip_participants WHERE trip_id = $1 AND user_id = $2)",
    )
    .bind(trip_id)
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(found)
}
