use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Trip record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub destination: String,
    pub departure_city: Option<String>,
    pub arrival_city: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_at: OffsetDateTime,
    pub occasion: Option<String>,
    #[serde(skip_serializing)]
    pub journey_token: Option<String>,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub struct NewTrip<'a> {
    pub id: Uuid,
    pub destination: &'a str,
    pub departure_city: Option<&'a str>,
    pub arrival_city: Option<&'a str>,
    pub start_at: OffsetDateTime,
    pub end_at: OffsetDateTime,
    pub occasion: Option<&'a str>,
    pub journey_token: Option<&'a str>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Participant {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
}
