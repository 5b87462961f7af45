use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Participant, Trip};
use crate::journeys::Connection;

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub destination: String,
    pub departure_city: Option<String>,
    pub arrival_city: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_at: OffsetDateTime,
    pub occasion: Option<String>,
    pub journey_token: Option<String>,
    #[serde(default)]
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CreatedTripResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOccasionRequest {
    pub occasion: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceParticipantsRequest {
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TripListQuery {
    /// Only trips the caller created.
    #[serde(default)]
    pub mine: bool,
}

/// Optional overlap window for the participant trip list.
#[derive(Debug, Default, Deserialize)]
pub struct TripWindow {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub to: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct TripDetails {
    #[serde(flatten)]
    pub trip: Trip,
    pub participants: Vec<Participant>,
    pub connections: Vec<Connection>,
}
