//! Optional public-transport connections shown next to a trip.
//!
//! The upstream service is slow and unreliable by nature; callers go through
//! [`connections_or_empty`], which never fails.

mod http_source;

pub use http_source::HttpJourneyLookup;

use async_trait::async_trait;
use serde::Serialize;
use time::Date;
use tracing::warn;

use crate::trips::repo_types::Trip;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JourneyQuery {
    pub departure_city: String,
    pub arrival_city: String,
    pub date: Date,
    pub token: String,
}

impl JourneyQuery {
    /// `None` when the trip lacks a token or a departure city.
    pub fn for_trip(trip: &Trip) -> Option<Self> {
        let token = trip.journey_token.as_deref().filter(|t| !t.trim().is_empty())?;
        let departure_city = trip.departure_city.as_deref().filter(|c| !c.trim().is_empty())?;
        let arrival_city = trip
            .arrival_city
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&trip.destination);
        Some(Self {
            departure_city: departure_city.to_string(),
            arrival_city: arrival_city.to_string(),
            date: trip.start_at.date(),
            token: token.to_string(),
        })
    }
}

/// Simplified connection record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub duration: Option<String>,
    pub transfers: Option<u32>,
}

#[async_trait]
pub trait JourneyLookup: Send + Sync {
    async fn connections(&self, query: &JourneyQuery) -> anyhow::Result<Vec<Connection>>;
}

pub async fn connections_or_empty(
    lookup: &dyn JourneyLookup,
    query: Option<&JourneyQuery>,
) -> Vec<Connection> {
    let Some(query) = query else {
        return Vec::new();
    };
    match lookup.connections(query).await {
        Ok(list) => list,
        Err(e) => {
            warn!(
                error = %e,
                from = %query.departure_city,
                to = %query.arrival_city,
                "journey lookup failed; showing no connections"
            );
            Vec::new()
        }
    }
}
