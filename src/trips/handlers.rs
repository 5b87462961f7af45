use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        CreateTripRequest, CreatedTripResponse, ReplaceParticipantsRequest, TripDetails,
        TripListQuery, TripWindow, UpdateOccasionRequest,
    },
    repo_types::Trip,
    services,
};
use crate::{auth::extractors::Session, error::AppResult, state::AppState};

pub fn trips_routes() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips).post(create_trip))
        .route("/trips/:id", get(get_trip).delete(delete_trip))
        .route("/trips/:id/occasion", patch(update_occasion))
        .route("/trips/:id/participants", put(replace_participants))
        .route("/me/trips", get(my_trips))
}

/// `?mine=true` narrows the list to trips the caller created.
#[instrument(skip(state))]
pub async fn list_trips(
    State(state): State<AppState>,
    Session(identity): Session,
    Query(q): Query<TripListQuery>,
) -> AppResult<Json<Vec<Trip>>> {
    let trips = if q.mine {
        services::trips_created_by(&state.db, identity.id).await?
    } else {
        services::visible_trips(&state.db, &identity).await?
    };
    Ok(Json(trips))
}

#[instrument(skip(state, payload))]
pub async fn create_trip(
    State(state): State<AppState>,
    Session(identity): Session,
    Json(payload): Json<CreateTripRequest>,
) -> AppResult<(StatusCode, Json<CreatedTripResponse>)> {
    let id = services::create_trip(&state.db, &identity, payload).await?;
    Ok((StatusCode::CREATED, Json(CreatedTripResponse { id })))
}

#[instrument(skip(state))]
pub async fn get_trip(
    State(state): State<AppState>,
    Session(identity): Session,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TripDetails>> {
    let details = services::trip_details(&state, &identity, id).await?;
    Ok(Json(details))
}

#[instrument(skip(state))]
pub async fn delete_trip(
    State(state): State<AppState>,
    Session(identity): Session,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    services::delete_trip(&state.db, &identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn update_occasion(
    State(state): State<AppState>,
    Session(identity): Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOccasionRequest>,
) -> AppResult<StatusCode> {
    services::update_occasion(&state.db, &identity, id, payload.occasion.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn replace_participants(
    State(state): State<AppState>,
    Session(identity): Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceParticipantsRequest>,
) -> AppResult<StatusCode> {
    services::replace_participants(&state.db, &identity, id, &payload.participants).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Trips the caller takes part in, optionally within `?from=&to=`.
#[instrument(skip(state))]
pub async fn my_trips(
    State(state): State<AppState>,
    Session(identity): Session,
    Query(window): Query<TripWindow>,
) -> AppResult<Json<Vec<Trip>>> {
    let trips = services::trips_for_user(&state.db, identity.id, &window).await?;
    Ok(Json(trips))
}
