use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{CreateUserRequest, CreatedUserResponse, PublicUser, UpdateUserRequest},
    repo_types::ManagedUser,
    services,
};
use crate::{auth::extractors::Session, error::AppResult, state::AppState};

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:username", patch(update_user).delete(delete_user))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Session(identity): Session,
) -> AppResult<Json<Vec<ManagedUser>>> {
    let users = services::list_manageable_users(&state.db, &identity).await?;
    Ok(Json(users))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Session(identity): Session,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<CreatedUserResponse>)> {
    let id = services::create_user(&state.db, state.hasher.as_ref(), &identity, payload).await?;
    Ok((StatusCode::CREATED, Json(CreatedUserResponse { id })))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Session(identity): Session,
    Path(username): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    let user =
        services::update_user(&state.db, state.hasher.as_ref(), &identity, &username, payload)
            .await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Session(identity): Session,
    Path(username): Path<String>,
) -> AppResult<StatusCode> {
    services::delete_user(&state.db, &identity, &username).await?;
    Ok(StatusCode::NO_CONTENT)
}
