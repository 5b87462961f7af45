use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest},
    extractors::Session,
    jwt::JwtKeys,
    services::authenticate,
};
use crate::{
    access::Identity,
    error::{AppError, AppResult},
    state::AppState,
    users::{
        dto::{PublicUser, UpdateProfileRequest},
        repo,
        services::{register_root, update_own_profile},
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).patch(patch_me))
}

fn issue_tokens(state: &AppState, identity: Identity) -> AppResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(identity.id)?;
    let refresh_token = keys.sign_refresh(identity.id)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        identity,
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let user = register_root(
        &state.db,
        state.hasher.as_ref(),
        &payload.username,
        &payload.password,
        payload.email.as_deref(),
    )
    .await?;

    let identity = repo::load_identity(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok((StatusCode::CREATED, Json(issue_tokens(&state, identity)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let identity = authenticate(
        &state.db,
        state.hasher.as_ref(),
        &payload.username,
        &payload.password,
    )
    .await?;

    info!(user_id = %identity.id, role = %identity.role, "user logged in");
    Ok(Json(issue_tokens(&state, identity)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let identity = repo::load_identity(&state.db, claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    Ok(Json(issue_tokens(&state, identity)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    Session(identity): Session,
) -> AppResult<Json<PublicUser>> {
    let user = repo::find_by_id(&state.db, identity.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn patch_me(
    State(state): State<AppState>,
    Session(identity): Session,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = update_own_profile(&state.db, state.hasher.as_ref(), &identity, payload).await?;
    Ok(Json(user.into()))
}
