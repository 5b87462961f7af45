use axum::{extract::State, routing::get, Json, Router};
use tracing::instrument;

use super::repo::{self, Role};
use crate::{auth::extractors::Session, error::AppResult, state::AppState};

pub fn roles_routes() -> Router<AppState> {
    Router::new().route("/roles/manageable", get(list_manageable_roles))
}

/// Roles the caller may hand out, for registration and edit forms.
#[instrument(skip(state))]
pub async fn list_manageable_roles(
    State(state): State<AppState>,
    Session(identity): Session,
) -> AppResult<Json<Vec<Role>>> {
    let roles = repo::manageable_roles(&state.db, identity.rank).await?;
    Ok(Json(roles))
}
