use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use super::jwt::AuthUser;
use crate::{access::Identity, error::AppError, state::AppState, users::repo};

/// Validated bearer token resolved to the caller's current identity.
///
/// Role and rank are read from the database on every request.
pub struct Session(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;

        let identity = repo::load_identity(&state.db, user_id).await?.ok_or_else(|| {
            warn!(%user_id, "token for unknown user");
            AppError::Unauthorized("User not found".into())
        })?;

        Ok(Session(identity))
    }
}
