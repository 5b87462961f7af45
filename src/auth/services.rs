use lazy_static::lazy_static;
use sqlx::PgPool;
use tracing::warn;

use super::password::{hash_password, CredentialHasher};
use crate::access::Identity;
use crate::error::{AppError, AppResult};
use crate::users::repo;

lazy_static! {
    /// Verified against when the username is unknown, so both failure paths cost the same.
    static ref DUMMY_HASH: Option<String> = hash_password("tripdesk-dummy-password").ok();
}

/// Resolves a username/password pair to an identity.
///
/// Unknown username and wrong password both yield [`AppError::InvalidCredentials`].
pub async fn authenticate(
    db: &PgPool,
    hasher: &dyn CredentialHasher,
    username: &str,
    password: &str,
) -> AppResult<Identity> {
    let username = username.trim();
    let user = repo::find_by_username(db, username).await?;

    let Some(user) = user else {
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            let _ = hasher.verify(password, dummy);
        }
        warn!(%username, "login rejected");
        return Err(AppError::InvalidCredentials);
    };

    if !hasher.verify(password, &user.password_hash)? {
        warn!(%username, "login rejected");
        return Err(AppError::InvalidCredentials);
    }

    repo::load_identity(db, user.id)
        .await?
        .ok_or(AppError::InvalidCredentials)
}
