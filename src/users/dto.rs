use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::User;

/// Public part of a user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub role: String,
    pub owner_id: Option<Uuid>,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            role: u.role,
            owner_id: u.owner_id,
        }
    }
}

/// Owner-initiated registration.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub role: String,
    /// Global scope only; defaults to the requester.
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CreatedUserResponse {
    pub id: Uuid,
}

/// Owner edit; absent fields are left untouched, an empty email clears it.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub owner_id: Option<Uuid>,
}

/// Self edit. Username and role are fixed; an empty email clears it.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}
