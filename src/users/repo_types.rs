use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::access::{Identity, Scope};

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,      // Argon2 hash, not exposed in JSON
    pub email: Option<String>,
    pub role: String,
    pub owner_id: Option<Uuid>,     // self for roots
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub struct IdentityRow {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub rank: i32,
    pub is_global: bool,
}

impl From<IdentityRow> for Identity {
    fn from(r: IdentityRow) -> Self {
        Self {
            id: r.id,
            username: r.username,
            role: r.role,
            rank: r.rank,
            scope: if r.is_global { Scope::Global } else { Scope::Owned },
        }
    }
}

/// Row of the management overview.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ManagedUser {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub role: String,
    pub rank: i32,
    pub owner_id: Option<Uuid>,
}

pub struct NewUser<'a> {
    pub id: Uuid,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub email: Option<&'a str>,
    pub role: &'a str,
    pub owner_id: Uuid,
}

/// Column changes; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub password_hash: Option<String>,
    /// `Some(None)` clears the address.
    pub email: Option<Option<String>>,
    pub role: Option<String>,
    pub owner_id: Option<Uuid>,
}
