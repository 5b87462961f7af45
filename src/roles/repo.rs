use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

use crate::error::{AppError, AppResult};

/// Role record; higher rank means broader management scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Role {
    pub name: String,
    pub rank: i32,
}

/// Rank of a role by name.
pub async fn rank<'e>(db: impl PgExecutor<'e>, role: &str) -> AppResult<i32> {
    let rank = sqlx::query_scalar::<_, i32>("SELECT rank FROM roles WHERE name = $1")
        .bind(role)
        .fetch_optional(db)
        .await?;
    rank.ok_or_else(|| AppError::not_found(format!("Role {role}")))
}

pub async fn find<'e>(db: impl PgExecutor<'e>, role: &str) -> AppResult<Role> {
    let row = sqlx::query_as::<_, Role>("SELECT name, rank FROM roles WHERE name = $1")
        .bind(role)
        .fetch_optional(db)
        .await?;
    row.ok_or_else(|| AppError::not_found(format!("Role {role}")))
}

/// All roles strictly below `requester_rank`, highest first.
pub async fn manageable_roles<'e>(
    db: impl PgExecutor<'e>,
    requester_rank: i32,
) -> AppResult<Vec<Role>> {
    let rows = sqlx::query_as::<_, Role>(
        r#"
        SELECT name, rank
          FROM roles
         WHERE rank < $1
         ORDER BY rank DESC
        "#,
    )
    .bind(requester_rank)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
