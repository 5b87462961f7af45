use sqlx::PgExecutor;
use uuid::Uuid;

use super::repo_types::{IdentityRow, ManagedUser, NewUser, User, UserChanges};
use crate::access::{Identity, ScopedUser};
use crate::error::{AppError, AppResult};

const USER_COLUMNS: &str = "id, username, password_hash, email, role, owner_id, created_at";

pub async fn find_by_username<'e>(
    db: impl PgExecutor<'e>,
    username: &str,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_by_id<'e>(db: impl PgExecutor<'e>, id: Uuid) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

/// Resolves id → identity with rank and scope.
pub async fn load_identity<'e>(db: impl PgExecutor<'e>, id: Uuid) -> AppResult<Option<Identity>> {
    let row = sqlx::query_as::<_, IdentityRow>(
        r#"
        SELECT u.id, u.username, u.role, r.rank,
               r.rank = (SELECT MAX(rank) FROM roles) AS is_global
          FROM users u
          JOIN roles r ON r.name = u.role
         WHERE u.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row.map(Identity::from))
}

pub async fn scoped_by_username<'e>(
    db: impl PgExecutor<'e>,
    username: &str,
) -> AppResult<Option<ScopedUser>> {
    let row = sqlx::query_as::<_, ScopedUser>(
        r#"
        SELECT u.id, u.owner_id, r.rank
          FROM users u
          JOIN roles r ON r.name = u.role
         WHERE u.username = $1
         FOR UPDATE OF u
        "#,
    )
    .bind(username)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn scoped_by_id<'e>(db: impl PgExecutor<'e>, id: Uuid) -> AppResult<Option<ScopedUser>> {
    let row = sqlx::query_as::<_, ScopedUser>(
        r#"
        SELECT u.id, u.owner_id, r.rank
          FROM users u
          JOIN roles r ON r.name = u.role
         WHERE u.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn scoped_by_ids<'e>(db: impl PgExecutor<'e>, ids: &[Uuid]) -> AppResult<Vec<ScopedUser>> {
    let rows = sqlx::query_as::<_, ScopedUser>(
        r#"
        SELECT u.id, u.owner_id, r.rank
          FROM users u
          JOIN roles r ON r.name = u.role
         WHERE u.id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn insert<'e>(db: impl PgExecutor<'e>, new: NewUser<'_>) -> AppResult<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (id, username, password_hash, email, role, owner_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(new.id)
    .bind(new.username)
    .bind(new.password_hash)
    .bind(new.email)
    .bind(new.role)
    .bind(new.owner_id)
    .fetch_one(db)
    .await?;
    Ok(user)
}

pub async fn update<'e>(db: impl PgExecutor<'e>, id: Uuid, changes: UserChanges) -> AppResult<User> {
    let set_email = changes.email.is_some();
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
           SET username      = COALESCE($2, username),
               password_hash = COALESCE($3, password_hash),
               email         = CASE WHEN $4 THEN $5 ELSE email END,
               role          = COALESCE($6, role),
               owner_id      = COALESCE($7, owner_id)
         WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(changes.username)
    .bind(changes.password_hash)
    .bind(set_email)
    .bind(changes.email.flatten())
    .bind(changes.role)
    .bind(changes.owner_id)
    .fetch_one(db)
    .await?;
    Ok(user)
}

/// Participant and expense rows go with the user through FK cascades.
/// Owned users do not: a row still referenced as owner is refused.
pub async fn delete<'e>(db: impl PgExecutor<'e>, id: Uuid) -> AppResult<u64> {
    let res = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(db)
        .await
        .map_err(still_referenced)?;
    Ok(res.rows_affected())
}

fn still_referenced(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            AppError::forbidden("user is still referenced as an owner")
        }
        other => other.into(),
    }
}

/// Direct children of `manager`; the self-owned row of a root is excluded.
pub async fn subtree_of<'e>(db: impl PgExecutor<'e>, manager: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM users WHERE owner_id = $1 AND id <> $1 ORDER BY username",
    )
    .bind(manager)
    .fetch_all(db)
    .await?;
    Ok(ids)
}

/// Users `requester` may see and manage, highest rank first.
pub async fn list_scoped<'e>(
    db: impl PgExecutor<'e>,
    requester: &Identity,
) -> AppResult<Vec<ManagedUser>> {
    let rows = sqlx::query_as::<_, ManagedUser>(
        r#"
        SELECT u.id, u.username, u.email, u.role, r.rank, u.owner_id
          FROM users u
          JOIN roles r ON r.name = u.role
         WHERE r.rank < $1
           AND u.id <> $3
           AND ($2 OR u.owner_id = $3)
         ORDER BY r.rank DESC, u.username
        "#,
    )
    .bind(requester.rank)
    .bind(requester.is_global())
    .bind(requester.id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Highest rank among users owned by `id`, if it owns any.
pub async fn max_child_rank<'e>(db: impl PgExecutor<'e>, id: Uuid) -> AppResult<Option<i32>> {
    let rank = sqlx::query_scalar::<_, Option<i32>>(
        r#"
        SELECT MAX(r.rank)
          FROM users u
          JOIN roles r ON r.name = u.role
         WHERE u.owner_id = $1 AND u.id <> $1
        "#,
    )
    .bind(id)
    .fetch_one(db)
    .await?;
    Ok(rank)
}
