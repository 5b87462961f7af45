use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{CreateUserRequest, UpdateProfileRequest, UpdateUserRequest};
use super::repo;
use super::repo_types::{ManagedUser, NewUser, User, UserChanges};
use crate::access::{ensure_valid_owner, Identity, ScopedUser};
use crate::auth::password::CredentialHasher;
use crate::error::{AppError, AppResult};
use crate::roles;

/// Role given to self-service registrations; they become roots of their own tree.
pub const SELF_SERVICE_ROLE: &str = "Manager";
pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_username(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::validation("Username must not be empty"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(AppError::validation("Username must not contain whitespace"));
    }
    Ok(name.to_string())
}

pub(crate) fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password too short"));
    }
    Ok(())
}

/// Empty input means "no email".
pub(crate) fn normalize_email(raw: Option<&str>) -> AppResult<Option<String>> {
    match raw.map(|e| e.trim().to_lowercase()) {
        None => Ok(None),
        Some(e) if e.is_empty() => Ok(None),
        Some(e) if is_valid_email(&e) => Ok(Some(e)),
        Some(_) => Err(AppError::validation("Invalid email")),
    }
}

/// Self-service registration of a root manager owning itself.
pub async fn register_root(
    db: &PgPool,
    hasher: &dyn CredentialHasher,
    username: &str,
    password: &str,
    email: Option<&str>,
) -> AppResult<User> {
    insert_root(db, hasher, username, password, email, SELF_SERVICE_ROLE).await
}

async fn insert_root(
    db: &PgPool,
    hasher: &dyn CredentialHasher,
    username: &str,
    password: &str,
    email: Option<&str>,
    role: &str,
) -> AppResult<User> {
    let username = normalize_username(username)?;
    validate_password(password)?;
    let email = normalize_email(email)?;

    if repo::find_by_username(db, &username).await?.is_some() {
        warn!(%username, "username already registered");
        return Err(AppError::Duplicate("Username already registered".into()));
    }

    let hash = hasher.hash(password)?;
    let id = Uuid::new_v4();
    // Single statement: the row references itself, no backfill needed.
    let user = repo::insert(
        db,
        NewUser {
            id,
            username: &username,
            password_hash: &hash,
            email: email.as_deref(),
            role,
            owner_id: id,
        },
    )
    .await?;
    info!(user_id = %user.id, username = %user.username, role, "root user registered");
    Ok(user)
}

/// Creates the configured administrator on first start.
pub async fn ensure_root(
    db: &PgPool,
    hasher: &dyn CredentialHasher,
    username: &str,
    password: &str,
    role: &str,
) -> AppResult<Uuid> {
    if let Some(existing) = repo::find_by_username(db, username.trim()).await? {
        return Ok(existing.id);
    }
    roles::repo::rank(db, role).await?;
    let user = insert_root(db, hasher, username, password, None, role).await?;
    Ok(user.id)
}

pub async fn create_user(
    db: &PgPool,
    hasher: &dyn CredentialHasher,
    requester: &Identity,
    req: CreateUserRequest,
) -> AppResult<Uuid> {
    let username = normalize_username(&req.username)?;
    validate_password(&req.password)?;
    let email = normalize_email(req.email.as_deref())?;
    let hash = hasher.hash(&req.password)?;

    let mut tx = db.begin().await?;

    let role = roles::repo::find(&mut *tx, &req.role).await?;
    requester.ensure_can_assign_rank(&role.name, role.rank)?;

    let owner_id = match req.owner_id {
        None => requester.id,
        Some(id) if id == requester.id => id,
        Some(id) => {
            if !requester.is_global() {
                return Err(AppError::forbidden("only global scope may choose another owner"));
            }
            let owner = repo::scoped_by_id(&mut *tx, id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Owner {id}")))?;
            ensure_valid_owner(requester, &owner, role.rank)?;
            id
        }
    };

    if repo::find_by_username(&mut *tx, &username).await?.is_some() {
        return Err(AppError::Duplicate("Username already registered".into()));
    }

    let user = repo::insert(
        &mut *tx,
        NewUser {
            id: Uuid::new_v4(),
            username: &username,
            password_hash: &hash,
            email: email.as_deref(),
            role: &role.name,
            owner_id,
        },
    )
    .await?;
    tx.commit().await?;

    info!(
        user_id = %user.id,
        username = %user.username,
        role = %user.role,
        owner_id = %owner_id,
        created_by = %requester.id,
        "user created"
    );
    Ok(user.id)
}

pub async fn update_user(
    db: &PgPool,
    hasher: &dyn CredentialHasher,
    requester: &Identity,
    target_username: &str,
    req: UpdateUserRequest,
) -> AppResult<User> {
    let password_hash = match req.password.as_deref() {
        Some(pw) => {
            validate_password(pw)?;
            Some(hasher.hash(pw)?)
        }
        None => None,
    };

    let mut tx = db.begin().await?;

    let target = repo::scoped_by_username(&mut *tx, target_username)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User {target_username}")))?;
    requester.ensure_can_manage(&target)?;

    let mut changes = UserChanges {
        password_hash,
        ..Default::default()
    };

    if let Some(name) = req.username.as_deref() {
        changes.username = Some(normalize_username(name)?);
    }
    if let Some(email) = req.email.as_deref() {
        changes.email = Some(normalize_email(Some(email))?);
    }

    let mut new_rank = target.rank;
    if let Some(role_name) = req.role.as_deref() {
        let role = roles::repo::find(&mut *tx, role_name).await?;
        requester.ensure_can_assign_rank(&role.name, role.rank)?;
        if let Some(child_rank) = repo::max_child_rank(&mut *tx, target.id).await? {
            if child_rank >= role.rank {
                return Err(AppError::validation(format!(
                    "user still owns users of rank {child_rank}"
                )));
            }
        }
        new_rank = role.rank;
        changes.role = Some(role.name);
    }

    if req.owner_id == Some(target.id) && target.owner_id != Some(target.id) {
        return Err(AppError::validation("a user cannot become its own owner"));
    }

    let owner_changed = req.owner_id.is_some();
    let owner_id = req.owner_id.or(target.owner_id);
    if let Some(owner_id) = owner_id {
        if (owner_changed || changes.role.is_some()) && owner_id != target.id {
            let owner = if owner_id == requester.id {
                ScopedUser {
                    id: requester.id,
                    owner_id: None,
                    rank: requester.rank,
                }
            } else {
                repo::scoped_by_id(&mut *tx, owner_id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Owner {owner_id}")))?
            };
            ensure_valid_owner(requester, &owner, new_rank)?;
        }
    }
    changes.owner_id = req.owner_id;

    let user = repo::update(&mut *tx, target.id, changes).await?;
    tx.commit().await?;

    info!(user_id = %user.id, updated_by = %requester.id, "user updated");
    Ok(user)
}

/// Refuses while the target still owns users; participants and expenses cascade.
pub async fn delete_user(db: &PgPool, requester: &Identity, target_username: &str) -> AppResult<()> {
    let mut tx = db.begin().await?;

    let target = repo::scoped_by_username(&mut *tx, target_username)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User {target_username}")))?;
    requester.ensure_can_manage(&target)?;

    let owned = repo::subtree_of(&mut *tx, target.id).await?;
    if !owned.is_empty() {
        return Err(AppError::forbidden(format!(
            "user still owns {} users; reassign or delete them first",
            owned.len()
        )));
    }

    if repo::delete(&mut *tx, target.id).await? == 0 {
        return Err(AppError::not_found(format!("User {target_username}")));
    }
    tx.commit().await?;

    info!(user_id = %target.id, deleted_by = %requester.id, "user deleted");
    Ok(())
}

pub async fn update_own_profile(
    db: &PgPool,
    hasher: &dyn CredentialHasher,
    identity: &Identity,
    req: UpdateProfileRequest,
) -> AppResult<User> {
    let mut changes = UserChanges::default();
    if let Some(email) = req.email.as_deref() {
        changes.email = Some(normalize_email(Some(email))?);
    }
    if let Some(pw) = req.password.as_deref().filter(|p| !p.is_empty()) {
        validate_password(pw)?;
        changes.password_hash = Some(hasher.hash(pw)?);
    }
    let user = repo::update(db, identity.id, changes).await?;
    info!(user_id = %user.id, "profile updated");
    Ok(user)
}

pub async fn list_manageable_users(db: &PgPool, requester: &Identity) -> AppResult<Vec<ManagedUser>> {
    repo::list_scoped(db, requester).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_rules() {
        assert!(is_valid_email("bob@example.com"));
        assert!(!is_valid_email("bob@example"));
        assert!(!is_valid_email("bob example.com"));
        assert_eq!(normalize_email(Some("  Bob@Example.COM ")).unwrap().as_deref(), Some("bob@example.com"));
        assert_eq!(normalize_email(Some("   ")).unwrap(), None);
        assert_eq!(normalize_email(None).unwrap(), None);
        assert!(matches!(normalize_email(Some("nope")), Err(AppError::Validation(_))));
    }

    #[test]
    fn username_rules() {
        assert_eq!(normalize_username("  alice ").unwrap(), "alice");
        assert!(normalize_username("   ").is_err());
        assert!(normalize_username("al ice").is_err());
    }

    #[test]
    fn password_length_counts_chars() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("ausreichend").is_ok());
        assert!(validate_password("äöüäöüäö").is_ok());
    }
}
