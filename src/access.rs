//! Row-level scoping rules shared by users, trips and expenses.
//!
//! An [`Identity`] is resolved once per request and passed explicitly into
//! every service call. The checks here are pure; the repos feed them rows.

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// How far an identity's management reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Holder of the highest rank in the role table: every lower-ranked user.
    Global,
    /// Only users directly owned by the identity.
    Owned,
}

/// The authenticated caller.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub rank: i32,
    pub scope: Scope,
}

/// Minimal view of a user needed to decide whether it can be managed.
#[derive(Debug, Clone, FromRow)]
pub struct ScopedUser {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub rank: i32,
}

impl Identity {
    /// Ranks strictly below our own can be assigned.
    pub fn can_assign_rank(&self, rank: i32) -> bool {
        rank < self.rank
    }

    pub fn is_global(&self) -> bool {
        self.scope == Scope::Global
    }

    /// Direct owner of `target` (never of oneself).
    pub fn owns(&self, target: &ScopedUser) -> bool {
        target.id != self.id && target.owner_id == Some(self.id)
    }

    pub fn can_manage(&self, target: &ScopedUser) -> bool {
        target.id != self.id
            && self.can_assign_rank(target.rank)
            && (self.is_global() || self.owns(target))
    }

    pub fn ensure_can_manage(&self, target: &ScopedUser) -> AppResult<()> {
        if self.can_manage(target) {
            Ok(())
        } else {
            Err(AppError::forbidden("user is outside your management scope"))
        }
    }

    pub fn ensure_can_assign_rank(&self, role: &str, rank: i32) -> AppResult<()> {
        if self.can_assign_rank(rank) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "role {role} (rank {rank}) is not below your rank {}",
                self.rank
            )))
        }
    }

    /// Trips are mutated by their creator, or by a global-scope identity.
    pub fn can_administer_trip(&self, created_by: Option<Uuid>) -> bool {
        self.is_global() || created_by == Some(self.id)
    }

    pub fn ensure_can_administer_trip(&self, created_by: Option<Uuid>) -> AppResult<()> {
        if self.can_administer_trip(created_by) {
            Ok(())
        } else {
            Err(AppError::forbidden("trip belongs to another manager"))
        }
    }
}

/// Checks that `owner` may own a user holding `rank`.
///
/// Owners always outrank what they own, which keeps the owner graph acyclic.
/// The owner must be the requester itself or a user the requester manages.
pub fn ensure_valid_owner(
    requester: &Identity,
    owner: &ScopedUser,
    rank: i32,
) -> AppResult<()> {
    if owner.rank <= rank {
        return Err(AppError::validation("owner must outrank the owned user"));
    }
    if owner.id != requester.id && !requester.can_manage(owner) {
        return Err(AppError::forbidden("owner is outside your management scope"));
    }
    Ok(())
}

/// Order-preserving dedup of requested participant ids.
pub fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Every requested id must resolve and be either the requester or a user
/// the requester manages.
pub fn ensure_participants_in_scope(
    requester: &Identity,
    requested: &[Uuid],
    found: &[ScopedUser],
) -> AppResult<()> {
    for id in requested {
        let user = found
            .iter()
            .find(|u| u.id == *id)
            .ok_or_else(|| AppError::not_found(format!("User {id}")))?;
        if user.id != requester.id && !requester.can_manage(user) {
            return Err(AppError::forbidden(format!(
                "user {id} cannot be assigned by you"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn identity(rank: i32, scope: Scope) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: format!("rank{rank}"),
            role: match rank {
                3 => "Administrator",
                2 => "Manager",
                _ => "User",
            }
            .into(),
            rank,
            scope,
        }
    }

    fn user(owner: Option<Uuid>, rank: i32) -> ScopedUser {
        ScopedUser {
            id: Uuid::new_v4(),
            owner_id: owner,
            rank,
        }
    }

    #[test]
    fn manager_manages_only_direct_lower_ranked_children() {
        let alice = identity(2, Scope::Owned);
        let bob = user(Some(alice.id), 1);
        let stranger = user(Some(Uuid::new_v4()), 1);
        assert!(alice.can_manage(&bob));
        assert!(!alice.can_manage(&stranger));
    }

    #[test]
    fn grandchildren_are_not_in_scope() {
        let alice = identity(2, Scope::Owned);
        let child = user(Some(alice.id), 1);
        let grandchild = user(Some(child.id), 0);
        assert!(!alice.can_manage(&grandchild));
    }

    #[test]
    fn owner_of_equal_rank_is_still_refused() {
        let alice = identity(2, Scope::Owned);
        let peer = user(Some(alice.id), 2);
        assert!(!alice.can_manage(&peer));
    }

    #[test]
    fn self_owned_root_does_not_manage_itself() {
        let alice = identity(2, Scope::Owned);
        let me = ScopedUser {
            id: alice.id,
            owner_id: Some(alice.id),
            rank: 1,
        };
        assert!(!alice.can_manage(&me));
    }

    #[test]
    fn global_scope_reaches_any_lower_rank() {
        let admin = identity(3, Scope::Global);
        let someone_elses = user(Some(Uuid::new_v4()), 2);
        let other_admin = user(Some(Uuid::new_v4()), 3);
        assert!(admin.can_manage(&someone_elses));
        assert!(!admin.can_manage(&other_admin));
    }

    #[test]
    fn admin_cannot_assign_its_own_rank() {
        let admin = identity(3, Scope::Global);
        let err = admin.ensure_can_assign_rank("Administrator", 3).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(admin.ensure_can_assign_rank("Manager", 2).is_ok());
    }

    #[test]
    fn owner_must_outrank_and_be_reachable() {
        let admin = identity(3, Scope::Global);
        let manager = user(Some(admin.id), 2);
        assert!(ensure_valid_owner(&admin, &manager, 1).is_ok());
        assert!(matches!(
            ensure_valid_owner(&admin, &manager, 2),
            Err(AppError::Validation(_))
        ));

        let alice = identity(2, Scope::Owned);
        let foreign_manager = user(Some(Uuid::new_v4()), 2);
        assert!(matches!(
            ensure_valid_owner(&alice, &foreign_manager, 1),
            Err(AppError::Forbidden(_))
        ));
        let me = ScopedUser {
            id: alice.id,
            owner_id: Some(alice.id),
            rank: 2,
        };
        assert!(ensure_valid_owner(&alice, &me, 1).is_ok());
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedup_ids(&[a, b, a, a, b]), vec![a, b]);
        assert!(dedup_ids(&[]).is_empty());
    }

    #[test]
    fn participants_must_resolve_and_be_owned() {
        let alice = identity(2, Scope::Owned);
        let bob = user(Some(alice.id), 1);
        let eve = user(Some(Uuid::new_v4()), 1);
        let ghost = Uuid::new_v4();

        assert!(ensure_participants_in_scope(&alice, &[bob.id], &[bob.clone()]).is_ok());
        assert!(matches!(
            ensure_participants_in_scope(&alice, &[ghost], &[bob.clone()]),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            ensure_participants_in_scope(&alice, &[bob.id, eve.id], &[bob, eve]),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn requester_may_join_own_trip() {
        let alice = identity(2, Scope::Owned);
        let me = ScopedUser {
            id: alice.id,
            owner_id: Some(alice.id),
            rank: 2,
        };
        let bob = user(Some(alice.id), 1);
        assert!(ensure_participants_in_scope(&alice, &[alice.id, bob.id], &[me, bob]).is_ok());

        let admin = identity(3, Scope::Global);
        let peer_admin = user(Some(Uuid::new_v4()), 3);
        assert!(matches!(
            ensure_participants_in_scope(&admin, &[peer_admin.id], &[peer_admin]),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn trip_administration_is_creator_or_global() {
        let alice = identity(2, Scope::Owned);
        let admin = identity(3, Scope::Global);
        assert!(alice.can_administer_trip(Some(alice.id)));
        assert!(!alice.can_administer_trip(Some(Uuid::new_v4())));
        assert!(!alice.can_administer_trip(None));
        assert!(admin.can_administer_trip(None));
    }
}
