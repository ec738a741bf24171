//! Effective-role resolution.
//!
//! A user's effective roles are the union of four binding paths:
//!
//! 1. direct `UserRole` rows,
//! 2. `UserGroup` memberships expanded through `RolesInGroup`,
//! 3. account-scoped `AccountUserRole` rows and `AccountUserGroup` groups,
//! 4. the roles of the account itself, resolved as if it were a user.
//!
//! Duplicates collapse onto the first occurrence, then the list is sorted by
//! priority, highest first, keeping path order among equal priorities.

use super::{ids, Rbac};
use crate::cache::{cache_get_or_miss, cache_set_or_log, keys};
use crate::error::{EntityKind, RbacError, RbacResult};
use crate::model::Role;
use crate::store::{Query, Table};
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

/// Outcome of role resolution.
///
/// A failing path contributes no roles and leaves its error here, so a
/// resolution with errors can only under-report roles.
#[derive(Debug, Default)]
pub struct RoleResolution {
    pub roles: Vec<Role>,
    pub errors: Vec<RbacError>,
}

impl RoleResolution {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn role_ids(&self) -> HashSet<&str> {
        self.roles.iter().map(|r| r.id.as_str()).collect()
    }

    /// The roles, or `Partial` if any path failed.
    pub fn into_strict(self) -> RbacResult<Vec<Role>> {
        if self.errors.is_empty() {
            Ok(self.roles)
        } else {
            Err(RbacError::Partial { errors: self.errors })
        }
    }

    fn log_errors(&self, user_id: &str, account_id: &str) {
        for error in &self.errors {
            warn!(user_id = user_id, account_id = account_id, error = %error, "Role resolution path failed");
        }
    }
}

/// Dedup by ID keeping the first occurrence, then stable-sort by priority
/// descending.
fn compose(roles: Vec<Role>) -> Vec<Role> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Role> = roles.into_iter().filter(|r| seen.insert(r.id.clone())).collect();
    unique.sort_by(|a, b| b.priority.cmp(&a.priority));
    unique
}

/// Case-insensitive match by ID or by name.
fn role_matches(held: &Role, wanted: &Role) -> bool {
    let same = |a: &str, b: &str| !a.is_empty() && a.to_lowercase() == b.to_lowercase();
    same(&held.id, &wanted.id) || same(&held.name, &wanted.name)
}

pub(super) fn any_role_matches(held: &[Role], wanted: &[Role]) -> bool {
    held.iter().any(|h| wanted.iter().any(|w| role_matches(h, w)))
}

/// `Ok(false)` when nothing failed, `Partial` otherwise.
fn negative(errors: Vec<RbacError>) -> RbacResult<bool> {
    if errors.is_empty() {
        Ok(false)
    } else {
        Err(RbacError::Partial { errors })
    }
}

impl Rbac {
    async fn direct_roles(&self, user_id: &str) -> RbacResult<Vec<Role>> {
        self.select(
            &format!("direct_roles(user_id={})", user_id),
            Query::new(Table::Role)
                .join(Table::UserRole, "id", "role_id")
                .eq(Table::UserRole.col("user_id"), user_id),
        )
        .await
    }

    async fn group_roles(&self, user_id: &str) -> RbacResult<Vec<Role>> {
        let groups = self.get_all_groups_for_user(user_id).await?;
        self.get_roles_in_group(&groups).await
    }

    /// Resolve the effective roles of a user, optionally within an account.
    ///
    /// Never fails as a whole: path failures are collected in
    /// [`RoleResolution::errors`]. Paths 1 to 3 run concurrently and are
    /// composed in path order. The account is then expanded as a principal
    /// of its own unless it was already expanded, which stops
    /// `account == user`.
    #[instrument(skip(self))]
    pub async fn get_all_roles_for_user(&self, user_id: &str, account_id: &str) -> RoleResolution {
        let mut visited: HashSet<String> = HashSet::new();
        let mut roles = Vec::new();
        let mut errors = Vec::new();
        let mut principal = user_id.to_string();
        let mut account = account_id.to_string();

        loop {
            visited.insert(principal.clone());
            let (direct, grouped, scoped) = futures::join!(
                self.direct_roles(&principal),
                self.group_roles(&principal),
                self.get_account_user_roles(&account, &principal),
            );
            for path in [direct, grouped, scoped] {
                match path {
                    Ok(found) => roles.extend(found),
                    Err(e) => errors.push(e),
                }
            }

            if account.is_empty() {
                break;
            }
            if visited.contains(&account) {
                debug!(account_id = %account, "Account already expanded, skipping");
                break;
            }
            principal = std::mem::take(&mut account);
        }

        let resolution = RoleResolution {
            roles: compose(roles),
            errors,
        };
        resolution.log_errors(user_id, account_id);
        resolution
    }

    /// Like [`Rbac::get_all_roles_for_user`], failing with `Partial` if any
    /// path failed.
    pub async fn get_all_roles_for_user_strict(&self, user_id: &str, account_id: &str) -> RbacResult<Vec<Role>> {
        self.get_all_roles_for_user(user_id, account_id).await.into_strict()
    }

    /// Distinct account IDs the user holds account roles in. Having none is
    /// not an error here.
    pub(super) async fn account_ids_for_user(&self, user_id: &str) -> RbacResult<Vec<String>> {
        match self.get_accounts_for_user(user_id).await {
            Ok(rows) => {
                let mut seen = HashSet::new();
                Ok(rows
                    .into_iter()
                    .map(|r| r.account_id)
                    .filter(|a| seen.insert(a.clone()))
                    .collect())
            }
            Err(RbacError::NotFound {
                kind: EntityKind::Accounts,
                ..
            }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Whether the user holds `role` directly, through a group, or in the
    /// effective set of any of their accounts.
    ///
    /// Returns `Partial` instead of `false` when a path failed and no path
    /// matched.
    #[instrument(skip(self, role), fields(role_id = %role.id))]
    pub async fn user_has_role(&self, user_id: &str, role: &Role) -> RbacResult<bool> {
        super::require_id("role", &role.id)?;
        let mut errors = Vec::new();

        let direct = Query::new(Table::UserRole)
            .eq(Table::UserRole.col("user_id"), user_id)
            .eq(Table::UserRole.col("role_id"), role.id.as_str());
        match self.exists(&format!("user_has_role(user_id={}, role_id={})", user_id, role.id), direct).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => errors.push(e),
        }

        let via_group = Query::new(Table::RolesInGroup)
            .join(Table::UserGroup, "group_id", "group_id")
            .eq(Table::UserGroup.col("user_id"), user_id)
            .eq(Table::RolesInGroup.col("role_id"), role.id.as_str());
        match self
            .exists(&format!("user_has_role_via_group(user_id={}, role_id={})", user_id, role.id), via_group)
            .await
        {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => errors.push(e),
        }

        match self.account_ids_for_user(user_id).await {
            Ok(accounts) => {
                for account in accounts {
                    let resolution = self.get_all_roles_for_user(user_id, &account).await;
                    if resolution.role_ids().contains(role.id.as_str()) {
                        return Ok(true);
                    }
                    errors.extend(resolution.errors);
                }
            }
            Err(e) => errors.push(e),
        }

        negative(errors)
    }

    /// Whether every role is in the effective set of the user, or in the
    /// effective set of the user within one of their accounts.
    #[instrument(skip(self, roles), fields(roles = roles.len()))]
    pub async fn user_has_all_roles(&self, user_id: &str, roles: &[Role]) -> RbacResult<bool> {
        for role in roles {
            super::require_id("role", &role.id)?;
        }
        let wanted: HashSet<&str> = roles.iter().map(|r| r.id.as_str()).collect();
        if wanted.is_empty() {
            return Ok(true);
        }

        let mut errors = Vec::new();
        let mut scopes = vec![String::new()];
        match self.account_ids_for_user(user_id).await {
            Ok(accounts) => scopes.extend(accounts),
            Err(e) => errors.push(e),
        }

        for account in scopes {
            let mut resolution = self.get_all_roles_for_user(user_id, &account).await;
            if wanted.is_subset(&resolution.role_ids()) {
                return Ok(true);
            }
            errors.append(&mut resolution.errors);
        }

        negative(errors)
    }

    /// Whether the user holds any of `roles`, matched by ID or by name,
    /// case-insensitively.
    ///
    /// The effective-role set for `(user, account)` is cached for
    /// `user_roles_ttl`. A cached set can be stale in both directions: a
    /// revoked role keeps matching until the entry expires. A cached set
    /// that does not match is re-derived from the store before answering, so
    /// newly granted roles are seen at once. Accounts of the user are checked
    /// last.
    #[instrument(skip(self, roles), fields(roles = roles.len()))]
    pub async fn user_has_any_roles(&self, user_id: &str, account_id: &str, roles: &[Role]) -> RbacResult<bool> {
        let key = keys::user_roles(user_id, account_id);
        let mut errors = Vec::new();

        let cached = cache_get_or_miss::<Vec<Role>>(self.cache.as_ref(), &key).await;
        if let Some(held) = &cached {
            if any_role_matches(held, roles) {
                return Ok(true);
            }
            debug!(key = %key, "Cached roles did not match, re-deriving from store");
        }

        let resolution = self.get_all_roles_for_user(user_id, account_id).await;
        if cached.is_none() && resolution.is_complete() {
            cache_set_or_log(self.cache.as_ref(), &key, &resolution.roles, self.options.user_roles_ttl).await;
        }
        if any_role_matches(&resolution.roles, roles) {
            return Ok(true);
        }
        errors.extend(resolution.errors);

        match self.account_ids_for_user(user_id).await {
            Ok(accounts) => {
                for account in accounts.iter().filter(|a| a.as_str() != account_id) {
                    let resolution = self.get_all_roles_for_user(user_id, account).await;
                    if any_role_matches(&resolution.roles, roles) {
                        return Ok(true);
                    }
                    errors.extend(resolution.errors);
                }
            }
            Err(e) => errors.push(e),
        }

        negative(errors)
    }
}

/// IDs of the roles, for `In` predicates.
pub(super) fn role_ids(roles: &[Role]) -> Vec<String> {
    ids(roles.iter().map(|r| r.id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: &str, name: &str, priority: i32) -> Role {
        Role {
            id: id.into(),
            name: name.into(),
            priority,
            ..Default::default()
        }
    }

    #[test]
    fn test_compose_dedups_first_wins_and_sorts() {
        let roles = vec![
            role("v", "viewer", 1),
            role("a", "admin", 10),
            role("v", "viewer-duplicate", 50),
            role("e", "editor", 1),
        ];
        let composed = compose(roles);
        let names: Vec<_> = composed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["admin", "viewer", "editor"]);
    }

    #[test]
    fn test_role_matching() {
        let held = role("R1", "Admin", 0);
        let cases = vec![
            (Role::with_id("r1"), true),
            (Role::with_id("r2"), false),
            (role("", "ADMIN", 0), true),
            (role("", "", 0), false),
            (role("x", "viewer", 0), false),
        ];
        for (wanted, expected) in cases {
            assert_eq!(role_matches(&held, &wanted), expected, "{:?}", wanted);
        }
    }

    #[test]
    fn test_into_strict() {
        let ok = RoleResolution {
            roles: vec![role("a", "a", 0)],
            errors: vec![],
        };
        assert_eq!(ok.into_strict().unwrap().len(), 1);

        let partial = RoleResolution {
            roles: vec![role("a", "a", 0)],
            errors: vec![RbacError::Cancelled],
        };
        assert!(matches!(partial.into_strict(), Err(RbacError::Partial { .. })));
    }
}
