//! Account-scoped bindings.

use super::entities::ignore_duplicate;
use super::resolve::any_role_matches;
use super::{require_id, Rbac};
use crate::error::{EntityKind, RbacError, RbacResult};
use crate::model::{AccountUserGroup, AccountUserRole, Role, RoleGroup};
use crate::store::{matcher, Direction, Query, Table};
use std::collections::HashSet;
use tracing::{info, instrument};

impl Rbac {
    /// Bind a role to a user within an account. Idempotent.
    #[instrument(skip(self))]
    pub async fn new_account_user_role(
        &self,
        account_id: &str,
        role_id: &str,
        user_id: &str,
    ) -> RbacResult<AccountUserRole> {
        require_id("role", role_id)?;
        let binding = AccountUserRole {
            account_id: account_id.to_string(),
            user_id: user_id.to_string(),
            role_id: role_id.to_string(),
            ..Default::default()
        };
        let operation = format!(
            "new_account_user_role(account_id={}, role_id={}, user_id={})",
            account_id, role_id, user_id
        );
        let existing = Query::new(Table::AccountUserRole)
            .eq(Table::AccountUserRole.col("account_id"), account_id)
            .eq(Table::AccountUserRole.col("user_id"), user_id)
            .eq(Table::AccountUserRole.col("role_id"), role_id);
        if !self.exists(&operation, existing).await? {
            ignore_duplicate(self.insert(&operation, &binding).await)?;
            info!(account_id = account_id, user_id = user_id, role_id = role_id, "Bound account role");
        }
        Ok(binding)
    }

    #[instrument(skip(self))]
    pub async fn delete_account_user_role(&self, account_id: &str, role_id: &str, user_id: &str) -> RbacResult<()> {
        self.remove(
            &format!(
                "delete_account_user_role(account_id={}, role_id={}, user_id={})",
                account_id, role_id, user_id
            ),
            Table::AccountUserRole,
            matcher([("account_id", account_id), ("user_id", user_id), ("role_id", role_id)]),
        )
        .await?;
        Ok(())
    }

    /// Bind a group to a user within an account. Idempotent.
    #[instrument(skip(self))]
    pub async fn new_account_user_group(
        &self,
        account_id: &str,
        group_id: &str,
        user_id: &str,
    ) -> RbacResult<AccountUserGroup> {
        require_id("group", group_id)?;
        let binding = AccountUserGroup {
            account_id: account_id.to_string(),
            user_id: user_id.to_string(),
            group_id: group_id.to_string(),
            ..Default::default()
        };
        let operation = format!(
            "new_account_user_group(account_id={}, group_id={}, user_id={})",
            account_id, group_id, user_id
        );
        let existing = Query::new(Table::AccountUserGroup)
            .eq(Table::AccountUserGroup.col("account_id"), account_id)
            .eq(Table::AccountUserGroup.col("user_id"), user_id)
            .eq(Table::AccountUserGroup.col("group_id"), group_id);
        if !self.exists(&operation, existing).await? {
            ignore_duplicate(self.insert(&operation, &binding).await)?;
            info!(account_id = account_id, user_id = user_id, group_id = group_id, "Bound account group");
        }
        Ok(binding)
    }

    #[instrument(skip(self))]
    pub async fn delete_account_user_group(&self, account_id: &str, group_id: &str, user_id: &str) -> RbacResult<()> {
        self.remove(
            &format!(
                "delete_account_user_group(account_id={}, group_id={}, user_id={})",
                account_id, group_id, user_id
            ),
            Table::AccountUserGroup,
            matcher([("account_id", account_id), ("user_id", user_id), ("group_id", group_id)]),
        )
        .await?;
        Ok(())
    }

    /// Group bindings of a user within an account.
    pub async fn get_account_user_group(&self, account_id: &str, user_id: &str) -> RbacResult<Vec<AccountUserGroup>> {
        self.select(
            &format!("get_account_user_group(account_id={}, user_id={})", account_id, user_id),
            Query::new(Table::AccountUserGroup)
                .eq(Table::AccountUserGroup.col("account_id"), account_id)
                .eq(Table::AccountUserGroup.col("user_id"), user_id)
                .use_cache(),
        )
        .await
    }

    /// Every group binding within an account.
    pub async fn get_all_account_groups(&self, account_id: &str) -> RbacResult<Vec<AccountUserGroup>> {
        self.select(
            &format!("get_all_account_groups(account_id={})", account_id),
            Query::new(Table::AccountUserGroup).eq(Table::AccountUserGroup.col("account_id"), account_id),
        )
        .await
    }

    /// Every role binding within an account.
    pub async fn get_all_account_users(&self, account_id: &str) -> RbacResult<Vec<AccountUserRole>> {
        self.select(
            &format!("get_all_account_users(account_id={})", account_id),
            Query::new(Table::AccountUserRole).eq(Table::AccountUserRole.col("account_id"), account_id),
        )
        .await
    }

    /// Account role bindings of a user; `NotFound` when there are none.
    pub async fn get_accounts_for_user(&self, user_id: &str) -> RbacResult<Vec<AccountUserRole>> {
        let rows: Vec<AccountUserRole> = self
            .select(
                &format!("get_accounts_for_user(user_id={})", user_id),
                Query::new(Table::AccountUserRole).eq(Table::AccountUserRole.col("user_id"), user_id),
            )
            .await?;
        if rows.is_empty() {
            return Err(RbacError::not_found(EntityKind::Accounts, user_id));
        }
        Ok(rows)
    }

    /// Roles of a user within an account, bound directly or through account
    /// groups, ordered by priority descending.
    pub async fn get_account_user_roles(&self, account_id: &str, user_id: &str) -> RbacResult<Vec<Role>> {
        let operation = format!("get_account_user_roles(account_id={}, user_id={})", account_id, user_id);
        let (groups, bindings) = futures::join!(
            self.get_account_user_group(account_id, user_id),
            self.select::<AccountUserRole>(
                &operation,
                Query::new(Table::AccountUserRole)
                    .eq(Table::AccountUserRole.col("account_id"), account_id)
                    .eq(Table::AccountUserRole.col("user_id"), user_id)
                    .use_cache(),
            ),
        );
        self.roles_from_bindings(&operation, bindings?, groups?).await
    }

    /// Roles bound to anyone within an account.
    pub async fn get_all_account_user_roles(&self, account_id: &str) -> RbacResult<Vec<Role>> {
        let operation = format!("get_all_account_user_roles(account_id={})", account_id);
        let groups = self.get_all_account_groups(account_id).await?;
        let bindings = self.get_all_account_users(account_id).await?;
        self.roles_from_bindings(&operation, bindings, groups).await
    }

    async fn roles_from_bindings(
        &self,
        operation: &str,
        bindings: Vec<AccountUserRole>,
        groups: Vec<AccountUserGroup>,
    ) -> RbacResult<Vec<Role>> {
        let groups: Vec<RoleGroup> = groups.into_iter().map(|g| RoleGroup::with_id(g.group_id)).collect();
        let group_roles = self.get_roles_in_group(&groups).await?;

        let role_ids: Vec<String> = bindings
            .into_iter()
            .map(|b| b.role_id)
            .chain(group_roles.into_iter().map(|r| r.id))
            .collect();
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.select(
            operation,
            Query::new(Table::Role)
                .is_in(Table::Role.col("id"), role_ids)
                .order_by(Table::Role.col("priority"), Direction::Desc)
                .use_cache(),
        )
        .await
    }

    /// Whether the user holds `role` within the account, directly or through
    /// an account group.
    #[instrument(skip(self, role), fields(role_id = %role.id))]
    pub async fn account_user_has_role(&self, account_id: &str, user_id: &str, role: &Role) -> RbacResult<bool> {
        require_id("role", &role.id)?;
        let direct = Query::new(Table::AccountUserRole)
            .eq(Table::AccountUserRole.col("account_id"), account_id)
            .eq(Table::AccountUserRole.col("user_id"), user_id)
            .eq(Table::AccountUserRole.col("role_id"), role.id.as_str());
        if self
            .exists(
                &format!(
                    "account_user_has_role(account_id={}, user_id={}, role_id={})",
                    account_id, user_id, role.id
                ),
                direct,
            )
            .await?
        {
            return Ok(true);
        }

        let via_group = Query::new(Table::RolesInGroup)
            .join(Table::AccountUserGroup, "group_id", "group_id")
            .eq(Table::AccountUserGroup.col("account_id"), account_id)
            .eq(Table::AccountUserGroup.col("user_id"), user_id)
            .eq(Table::RolesInGroup.col("role_id"), role.id.as_str());
        self.exists(
            &format!(
                "account_user_has_role_via_group(account_id={}, user_id={}, role_id={})",
                account_id, user_id, role.id
            ),
            via_group,
        )
        .await
    }

    /// Whether every role is bound to the user within the account.
    #[instrument(skip(self, roles), fields(roles = roles.len()))]
    pub async fn account_user_has_all_roles(&self, account_id: &str, user_id: &str, roles: &[Role]) -> RbacResult<bool> {
        for role in roles {
            require_id("role", &role.id)?;
        }
        if roles.is_empty() {
            return Ok(true);
        }
        let held = self.get_account_user_roles(account_id, user_id).await?;
        let held: HashSet<&str> = held.iter().map(|r| r.id.as_str()).collect();
        Ok(roles.iter().all(|r| held.contains(r.id.as_str())))
    }

    /// Whether any of the roles is bound to the user within the account,
    /// matched by ID or by name, case-insensitively.
    #[instrument(skip(self, roles), fields(roles = roles.len()))]
    pub async fn account_user_has_any_roles(&self, account_id: &str, user_id: &str, roles: &[Role]) -> RbacResult<bool> {
        if roles.iter().all(|r| r.id.is_empty() && r.name.is_empty()) {
            return Ok(false);
        }
        let held = self.get_account_user_roles(account_id, user_id).await?;
        Ok(any_role_matches(&held, roles))
    }
}
