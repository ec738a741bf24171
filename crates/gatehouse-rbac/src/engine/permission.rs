//! Permission evaluation.
//!
//! A grant row covers a request when its access mask overlaps the combined
//! requested mask. Denials are `Ok(false)`; only lookups that cannot be
//! answered are errors.

use super::resolve::role_ids;
use super::{require_id, Rbac};
use crate::access::{combine_access, has_access, Access};
use crate::error::{EntityKind, RbacError, RbacResult};
use crate::model::{Resource, Role, RoleResourcePermissions};
use crate::store::{Query, Table};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

/// Audit record of a user-level permission check.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub account_id: String,
    pub resources: Vec<String>,
    pub access: Access,
    pub granted: bool,
    /// Role whose grant allowed the request.
    pub matched_role: Option<String>,
    /// Number of failed role-resolution paths.
    pub degraded_paths: usize,
}

impl Decision {
    fn new(user_id: &str, account_id: &str, resources: &[Resource], access: i32) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            account_id: account_id.to_string(),
            resources: resources.iter().map(|r| r.id.clone()).collect(),
            access: Access::from_bits(access),
            granted: false,
            matched_role: None,
            degraded_paths: 0,
        }
    }

    pub fn log(&self) {
        if self.granted {
            debug!(
                event = "permission_granted",
                user_id = %self.user_id,
                account_id = %self.account_id,
                resources = ?self.resources,
                access = %self.access,
                matched_role = ?self.matched_role,
                "Permission granted"
            );
        } else {
            debug!(
                event = "permission_denied",
                user_id = %self.user_id,
                account_id = %self.account_id,
                resources = ?self.resources,
                access = %self.access,
                degraded_paths = self.degraded_paths,
                "Permission denied"
            );
        }
    }
}

fn resource_ids(resources: &[Resource]) -> Vec<String> {
    resources.iter().map(|r| r.id.clone()).collect()
}

impl Rbac {
    async fn grants(&self, operation: &str, roles: &[Role], resources: &[Resource]) -> RbacResult<Vec<RoleResourcePermissions>> {
        if roles.is_empty() || resources.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            operation,
            Query::new(Table::RoleResourcePermissions)
                .is_in(Table::RoleResourcePermissions.col("role_id"), role_ids(roles))
                .is_in(Table::RoleResourcePermissions.col("resource_id"), resource_ids(resources))
                .use_cache(),
        )
        .await
    }

    /// Whether `role` holds a grant over `resource` overlapping `access`.
    ///
    /// A role without any grant over the resource is `NotFound`.
    #[instrument(skip(self, role, resource), fields(role_id = %role.id, resource_id = %resource.id))]
    pub async fn role_has_permission(&self, role: &Role, resource: &Resource, access: &[i32]) -> RbacResult<bool> {
        require_id("role", &role.id)?;
        require_id("resource", &resource.id)?;
        let combined = combine_access(access);
        let rows = self
            .grants(
                &format!("role_has_permission(role_id={}, resource_id={})", role.id, resource.id),
                std::slice::from_ref(role),
                std::slice::from_ref(resource),
            )
            .await?;
        if rows.is_empty() {
            return Err(RbacError::not_found(
                EntityKind::Permission,
                format!("{}@{}", role.id, resource.id),
            ));
        }
        Ok(rows.iter().any(|row| has_access(combined, row.access)))
    }

    /// Whether `role` holds an overlapping grant over any of `resources`.
    #[instrument(skip(self, role, resources), fields(role_id = %role.id, resources = resources.len()))]
    pub async fn role_has_any_permission(&self, role: &Role, resources: &[Resource], access: &[i32]) -> RbacResult<bool> {
        require_id("role", &role.id)?;
        let combined = combine_access(access);
        let rows = self
            .grants(
                &format!("role_has_any_permission(role_id={})", role.id),
                std::slice::from_ref(role),
                resources,
            )
            .await?;
        Ok(rows.iter().any(|row| has_access(combined, row.access)))
    }

    /// Whether `role` holds an overlapping grant over every one of
    /// `resources`. Vacuously true for no resources.
    #[instrument(skip(self, role, resources), fields(role_id = %role.id, resources = resources.len()))]
    pub async fn role_has_all_permissions(&self, role: &Role, resources: &[Resource], access: &[i32]) -> RbacResult<bool> {
        require_id("role", &role.id)?;
        if resources.is_empty() {
            return Ok(true);
        }
        let combined = combine_access(access);
        let rows = self
            .grants(
                &format!("role_has_all_permissions(role_id={})", role.id),
                std::slice::from_ref(role),
                resources,
            )
            .await?;
        Ok(resources.iter().all(|resource| {
            rows.iter()
                .any(|row| row.resource_id == resource.id && has_access(combined, row.access))
        }))
    }

    /// Whether the user, optionally within an account, may perform `access`
    /// on `resource`.
    pub async fn user_has_permission_for_resource(
        &self,
        user_id: &str,
        account_id: &str,
        resource: &Resource,
        access: &[i32],
    ) -> RbacResult<bool> {
        self.user_has_any_permission_for_resource(user_id, account_id, std::slice::from_ref(resource), access)
            .await
    }

    /// Whether any effective role of the user covers `access` on any of
    /// `resources`.
    ///
    /// Evaluates against whatever roles resolved. Failed resolution paths
    /// only remove roles, so a degraded resolution can deny but never
    /// over-grant.
    #[instrument(skip(self, resources, access), fields(resources = resources.len()))]
    pub async fn user_has_any_permission_for_resource(
        &self,
        user_id: &str,
        account_id: &str,
        resources: &[Resource],
        access: &[i32],
    ) -> RbacResult<bool> {
        let combined = combine_access(access);
        let mut decision = Decision::new(user_id, account_id, resources, combined);

        let resolution = self.get_all_roles_for_user(user_id, account_id).await;
        decision.degraded_paths = resolution.errors.len();

        let rows = self
            .grants(
                &format!(
                    "user_has_permission_for_resource(user_id={}, account_id={})",
                    user_id, account_id
                ),
                &resolution.roles,
                resources,
            )
            .await?;
        self.decide(decision, &resolution.roles, &rows, combined)
    }

    /// Like [`Rbac::user_has_permission_for_resource`], with roles taken
    /// from the account bindings only.
    pub async fn account_user_has_permission_for_resource(
        &self,
        account_id: &str,
        user_id: &str,
        resource: &Resource,
        access: &[i32],
    ) -> RbacResult<bool> {
        self.account_user_has_any_permission_for_resource(account_id, user_id, std::slice::from_ref(resource), access)
            .await
    }

    #[instrument(skip(self, resources, access), fields(resources = resources.len()))]
    pub async fn account_user_has_any_permission_for_resource(
        &self,
        account_id: &str,
        user_id: &str,
        resources: &[Resource],
        access: &[i32],
    ) -> RbacResult<bool> {
        let combined = combine_access(access);
        let decision = Decision::new(user_id, account_id, resources, combined);

        let roles = self.get_account_user_roles(account_id, user_id).await?;
        let rows = self
            .grants(
                &format!(
                    "account_user_has_permission_for_resource(account_id={}, user_id={})",
                    account_id, user_id
                ),
                &roles,
                resources,
            )
            .await?;
        self.decide(decision, &roles, &rows, combined)
    }

    fn decide(
        &self,
        mut decision: Decision,
        roles: &[Role],
        rows: &[RoleResourcePermissions],
        combined: i32,
    ) -> RbacResult<bool> {
        if let Some(row) = rows.iter().find(|row| has_access(combined, row.access)) {
            decision.granted = true;
            decision.matched_role = roles
                .iter()
                .find(|r| r.id == row.role_id)
                .map(|r| r.name.clone())
                .or_else(|| Some(row.role_id.clone()));
        }
        decision.log();
        Ok(decision.granted)
    }
}
