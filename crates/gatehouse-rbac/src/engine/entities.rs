//! Entity creation, bindings and lookups.

use super::{ids, require_id, Rbac};
use crate::access::combine_access;
use crate::cache::{cache_aside, keys};
use crate::error::{EntityKind, RbacError, RbacResult};
use crate::model::{
    NewResource, Resource, Role, RoleGroup, RoleResourcePermissions, RolesInGroup, UserGroup,
    UserRole,
};
use crate::resource_id::validate_resource_id;
use crate::store::{matcher, Direction, Query, StoreError, Table};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

impl Rbac {
    // --- creation ---

    /// Create a role, or return the existing role with that name.
    #[instrument(skip(self, description))]
    pub async fn new_role(&self, name: &str, description: &str, priority: i32) -> RbacResult<Role> {
        match self.get_role_with_name(name).await {
            Ok(role) => return Ok(role),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let role = Role {
            name: name.to_string(),
            description: description.to_string(),
            priority,
            ..Default::default()
        };
        let id = self.insert(&format!("new_role(name={})", name), &role).await?;
        info!(role_id = %id, name = name, "Created role");
        self.get_role(&id).await
    }

    /// Create a group, or return the existing group with that name.
    #[instrument(skip(self, description))]
    pub async fn new_group(&self, name: &str, description: &str) -> RbacResult<RoleGroup> {
        match self.get_group_with_name(name).await {
            Ok(group) => return Ok(group),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let group = RoleGroup {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        };
        let id = self.insert(&format!("new_group(name={})", name), &group).await?;
        info!(group_id = %id, name = name, "Created group");
        self.get_group(&id).await
    }

    /// Create a resource under its lower-cased, validated ID, or return the
    /// existing one.
    #[instrument(skip(self), fields(id = %new.id))]
    pub async fn new_resource(&self, new: NewResource) -> RbacResult<Resource> {
        let id = validate_resource_id(&new.id)?;
        match self.get_resource(&id).await {
            Ok(resource) => return Ok(resource),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let resource = Resource {
            id: id.clone(),
            description: new.description,
            resource_type: new.resource_type,
            data: new.data,
            public: new.public,
            ..Default::default()
        };
        match self.insert(&format!("new_resource(id={})", id), &resource).await {
            Ok(_) => info!(resource_id = %id, "Created resource"),
            // Lost a race with a concurrent creator.
            Err(RbacError::Store {
                source: StoreError::Duplicate { .. },
                ..
            }) => {}
            Err(e) => return Err(e),
        }
        self.get_resource(&id).await
    }

    // --- user bindings ---

    #[instrument(skip(self, role), fields(role_id = %role.id))]
    pub async fn add_role_to_user(&self, role: &Role, user_id: &str, user_type: &str) -> RbacResult<()> {
        require_id("role", &role.id)?;
        let operation = format!("add_role_to_user(role_id={}, user_id={})", role.id, user_id);
        let existing = Query::new(Table::UserRole)
            .eq(Table::UserRole.col("user_id"), user_id)
            .eq(Table::UserRole.col("role_id"), role.id.as_str());
        if self.exists(&operation, existing).await? {
            return Ok(());
        }

        let binding = UserRole {
            role_id: role.id.clone(),
            user_id: user_id.to_string(),
            user_type: user_type.to_string(),
            ..Default::default()
        };
        ignore_duplicate(self.insert(&operation, &binding).await)
    }

    #[instrument(skip(self, role), fields(role_id = %role.id))]
    pub async fn remove_role_from_user(&self, role: &Role, user_id: &str) -> RbacResult<()> {
        require_id("role", &role.id)?;
        self.remove(
            &format!("remove_role_from_user(role_id={}, user_id={})", role.id, user_id),
            Table::UserRole,
            matcher([("role_id", role.id.as_str()), ("user_id", user_id)]),
        )
        .await?;
        Ok(())
    }

    /// Make `role` the only direct role of the user.
    #[instrument(skip(self, role), fields(role_id = %role.id))]
    pub async fn replace_role_in_user(&self, role: &Role, user_id: &str, user_type: &str) -> RbacResult<()> {
        require_id("role", &role.id)?;
        self.remove(
            &format!("replace_role_in_user(user_id={})", user_id),
            Table::UserRole,
            matcher([("user_id", user_id)]),
        )
        .await?;
        self.add_role_to_user(role, user_id, user_type).await
    }

    #[instrument(skip(self, group), fields(group_id = %group.id))]
    pub async fn add_group_to_user(&self, group: &RoleGroup, user_id: &str, user_type: &str) -> RbacResult<()> {
        require_id("group", &group.id)?;
        let operation = format!("add_group_to_user(group_id={}, user_id={})", group.id, user_id);
        let existing = Query::new(Table::UserGroup)
            .eq(Table::UserGroup.col("user_id"), user_id)
            .eq(Table::UserGroup.col("group_id"), group.id.as_str());
        if self.exists(&operation, existing).await? {
            return Ok(());
        }

        let binding = UserGroup {
            group_id: group.id.clone(),
            user_id: user_id.to_string(),
            user_type: user_type.to_string(),
            ..Default::default()
        };
        ignore_duplicate(self.insert(&operation, &binding).await)
    }

    #[instrument(skip(self, group), fields(group_id = %group.id))]
    pub async fn remove_group_from_user(&self, group: &RoleGroup, user_id: &str) -> RbacResult<()> {
        require_id("group", &group.id)?;
        self.remove(
            &format!("remove_group_from_user(group_id={}, user_id={})", group.id, user_id),
            Table::UserGroup,
            matcher([("group_id", group.id.as_str()), ("user_id", user_id)]),
        )
        .await?;
        Ok(())
    }

    /// Make `group` the only group of the user.
    #[instrument(skip(self, group), fields(group_id = %group.id))]
    pub async fn replace_group_in_user(&self, group: &RoleGroup, user_id: &str, user_type: &str) -> RbacResult<()> {
        require_id("group", &group.id)?;
        self.remove(
            &format!("replace_group_in_user(user_id={})", user_id),
            Table::UserGroup,
            matcher([("user_id", user_id)]),
        )
        .await?;
        self.add_group_to_user(group, user_id, user_type).await
    }

    // --- group bindings ---

    /// Bind roles to a group, skipping pairs that already exist.
    #[instrument(skip(self, group, roles), fields(group_id = %group.id, roles = roles.len()))]
    pub async fn add_role_to_group(&self, group: &RoleGroup, roles: &[Role]) -> RbacResult<()> {
        require_id("group", &group.id)?;
        for role in roles {
            require_id("role", &role.id)?;
        }
        if roles.is_empty() {
            return Ok(());
        }

        let operation = format!("add_role_to_group(group_id={})", group.id);
        let existing: Vec<RolesInGroup> = self
            .select(
                &operation,
                Query::new(Table::RolesInGroup)
                    .eq(Table::RolesInGroup.col("group_id"), group.id.as_str())
                    .is_in(Table::RolesInGroup.col("role_id"), ids(roles.iter().map(|r| r.id.as_str()))),
            )
            .await?;
        let mut bound: HashSet<String> = existing.into_iter().map(|b| b.role_id).collect();

        for role in roles {
            if !bound.insert(role.id.clone()) {
                continue;
            }
            let binding = RolesInGroup {
                group_id: group.id.clone(),
                role_id: role.id.clone(),
                ..Default::default()
            };
            ignore_duplicate(self.insert(&operation, &binding).await)?;
        }
        Ok(())
    }

    #[instrument(skip(self, group, roles), fields(group_id = %group.id))]
    pub async fn remove_role_from_group(&self, group: &RoleGroup, roles: &[Role]) -> RbacResult<()> {
        require_id("group", &group.id)?;
        for role in roles {
            require_id("role", &role.id)?;
            self.remove(
                &format!("remove_role_from_group(group_id={}, role_id={})", group.id, role.id),
                Table::RolesInGroup,
                matcher([("group_id", group.id.as_str()), ("role_id", role.id.as_str())]),
            )
            .await?;
        }
        Ok(())
    }

    /// Make the group's role set exactly `roles`.
    #[instrument(skip(self, group, roles), fields(group_id = %group.id))]
    pub async fn replace_role_in_group(&self, group: &RoleGroup, roles: &[Role]) -> RbacResult<()> {
        require_id("group", &group.id)?;
        for role in roles {
            require_id("role", &role.id)?;
        }
        self.remove(
            &format!("replace_role_in_group(group_id={})", group.id),
            Table::RolesInGroup,
            matcher([("group_id", group.id.as_str())]),
        )
        .await?;
        self.add_role_to_group(group, roles).await
    }

    // --- permissions ---

    /// Grant `role` the combined access over `resource`. Idempotent on
    /// (role, resource, access).
    #[instrument(skip(self, role, resource), fields(role_id = %role.id, resource_id = %resource.id))]
    pub async fn add_permission_resource_to_role(
        &self,
        role: &Role,
        resource: &Resource,
        access: &[i32],
    ) -> RbacResult<()> {
        require_id("role", &role.id)?;
        require_id("resource", &resource.id)?;
        let combined = combine_access(access);
        let operation = format!(
            "add_permission_resource_to_role(role_id={}, resource_id={}, access={})",
            role.id, resource.id, combined
        );

        let existing = Query::new(Table::RoleResourcePermissions)
            .eq(Table::RoleResourcePermissions.col("role_id"), role.id.as_str())
            .eq(Table::RoleResourcePermissions.col("resource_id"), resource.id.as_str())
            .eq(Table::RoleResourcePermissions.col("access"), combined);
        if self.exists(&operation, existing).await? {
            return Ok(());
        }

        let grant = RoleResourcePermissions {
            role_id: role.id.clone(),
            resource_id: resource.id.clone(),
            access: combined,
            resource_pattern: resource.id.clone(),
            ..Default::default()
        };
        ignore_duplicate(self.insert(&operation, &grant).await)?;
        debug!(role_id = %role.id, resource_id = %resource.id, access = combined, "Granted permission");
        Ok(())
    }

    /// Drop every grant of `role` over each resource.
    #[instrument(skip(self, role, resources), fields(role_id = %role.id))]
    pub async fn remove_permissions_from_role(&self, role: &Role, resources: &[Resource]) -> RbacResult<()> {
        require_id("role", &role.id)?;
        for resource in resources {
            self.remove(
                &format!(
                    "remove_permissions_from_role(role_id={}, resource_id={})",
                    role.id, resource.id
                ),
                Table::RoleResourcePermissions,
                matcher([("role_id", role.id.as_str()), ("resource_id", resource.id.as_str())]),
            )
            .await?;
        }
        Ok(())
    }

    /// Replace every grant of `role` over `resource` with one grant of the
    /// combined access.
    #[instrument(skip(self, role, resource), fields(role_id = %role.id, resource_id = %resource.id))]
    pub async fn replace_permissions_in_role(
        &self,
        role: &Role,
        resource: &Resource,
        access: &[i32],
    ) -> RbacResult<()> {
        self.remove_permissions_from_role(role, std::slice::from_ref(resource)).await?;
        self.add_permission_resource_to_role(role, resource, access).await
    }

    // --- lookups ---

    pub async fn get_role(&self, role_id: &str) -> RbacResult<Role> {
        first(
            self.select(
                &format!("get_role(id={})", role_id),
                Query::new(Table::Role).eq(Table::Role.col("id"), role_id),
            )
            .await?,
            EntityKind::Role,
            role_id,
        )
    }

    /// Look a role up by name.
    ///
    /// Hits are cached for `role_name_ttl`. Misses are not cached, so a role
    /// created right after a miss is found on the next call.
    #[instrument(skip(self))]
    pub async fn get_role_with_name(&self, name: &str) -> RbacResult<Role> {
        let key = keys::role_name(name);
        let (role, outcome): (Role, _) = cache_aside(self.cache.as_ref(), &key, self.options.role_name_ttl, || async {
            first(
                self.select(
                    &format!("get_role_with_name(name={})", name),
                    Query::new(Table::Role).eq(Table::Role.col("name"), name),
                )
                .await?,
                EntityKind::Role,
                name,
            )
        })
        .await?;
        debug!(name = name, cache_hit = outcome.is_hit(), "Role resolved by name");
        Ok(role)
    }

    pub async fn get_group(&self, group_id: &str) -> RbacResult<RoleGroup> {
        first(
            self.select(
                &format!("get_group(id={})", group_id),
                Query::new(Table::RoleGroup).eq(Table::RoleGroup.col("id"), group_id),
            )
            .await?,
            EntityKind::Group,
            group_id,
        )
    }

    pub async fn get_group_with_name(&self, name: &str) -> RbacResult<RoleGroup> {
        first(
            self.select(
                &format!("get_group_with_name(name={})", name),
                Query::new(Table::RoleGroup).eq(Table::RoleGroup.col("name"), name),
            )
            .await?,
            EntityKind::Group,
            name,
        )
    }

    pub async fn get_resource(&self, resource_id: &str) -> RbacResult<Resource> {
        first(
            self.select(
                &format!("get_resource(id={})", resource_id),
                Query::new(Table::Resource).eq(Table::Resource.col("id"), resource_id),
            )
            .await?,
            EntityKind::Resource,
            resource_id,
        )
    }

    /// Resources whose ID matches a regular expression, ordered by ID.
    pub async fn get_resources_with_pattern(&self, pattern: &str) -> RbacResult<Vec<Resource>> {
        self.select(
            &format!("get_resources_with_pattern(pattern={})", pattern),
            Query::new(Table::Resource)
                .matches(Table::Resource.col("id"), pattern)
                .order_by(Table::Resource.col("id"), Direction::Asc),
        )
        .await
    }

    pub async fn get_all_roles(&self) -> RbacResult<Vec<Role>> {
        self.select(
            "get_all_roles",
            Query::new(Table::Role)
                .order_by(Table::Role.col("id"), Direction::Asc)
                .use_cache(),
        )
        .await
    }

    pub async fn get_all_groups(&self) -> RbacResult<Vec<RoleGroup>> {
        self.select(
            "get_all_groups",
            Query::new(Table::RoleGroup)
                .order_by(Table::RoleGroup.col("id"), Direction::Asc)
                .use_cache(),
        )
        .await
    }

    pub async fn get_all_resources(&self) -> RbacResult<Vec<Resource>> {
        self.select(
            "get_all_resources",
            Query::new(Table::Resource)
                .order_by(Table::Resource.col("id"), Direction::Asc)
                .use_cache(),
        )
        .await
    }

    /// Groups the user belongs to, ordered by ID.
    pub async fn get_all_groups_for_user(&self, user_id: &str) -> RbacResult<Vec<RoleGroup>> {
        self.select(
            &format!("get_all_groups_for_user(user_id={})", user_id),
            Query::new(Table::RoleGroup)
                .join(Table::UserGroup, "id", "group_id")
                .eq(Table::UserGroup.col("user_id"), user_id)
                .order_by(Table::RoleGroup.col("id"), Direction::Asc),
        )
        .await
    }

    /// Roles bound to any of the groups.
    pub async fn get_roles_in_group(&self, groups: &[RoleGroup]) -> RbacResult<Vec<Role>> {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            "get_roles_in_group",
            Query::new(Table::Role)
                .join(Table::RolesInGroup, "id", "role_id")
                .is_in(
                    Table::RolesInGroup.col("group_id"),
                    ids(groups.iter().map(|g| g.id.as_str())),
                )
                .use_cache(),
        )
        .await
    }

    /// Memberships of type `user_type` in every group the user belongs to,
    /// oldest first. Includes other members of those groups.
    pub async fn get_user_group_with_type(&self, user_id: &str, user_type: &str) -> RbacResult<Vec<UserGroup>> {
        let groups = self.get_all_groups_for_user(user_id).await?;
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            &format!("get_user_group_with_type(user_id={}, user_type={})", user_id, user_type),
            Query::new(Table::UserGroup)
                .is_in(
                    Table::UserGroup.col("group_id"),
                    ids(groups.iter().map(|g| g.id.as_str())),
                )
                .eq(Table::UserGroup.col("user_type"), user_type)
                .order_by(Table::UserGroup.col("created_timestamp"), Direction::Asc)
                .use_cache(),
        )
        .await
    }

    /// Resources any of the roles holds a grant over.
    pub async fn get_resources_for_role(&self, roles: &[Role]) -> RbacResult<Vec<Resource>> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            "get_resources_for_role",
            Query::new(Table::Resource)
                .join(Table::RoleResourcePermissions, "id", "resource_id")
                .is_in(
                    Table::RoleResourcePermissions.col("role_id"),
                    ids(roles.iter().map(|r| r.id.as_str())),
                )
                .use_cache(),
        )
        .await
    }

    pub async fn get_role_resource_permissions(&self, roles: &[Role]) -> RbacResult<Vec<RoleResourcePermissions>> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            "get_role_resource_permissions",
            Query::new(Table::RoleResourcePermissions)
                .is_in(
                    Table::RoleResourcePermissions.col("role_id"),
                    ids(roles.iter().map(|r| r.id.as_str())),
                )
                .use_cache(),
        )
        .await
    }

    /// Resources reachable through the user's effective roles.
    ///
    /// Uses whatever roles resolved; failed resolution paths are logged.
    pub async fn get_all_resources_for_user(&self, user_id: &str, account_id: &str) -> RbacResult<Vec<Resource>> {
        let resolution = self.get_all_roles_for_user(user_id, account_id).await;
        self.get_resources_for_role(&resolution.roles).await
    }
}

/// First row, or `NotFound`.
pub(super) fn first<T>(rows: Vec<T>, kind: EntityKind, key: &str) -> RbacResult<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| RbacError::not_found(kind, key))
}

/// Treat a duplicate-key insert as success; the row is already there.
pub(super) fn ignore_duplicate(result: RbacResult<String>) -> RbacResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(RbacError::Store {
            source: StoreError::Duplicate { .. },
            ..
        }) => Ok(()),
        Err(e) => Err(e),
    }
}
