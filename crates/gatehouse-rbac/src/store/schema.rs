//! Table and column definitions shared by every store backend.

use serde::Serialize;
use std::fmt;

/// Column set by the store when a row is inserted.
pub const CREATED_TIMESTAMP: &str = "created_timestamp";
/// Column set by the store on insert and update.
pub const UPDATED_TIMESTAMP: &str = "updated_timestamp";

/// SQL-ish type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Boolean,
}

/// Static column definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnType,
}

const fn text(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        kind: ColumnType::Text,
    }
}

const fn integer(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        kind: ColumnType::Integer,
    }
}

const fn boolean(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        kind: ColumnType::Boolean,
    }
}

const ROLE: &[ColumnDef] = &[
    text("id"),
    text("name"),
    text("description"),
    boolean("public"),
    integer("priority"),
    text(CREATED_TIMESTAMP),
    text(UPDATED_TIMESTAMP),
];

const ROLE_GROUP: &[ColumnDef] = &[
    text("id"),
    text("name"),
    text("description"),
    boolean("public"),
    text(CREATED_TIMESTAMP),
    text(UPDATED_TIMESTAMP),
];

const ROLES_IN_GROUP: &[ColumnDef] = &[
    text("group_id"),
    text("role_id"),
    text(CREATED_TIMESTAMP),
    text(UPDATED_TIMESTAMP),
];

const RESOURCE: &[ColumnDef] = &[
    text("id"),
    text("description"),
    text("resource_type"),
    text("data"),
    boolean("public"),
    text(CREATED_TIMESTAMP),
    text(UPDATED_TIMESTAMP),
];

const USER_ROLE: &[ColumnDef] = &[
    text("role_id"),
    text("user_id"),
    text("user_type"),
    text(CREATED_TIMESTAMP),
    text(UPDATED_TIMESTAMP),
];

const USER_GROUP: &[ColumnDef] = &[
    text("group_id"),
    text("user_id"),
    text("user_type"),
    text(CREATED_TIMESTAMP),
    text(UPDATED_TIMESTAMP),
];

const ACCOUNT_USER_ROLE: &[ColumnDef] = &[
    text("account_id"),
    text("user_id"),
    text("role_id"),
    text(CREATED_TIMESTAMP),
    text(UPDATED_TIMESTAMP),
];

const ACCOUNT_USER_GROUP: &[ColumnDef] = &[
    text("account_id"),
    text("user_id"),
    text("group_id"),
    text(CREATED_TIMESTAMP),
    text(UPDATED_TIMESTAMP),
];

const ROLE_RESOURCE_PERMISSIONS: &[ColumnDef] = &[
    text("role_id"),
    text("resource_id"),
    integer("access"),
    text("resource_pattern"),
    text(CREATED_TIMESTAMP),
    text(UPDATED_TIMESTAMP),
];

/// The tables of the authorization model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Role,
    RoleGroup,
    RolesInGroup,
    Resource,
    UserRole,
    UserGroup,
    AccountUserRole,
    AccountUserGroup,
    RoleResourcePermissions,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::Role,
        Table::RoleGroup,
        Table::RolesInGroup,
        Table::Resource,
        Table::UserRole,
        Table::UserGroup,
        Table::AccountUserRole,
        Table::AccountUserGroup,
        Table::RoleResourcePermissions,
    ];

    /// Storage name of the table.
    pub fn name(self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::RoleGroup => "role_group",
            Self::RolesInGroup => "roles_in_group",
            Self::Resource => "resource",
            Self::UserRole => "user_role",
            Self::UserGroup => "user_group",
            Self::AccountUserRole => "account_user_role",
            Self::AccountUserGroup => "account_user_group",
            Self::RoleResourcePermissions => "role_resource_permissions",
        }
    }

    pub fn columns(self) -> &'static [ColumnDef] {
        match self {
            Self::Role => ROLE,
            Self::RoleGroup => ROLE_GROUP,
            Self::RolesInGroup => ROLES_IN_GROUP,
            Self::Resource => RESOURCE,
            Self::UserRole => USER_ROLE,
            Self::UserGroup => USER_GROUP,
            Self::AccountUserRole => ACCOUNT_USER_ROLE,
            Self::AccountUserGroup => ACCOUNT_USER_GROUP,
            Self::RoleResourcePermissions => ROLE_RESOURCE_PERMISSIONS,
        }
    }

    /// Columns forming the primary key, in key order.
    pub fn primary_key(self) -> &'static [&'static str] {
        match self {
            Self::Role | Self::RoleGroup | Self::Resource => &["id"],
            Self::RolesInGroup => &["group_id", "role_id"],
            Self::UserRole => &["role_id", "user_id"],
            Self::UserGroup => &["group_id", "user_id"],
            Self::AccountUserRole => &["account_id", "user_id", "role_id"],
            Self::AccountUserGroup => &["account_id", "user_id", "group_id"],
            Self::RoleResourcePermissions => &["role_id", "resource_id", "access"],
        }
    }

    /// Whether the store assigns a UUID to the `id` column when the caller
    /// leaves it empty.
    pub fn generates_id(self) -> bool {
        matches!(self, Self::Role | Self::RoleGroup)
    }

    pub fn column_def(self, name: &str) -> Option<&'static ColumnDef> {
        self.columns().iter().find(|c| c.name == name)
    }

    pub fn has_column(self, name: &str) -> bool {
        self.column_def(name).is_some()
    }

    /// Address a column of this table.
    pub fn col(self, name: &'static str) -> Column {
        Column { table: self, name }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A column qualified by its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Column {
    pub table: Table,
    pub name: &'static str,
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table.name(), self.name)
    }
}
