//! Error types for the RBAC engine.

use crate::cache::CacheError;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type RbacResult<T> = Result<T, RbacError>;

/// The kind of entity a lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Role,
    Group,
    Resource,
    Permission,
    Accounts,
    AccountUserGroup,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Role => "role",
            Self::Group => "group",
            Self::Resource => "resource",
            Self::Permission => "permission",
            Self::Accounts => "accounts",
            Self::AccountUserGroup => "account user group",
        };
        f.write_str(name)
    }
}

/// Engine errors.
///
/// A denied check is `Ok(false)`, never an error.
#[derive(Debug, Error)]
pub enum RbacError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    #[error("{operation} failed: {source}")]
    Store {
        operation: String,
        #[source]
        source: StoreError,
    },

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("role resolution incomplete: {}", format_errors(.errors))]
    Partial { errors: Vec<RbacError> },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

fn format_errors(errors: &[RbacError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl RbacError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(kind: EntityKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Wrap a store failure with the operation that hit it.
    pub fn store(operation: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            operation: operation.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Store { .. } => "store_error",
            Self::Cache(_) => "cache_error",
            Self::Partial { .. } => "partial_resolution",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}
