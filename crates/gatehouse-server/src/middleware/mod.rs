//! Request middleware.

pub mod authz;

pub use authz::{Actor, AuthzAuditEvent, AuthzLayer, AuthzMiddleware};
