//! Per-request authorization against registered endpoints.

pub mod audit;
pub mod layer;
pub mod types;

pub use audit::AuthzAuditEvent;
pub use layer::{AuthzLayer, AuthzMiddleware};
pub use types::Actor;
