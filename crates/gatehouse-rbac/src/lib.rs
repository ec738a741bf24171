//! Role-based access control for Gatehouse.
//!
//! The engine answers one question: may this user, optionally acting within
//! an account, perform an access-bitmask operation on a named resource.
//!
//! - [`access`]: the bitmask algebra.
//! - [`resource_id`]: dotted resource identifiers derived from URL paths.
//! - [`model`]: roles, groups, resources and their bindings.
//! - [`store`]: the persistence contract plus an in-memory implementation.
//! - [`cache`]: cache-aside backends for role lookups.
//! - [`engine`]: role resolution and permission evaluation.
//! - [`endpoint`]: registration of protected HTTP endpoints.
//!
//! ```no_run
//! use gatehouse_rbac::{access::ACCESS_READ, model::NewResource, store::MemoryStore, Rbac};
//! use std::sync::Arc;
//!
//! # async fn demo() -> gatehouse_rbac::RbacResult<()> {
//! let rbac = Rbac::uncached(Arc::new(MemoryStore::new()));
//! let viewer = rbac.new_role("viewer", "read-only access", 1).await?;
//! let docs = rbac.new_resource(NewResource::new(".api.v1.docs")).await?;
//! rbac.add_permission_resource_to_role(&viewer, &docs, &[ACCESS_READ]).await?;
//! rbac.add_role_to_user(&viewer, "user-1", "member").await?;
//!
//! assert!(rbac.user_has_permission_for_resource("user-1", "", &docs, &[ACCESS_READ]).await?);
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod cache;
pub mod cancel;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod model;
pub mod resource_id;
pub mod store;

pub use access::Access;
pub use cancel::{CancellationToken, CancellationWatcher};
pub use endpoint::{Endpoint, EndpointRegistry, RoleAccess};
pub use engine::{Decision, Rbac, RbacOptions, RoleResolution};
pub use error::{EntityKind, RbacError, RbacResult};
