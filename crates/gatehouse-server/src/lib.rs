//! axum integration for the Gatehouse RBAC engine.
//!
//! Routes are declared as [`gatehouse_rbac::Endpoint`]s on an
//! [`EndpointRouter`]. Each one is registered as a protected resource, and
//! every request is checked by [`AuthzLayer`] against the [`Actor`] that the
//! authentication layer placed in the request extensions.
//!
//! ```no_run
//! use axum::Extension;
//! use gatehouse_rbac::Endpoint;
//! use gatehouse_server::{bootstrap, Actor, EndpointRouter};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = bootstrap::load_config(".")?;
//! let rbac = bootstrap::build_rbac(&config).await?;
//! let viewer = rbac.new_role("viewer", "read-only", 1).await?;
//!
//! let app = EndpointRouter::<()>::new(rbac)
//!     .endpoint(
//!         Endpoint::new("list widgets")
//!             .path("/api/v1/widgets")
//!             .methods(["GET"])
//!             .roles(0, &[viewer]),
//!         || async { "[]" },
//!     )
//!     .await?
//!     .into_router()
//!     .layer(Extension(Actor::user("u1")));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod error;
pub mod middleware;
pub mod router;

pub use error::{ApiError, ApiResult};
pub use middleware::{Actor, AuthzAuditEvent, AuthzLayer, AuthzMiddleware};
pub use router::EndpointRouter;
