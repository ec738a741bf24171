//! Route registration for protected endpoints.

use crate::middleware::authz::AuthzLayer;
use anyhow::{anyhow, Context};
use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{on, MethodFilter};
use axum::Router;
use gatehouse_rbac::{Endpoint, EndpointRegistry, Rbac};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::info;

static BRACED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^/{}]+)\}").expect("static regex"));
static CAPTURED: Lazy<Regex> = Lazy::new(|| Regex::new(r"/[:*]([^/]+)").expect("static regex"));

/// `/widgets/{id}` to axum's `/widgets/:id`.
pub fn axum_path(template: &str) -> String {
    BRACED.replace_all(template, ":$1").into_owned()
}

/// axum's matched route back to the `{var}` template it was registered from.
pub fn template_from_matched(matched: &str) -> String {
    CAPTURED.replace_all(matched, "/{$1}").into_owned()
}

fn method_filter(methods: &[String]) -> anyhow::Result<MethodFilter> {
    methods
        .iter()
        .map(|name| {
            let method = Method::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid HTTP method {name:?}"))?;
            MethodFilter::try_from(method).map_err(|e| anyhow!("unsupported HTTP method {name:?}: {e}"))
        })
        .try_fold(None, |acc: Option<MethodFilter>, filter| {
            let filter = filter?;
            Ok::<_, anyhow::Error>(Some(match acc {
                Some(acc) => acc.or(filter),
                None => filter,
            }))
        })?
        .ok_or_else(|| anyhow!("endpoint has no methods"))
}

/// Builds an axum [`Router`] whose routes are registered as protected
/// resources and guarded by [`AuthzLayer`].
pub struct EndpointRouter<S = ()> {
    router: Router<S>,
    rbac: Arc<Rbac>,
    registry: Arc<EndpointRegistry>,
}

impl<S> EndpointRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(rbac: Arc<Rbac>) -> Self {
        Self {
            router: Router::new(),
            rbac,
            registry: Arc::new(EndpointRegistry::new()),
        }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// Register `endpoint` and route its methods to `handler`.
    pub async fn endpoint<H, T>(mut self, endpoint: Endpoint, handler: H) -> anyhow::Result<Self>
    where
        H: Handler<T, S>,
        T: 'static,
    {
        endpoint.validate()?;
        let filter = method_filter(&endpoint.methods)?;
        let resource = self
            .rbac
            .register_endpoint(&endpoint)
            .await
            .with_context(|| format!("registering endpoint {:?}", endpoint.name))?;
        self.registry.record(&endpoint);

        let path = axum_path(&endpoint.path);
        info!(
            endpoint = %endpoint.name,
            route = %path,
            resource_id = %resource.id,
            "Protected route added"
        );
        self.router = self.router.route(&path, on(filter, handler));
        Ok(self)
    }

    /// Finish the router. Unprotected routes merged afterwards are not
    /// checked.
    pub fn into_router(self) -> Router<S> {
        if self.registry.is_empty() {
            return self.router;
        }
        self.router
            .route_layer(AuthzLayer::new(self.rbac, self.registry))
    }
}
