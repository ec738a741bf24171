//! Authorization middleware layer.
//!
//! Must run after routing (`Router::route_layer`) so the matched route
//! template is available.

use super::audit::AuthzAuditEvent;
use super::types::Actor;
use crate::error::ApiError;
use crate::router::template_from_matched;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    response::{IntoResponse, Response},
};
use gatehouse_rbac::access::http_method_to_access_code;
use gatehouse_rbac::model::Resource;
use gatehouse_rbac::{EndpointRegistry, Rbac};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

#[derive(Clone)]
pub struct AuthzLayer {
    rbac: Arc<Rbac>,
    registry: Arc<EndpointRegistry>,
}

impl AuthzLayer {
    pub fn new(rbac: Arc<Rbac>, registry: Arc<EndpointRegistry>) -> Self {
        Self { rbac, registry }
    }
}

impl<S> Layer<S> for AuthzLayer {
    type Service = AuthzMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthzMiddleware {
            inner,
            rbac: self.rbac.clone(),
            registry: self.registry.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthzMiddleware<S> {
    inner: S,
    rbac: Arc<Rbac>,
    registry: Arc<EndpointRegistry>,
}

/// What the check needs from a request, captured before the first await.
struct Check {
    actor: Option<Actor>,
    method: String,
    route: String,
}

impl Check {
    fn from_request(req: &Request<Body>) -> Self {
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| template_from_matched(matched.as_str()))
            .unwrap_or_else(|| req.uri().path().to_string());
        Self {
            actor: req.extensions().get::<Actor>().cloned(),
            method: req.method().as_str().to_string(),
            route,
        }
    }

    async fn run(self, rbac: &Rbac, registry: &EndpointRegistry) -> Result<(), ApiError> {
        let access = http_method_to_access_code(&[self.method.as_str()]);
        let event = AuthzAuditEvent::new(self.actor.as_ref(), &self.method, &self.route, access);

        let Some(actor) = self.actor else {
            event.denied("unauthenticated").log();
            return Err(ApiError::Unauthorized);
        };
        let Some(resource_id) = registry.resource_id_for(&self.route) else {
            event.denied("route is not registered").log();
            return Err(ApiError::InsufficientPermissions);
        };

        let event = event.resource(resource_id.clone());
        let resource = Resource::with_id(resource_id);
        match rbac
            .user_has_permission_for_resource(&actor.user_id, &actor.account_id, &resource, &[access])
            .await
        {
            Ok(true) => {
                event.granted().log();
                Ok(())
            }
            Ok(false) => {
                event.denied("no role grants the requested access").log();
                Err(ApiError::InsufficientPermissions)
            }
            Err(err) => {
                event.denied(err.to_string()).log();
                Err(ApiError::Authorization(err))
            }
        }
    }
}

impl<S> Service<Request<Body>> for AuthzMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Keep the service that was polled ready.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let rbac = self.rbac.clone();
        let registry = self.registry.clone();
        let check = Check::from_request(&req);

        Box::pin(async move {
            match check.run(&rbac, &registry).await {
                Ok(()) => inner.call(req).await,
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}
