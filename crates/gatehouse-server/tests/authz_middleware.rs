//! Requests through the authorization middleware.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use gatehouse_rbac::access::ACCESS_DELETE;
use gatehouse_rbac::model::Role;
use gatehouse_rbac::store::{MemoryStore, Table};
use gatehouse_rbac::{Endpoint, Rbac};
use gatehouse_server::{Actor, EndpointRouter};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

struct App {
    store: Arc<MemoryStore>,
    router: Router,
}

/// viewer may read a widget; admin may also delete it. u1 is a viewer,
/// u2 an admin.
async fn widgets_app() -> App {
    let store = Arc::new(MemoryStore::new());
    let rbac = Arc::new(Rbac::uncached(store.clone()));
    let viewer = rbac.new_role("viewer", "", 1).await.unwrap();
    let admin = rbac.new_role("admin", "", 10).await.unwrap();
    rbac.add_role_to_user(&viewer, "u1", "").await.unwrap();
    rbac.add_role_to_user(&admin, "u2", "").await.unwrap();

    let roles: [Role; 2] = [viewer, admin.clone()];
    let router = EndpointRouter::new(rbac)
        .endpoint(
            Endpoint::new("widget")
                .path("/api/v1/widgets/{id}")
                .methods(["GET"])
                .roles(0, &roles),
            || async { "widget" },
        )
        .await
        .unwrap()
        .endpoint(
            Endpoint::new("delete widget")
                .path("/api/v1/widgets/{id}")
                .methods(["DELETE"])
                .roles(ACCESS_DELETE, &[admin]),
            || async { StatusCode::NO_CONTENT },
        )
        .await
        .unwrap()
        .into_router();

    App { store, router }
}

fn request(method: &str, uri: &str, actor: Option<Actor>) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    if let Some(actor) = actor {
        req.extensions_mut().insert(actor);
    }
    req
}

async fn error_code(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], Value::Bool(false));
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_registration_creates_one_resource() {
    let app = widgets_app().await;
    let resources = app.store.rows(Table::Resource);
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0]["id"], ".api.v1.widgets.{id}");
    assert_eq!(resources[0]["resource_type"], "endpoint");
}

#[tokio::test]
async fn test_viewer_reads() {
    let app = widgets_app().await;
    let response = app
        .router
        .oneshot(request("GET", "/api/v1/widgets/42", Some(Actor::user("u1"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_viewer_cannot_delete() {
    let app = widgets_app().await;
    let response = app
        .router
        .oneshot(request("DELETE", "/api/v1/widgets/42", Some(Actor::user("u1"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "insufficient_permissions");
}

#[tokio::test]
async fn test_admin_deletes() {
    let app = widgets_app().await;
    let response = app
        .router
        .oneshot(request("DELETE", "/api/v1/widgets/42", Some(Actor::user("u2"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_missing_actor_is_unauthorized() {
    let app = widgets_app().await;
    let response = app
        .router
        .oneshot(request("GET", "/api/v1/widgets/42", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "unauthorized");
}

#[tokio::test]
async fn test_unknown_user_is_denied() {
    let app = widgets_app().await;
    let response = app
        .router
        .oneshot(request("GET", "/api/v1/widgets/42", Some(Actor::user("stranger"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_store_failure_is_a_server_error() {
    let app = widgets_app().await;
    app.store.fail_table(Table::RoleResourcePermissions, "disk full");
    let response = app
        .router
        .oneshot(request("GET", "/api/v1/widgets/42", Some(Actor::user("u1"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(response).await, "authorization_failed");
}

#[tokio::test]
async fn test_invalid_endpoint_is_rejected() {
    let rbac = Arc::new(Rbac::uncached(Arc::new(MemoryStore::new())));
    let result = EndpointRouter::<()>::new(rbac)
        .endpoint(Endpoint::new("broken").path("/x"), || async { "x" })
        .await;
    assert!(result.is_err());
}
