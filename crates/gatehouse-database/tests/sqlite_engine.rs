//! Engine scenarios against a file-backed SQLite store.

use gatehouse_common_config::DatabaseConfig;
use gatehouse_database::{connect, SqliteStore};
use gatehouse_rbac::access::{ACCESS_DELETE, ACCESS_READ, ACCESS_UPDATE, ACCESS_WRITE};
use gatehouse_rbac::cache::MemoryCache;
use gatehouse_rbac::model::{NewResource, Role};
use gatehouse_rbac::{Endpoint, Rbac, RbacError};
use std::sync::Arc;
use tempfile::TempDir;

async fn open(dir: &TempDir) -> SqliteStore {
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("authz.db").display()),
        max_connections: 4,
        ..Default::default()
    };
    connect(&config).await.unwrap()
}

fn names(roles: &[Role]) -> Vec<&str> {
    roles.iter().map(|r| r.name.as_str()).collect()
}

#[tokio::test]
async fn test_group_and_direct_roles() {
    let dir = TempDir::new().unwrap();
    let rbac = Rbac::uncached(Arc::new(open(&dir).await));

    let admin = rbac.new_role("admin", "administrators", 10).await.unwrap();
    let viewer = rbac.new_role("viewer", "read-only", 1).await.unwrap();
    let widgets = rbac
        .new_resource(NewResource::new(".api.v1.widgets"))
        .await
        .unwrap();
    rbac.add_permission_resource_to_role(&admin, &widgets, &[ACCESS_WRITE, ACCESS_DELETE])
        .await
        .unwrap();
    rbac.add_permission_resource_to_role(&viewer, &widgets, &[ACCESS_READ])
        .await
        .unwrap();

    let team = rbac.new_group("team", "").await.unwrap();
    rbac.add_role_to_group(&team, &[admin.clone()]).await.unwrap();
    rbac.add_group_to_user(&team, "u1", "member").await.unwrap();
    rbac.add_role_to_user(&viewer, "u1", "member").await.unwrap();
    rbac.add_role_to_user(&admin, "u1", "member").await.unwrap();

    let roles = rbac.get_all_roles_for_user_strict("u1", "").await.unwrap();
    assert_eq!(names(&roles), vec!["admin", "viewer"]);

    assert!(rbac
        .user_has_permission_for_resource("u1", "", &widgets, &[ACCESS_DELETE])
        .await
        .unwrap());
    assert!(!rbac
        .user_has_permission_for_resource("u1", "", &widgets, &[ACCESS_UPDATE])
        .await
        .unwrap());
    assert!(!rbac
        .user_has_permission_for_resource("u2", "", &widgets, &[ACCESS_READ])
        .await
        .unwrap());
}

#[tokio::test]
async fn test_idempotent_creation_and_not_found() {
    let dir = TempDir::new().unwrap();
    let rbac = Rbac::uncached(Arc::new(open(&dir).await));

    let first = rbac.new_role("admin", "", 10).await.unwrap();
    let again = rbac.new_role("admin", "", 99).await.unwrap();
    assert_eq!(first.id, again.id);
    assert_eq!(rbac.get_all_roles().await.unwrap().len(), 1);

    let err = rbac.get_role_with_name("ghost").await.unwrap_err();
    assert!(err.is_not_found());

    let gadgets = rbac
        .new_resource(NewResource::new(".api.v1.gadgets"))
        .await
        .unwrap();
    let err = rbac
        .role_has_permission(&first, &gadgets, &[ACCESS_READ])
        .await
        .unwrap_err();
    assert!(matches!(err, RbacError::NotFound { .. }));
}

#[tokio::test]
async fn test_account_scoping() {
    let dir = TempDir::new().unwrap();
    let rbac = Rbac::uncached(Arc::new(open(&dir).await));

    let billing = rbac.new_role("billing-admin", "", 5).await.unwrap();
    rbac.new_account_user_role("acct1", &billing.id, "u2").await.unwrap();

    let scoped = rbac.get_all_roles_for_user("u2", "acct1").await;
    assert!(scoped.is_complete());
    assert_eq!(names(&scoped.roles), vec!["billing-admin"]);
    assert!(rbac
        .get_all_roles_for_user("u2", "")
        .await
        .roles
        .is_empty());

    let accounts = rbac.get_accounts_for_user("u2").await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert!(rbac.get_accounts_for_user("nobody").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let rbac = Rbac::uncached(Arc::new(open(&dir).await));
        let viewer = rbac.new_role("viewer", "", 1).await.unwrap();
        let endpoint = Endpoint::new("widget")
            .path("/api/v1/widgets/{id}")
            .methods(["GET"])
            .roles(0, &[viewer]);
        rbac.register_endpoint(&endpoint).await.unwrap();
    }

    let rbac = Rbac::new(Arc::new(open(&dir).await), Arc::new(MemoryCache::new(100)));
    let viewer = rbac.get_role_with_name("viewer").await.unwrap();
    let resource = rbac.get_resource(".api.v1.widgets.{id}").await.unwrap();
    assert!(resource.public);
    assert!(rbac
        .role_has_permission(&viewer, &resource, &[ACCESS_READ])
        .await
        .unwrap());
}
