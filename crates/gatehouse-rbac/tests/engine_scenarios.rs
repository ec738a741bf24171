//! End-to-end authorization scenarios against the in-memory store.

use gatehouse_rbac::access::{ACCESS_DELETE, ACCESS_READ, ACCESS_UPDATE, ACCESS_WRITE};
use gatehouse_rbac::model::{NewResource, Resource, Role};
use gatehouse_rbac::store::{MemoryStore, Table};
use gatehouse_rbac::{Rbac, RbacError};
use std::sync::Arc;

struct Fixture {
    store: Arc<MemoryStore>,
    rbac: Rbac,
    admin: Role,
    viewer: Role,
    widgets: Resource,
}

/// admin (10) and viewer (1); u1 holds viewer directly and admin through
/// the "team" group.
async fn widgets_fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let rbac = Rbac::uncached(store.clone());

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

    Fixture {
        store,
        rbac,
        admin,
        viewer,
        widgets,
    }
}

fn names(roles: &[Role]) -> Vec<&str> {
    roles.iter().map(|r| r.name.as_str()).collect()
}

#[tokio::test]
async fn test_roles_resolve_in_priority_order() {
    let f = widgets_fixture().await;
    let resolution = f.rbac.get_all_roles_for_user("u1", "").await;
    assert!(resolution.is_complete());
    assert_eq!(names(&resolution.roles), vec!["admin", "viewer"]);
}

#[tokio::test]
async fn test_group_and_direct_grant_allow_delete() {
    let f = widgets_fixture().await;
    assert!(f
        .rbac
        .user_has_permission_for_resource("u1", "", &f.widgets, &[ACCESS_DELETE])
        .await
        .unwrap());
    assert!(f
        .rbac
        .user_has_permission_for_resource("u1", "", &f.widgets, &[ACCESS_READ])
        .await
        .unwrap());
    assert!(!f
        .rbac
        .user_has_permission_for_resource("u1", "", &f.widgets, &[ACCESS_UPDATE])
        .await
        .unwrap());
}

#[tokio::test]
async fn test_role_reachable_twice_is_listed_once() {
    let f = widgets_fixture().await;
    f.rbac.add_role_to_user(&f.admin, "u1", "member").await.unwrap();

    let roles = f.rbac.get_all_roles_for_user_strict("u1", "").await.unwrap();
    assert_eq!(names(&roles), vec!["admin", "viewer"]);
}

#[tokio::test]
async fn test_new_role_twice_keeps_one_row() {
    let f = widgets_fixture().await;
    let again = f.rbac.new_role("admin", "", 99).await.unwrap();
    assert_eq!(again.id, f.admin.id);
    assert_eq!(f.store.len(Table::Role), 2);
}

#[tokio::test]
async fn test_permission_not_found_versus_denied() {
    let f = widgets_fixture().await;
    let gadgets = f
        .rbac
        .new_resource(NewResource::new(".api.v1.gadgets"))
        .await
        .unwrap();

    let err = f
        .rbac
        .role_has_permission(&f.viewer, &gadgets, &[ACCESS_READ])
        .await
        .unwrap_err();
    assert!(matches!(err, RbacError::NotFound { .. }));

    assert!(!f
        .rbac
        .role_has_permission(&f.viewer, &f.widgets, &[ACCESS_DELETE])
        .await
        .unwrap());
    assert!(f
        .rbac
        .role_has_permission(&f.viewer, &f.widgets, &[ACCESS_READ, ACCESS_DELETE])
        .await
        .unwrap());
}

#[tokio::test]
async fn test_account_roles_are_scoped_to_the_account() {
    let f = widgets_fixture().await;
    let billing = f.rbac.new_role("billing-admin", "", 5).await.unwrap();
    f.rbac
        .new_account_user_role("acct1", &billing.id, "u2")
        .await
        .unwrap();

    let scoped = f.rbac.get_all_roles_for_user("u2", "acct1").await;
    assert!(names(&scoped.roles).contains(&"billing-admin"));

    let unscoped = f.rbac.get_all_roles_for_user("u2", "").await;
    assert!(!names(&unscoped.roles).contains(&"billing-admin"));
}

#[tokio::test]
async fn test_account_inherits_its_own_roles() {
    let f = widgets_fixture().await;
    // The account principal itself holds viewer directly.
    f.rbac.add_role_to_user(&f.viewer, "acct1", "account").await.unwrap();

    let roles = f.rbac.get_all_roles_for_user_strict("u3", "acct1").await.unwrap();
    assert_eq!(names(&roles), vec!["viewer"]);
    assert!(f
        .rbac
        .user_has_permission_for_resource("u3", "acct1", &f.widgets, &[ACCESS_READ])
        .await
        .unwrap());
    assert!(!f
        .rbac
        .user_has_permission_for_resource("u3", "", &f.widgets, &[ACCESS_READ])
        .await
        .unwrap());
}

#[tokio::test]
async fn test_account_equal_to_user_terminates() {
    let f = widgets_fixture().await;
    let roles = f.rbac.get_all_roles_for_user_strict("u1", "u1").await.unwrap();
    assert_eq!(names(&roles), vec!["admin", "viewer"]);
}

#[tokio::test]
async fn test_failing_group_path_keeps_direct_roles() {
    let f = widgets_fixture().await;
    f.store.fail_table(Table::UserGroup, "replica unavailable");

    let resolution = f.rbac.get_all_roles_for_user("u1", "").await;
    assert_eq!(names(&resolution.roles), vec!["viewer"]);
    assert_eq!(resolution.errors.len(), 1);
    assert!(resolution.errors[0].to_string().contains("replica unavailable"));

    let strict = f.rbac.get_all_roles_for_user_strict("u1", "").await;
    assert!(matches!(strict, Err(RbacError::Partial { .. })));

    // Fail-closed: the admin grant is unreachable, the viewer grant is not.
    assert!(!f
        .rbac
        .user_has_permission_for_resource("u1", "", &f.widgets, &[ACCESS_DELETE])
        .await
        .unwrap());
    assert!(f
        .rbac
        .user_has_permission_for_resource("u1", "", &f.widgets, &[ACCESS_READ])
        .await
        .unwrap());
}

#[tokio::test]
async fn test_user_has_role_paths() {
    let f = widgets_fixture().await;
    assert!(f.rbac.user_has_role("u1", &f.viewer).await.unwrap());
    assert!(f.rbac.user_has_role("u1", &f.admin).await.unwrap());
    assert!(!f.rbac.user_has_role("u2", &f.admin).await.unwrap());

    f.rbac.new_account_user_role("acct9", &f.admin.id, "u2").await.unwrap();
    assert!(f.rbac.user_has_role("u2", &f.admin).await.unwrap());
}

#[tokio::test]
async fn test_user_has_role_reports_partial_instead_of_false() {
    let f = widgets_fixture().await;
    f.store.fail_table(Table::UserGroup, "replica unavailable");

    assert!(f.rbac.user_has_role("u1", &f.viewer).await.unwrap());
    let err = f.rbac.user_has_role("u1", &f.admin).await.unwrap_err();
    assert!(matches!(err, RbacError::Partial { .. }));
}

#[tokio::test]
async fn test_user_has_all_roles_requires_every_role() {
    let f = widgets_fixture().await;
    let auditor = f.rbac.new_role("auditor", "", 3).await.unwrap();

    assert!(f
        .rbac
        .user_has_all_roles("u1", &[f.admin.clone(), f.viewer.clone()])
        .await
        .unwrap());
    assert!(!f
        .rbac
        .user_has_all_roles("u1", &[f.viewer.clone(), auditor.clone()])
        .await
        .unwrap());

    f.rbac.new_account_user_role("acct1", &auditor.id, "u1").await.unwrap();
    assert!(f
        .rbac
        .user_has_all_roles("u1", &[f.viewer.clone(), auditor])
        .await
        .unwrap());
}

#[tokio::test]
async fn test_resources_for_user() {
    let f = widgets_fixture().await;
    let resources = f.rbac.get_all_resources_for_user("u1", "").await.unwrap();
    let ids: Vec<_> = resources.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![".api.v1.widgets"]);

    assert!(f
        .rbac
        .get_all_resources_for_user("stranger", "")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_any_permission_over_many_resources() {
    let f = widgets_fixture().await;
    let gadgets = f
        .rbac
        .new_resource(NewResource::new(".api.v1.gadgets"))
        .await
        .unwrap();
    let both = [gadgets.clone(), f.widgets.clone()];

    assert!(f
        .rbac
        .user_has_any_permission_for_resource("u1", "", &both, &[ACCESS_WRITE])
        .await
        .unwrap());
    assert!(!f
        .rbac
        .user_has_any_permission_for_resource("u1", "", &[gadgets], &[ACCESS_WRITE])
        .await
        .unwrap());
}

#[tokio::test]
async fn test_role_predicates_agree_on_account_principal_roles() {
    let f = widgets_fixture().await;
    let billing = f.rbac.new_role("billing-admin", "", 5).await.unwrap();
    // u3 is a member of acct1, and acct1 itself holds viewer.
    f.rbac.new_account_user_role("acct1", &billing.id, "u3").await.unwrap();
    f.rbac.add_role_to_user(&f.viewer, "acct1", "account").await.unwrap();

    for role in [&f.viewer, &billing, &f.admin] {
        let has = f.rbac.user_has_role("u3", role).await.unwrap();
        let all = f.rbac.user_has_all_roles("u3", &[role.clone()]).await.unwrap();
        let any = f.rbac.user_has_any_roles("u3", "", &[role.clone()]).await.unwrap();
        assert_eq!(has, all, "{}", role.name);
        assert_eq!(any, all, "{}", role.name);
    }
    assert!(f.rbac.user_has_role("u3", &f.viewer).await.unwrap());
    assert!(!f.rbac.user_has_role("u3", &f.admin).await.unwrap());

    let by_name = Role {
        name: "Viewer".into(),
        ..Default::default()
    };
    assert!(f.rbac.user_has_any_roles("u3", "", &[by_name]).await.unwrap());
}

#[tokio::test]
async fn test_failed_grant_lookup_is_an_error_not_a_denial() {
    let f = widgets_fixture().await;
    f.store
        .fail_table(Table::RoleResourcePermissions, "grants unavailable");

    let err = f
        .rbac
        .user_has_permission_for_resource("u1", "", &f.widgets, &[ACCESS_READ])
        .await
        .unwrap_err();
    assert!(matches!(err, RbacError::Store { .. }), "{err:?}");
    assert!(err.to_string().contains("user_has_permission_for_resource"));

    let err = f
        .rbac
        .role_has_permission(&f.viewer, &f.widgets, &[ACCESS_READ])
        .await
        .unwrap_err();
    assert!(matches!(err, RbacError::Store { .. }), "{err:?}");

    f.store.clear_failures();
    assert!(f
        .rbac
        .user_has_permission_for_resource("u1", "", &f.widgets, &[ACCESS_READ])
        .await
        .unwrap());
}
