//! Protected endpoint declarations and their registration as resources.

use crate::access::{combine_access, http_method_to_access_code};
use crate::engine::Rbac;
use crate::error::{RbacError, RbacResult};
use crate::model::{NewResource, Resource, Role};
use crate::resource_id::{path_variables, template_path, url_to_resource_id};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, instrument};

/// Resource type of registered endpoints.
pub const ENDPOINT_RESOURCE_TYPE: &str = "endpoint";

/// Access a role is granted over an endpoint. Zero means "derive from the
/// endpoint's methods".
#[derive(Debug, Clone, Serialize)]
pub struct RoleAccess {
    pub role: Role,
    pub access: i32,
}

/// A protected HTTP endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub path: String,
    pub role_access: BTreeMap<String, RoleAccess>,
    pub query_params: Vec<String>,
    pub methods: Vec<String>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Grant `access` to each role. Adding a role twice ORs the access.
    pub fn roles(mut self, access: i32, roles: &[Role]) -> Self {
        for role in roles {
            self.role_access
                .entry(role.id.clone())
                .and_modify(|existing| existing.access = combine_access(&[existing.access, access]))
                .or_insert_with(|| RoleAccess {
                    role: role.clone(),
                    access,
                });
        }
        self
    }

    pub fn query_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_params.extend(names.into_iter().map(Into::into));
        self
    }

    /// Resource ID this endpoint registers under.
    pub fn resource_id(&self) -> String {
        url_to_resource_id(&self.path)
    }

    /// Access derived from the HTTP methods.
    pub fn method_access(&self) -> i32 {
        let methods: Vec<&str> = self.methods.iter().map(String::as_str).collect();
        http_method_to_access_code(&methods)
    }

    /// Check required fields, listing every missing one.
    pub fn validate(&self) -> RbacResult<()> {
        let mut missing = Vec::new();
        if self.path.is_empty() {
            missing.push("path");
        }
        if self.role_access.is_empty() {
            missing.push("role_access");
        }
        if self.methods.is_empty() {
            missing.push("methods");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RbacError::validation(format!(
                "endpoint {:?} missing required fields: {}",
                self.name,
                missing.join(",")
            )))
        }
    }
}

/// Route templates and path variables of registered endpoints.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    variables: RwLock<BTreeSet<String>>,
    resources: RwLock<HashMap<String, String>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the endpoint's path variables and resource ID.
    pub fn record(&self, endpoint: &Endpoint) {
        self.variables.write().extend(path_variables(&endpoint.path));
        self.resources
            .write()
            .insert(endpoint.path.clone(), endpoint.resource_id());
    }

    /// Every path variable seen so far.
    pub fn variables(&self) -> Vec<String> {
        self.variables.read().iter().cloned().collect()
    }

    /// Rebuild the template of a concrete request path from its extracted
    /// parameters. Only known variables are substituted.
    pub fn template_for(&self, raw_path: &str, params: &[(&str, &str)]) -> String {
        let variables = self.variables.read();
        let known: Vec<(&str, &str)> = params
            .iter()
            .copied()
            .filter(|(name, _)| variables.contains(*name))
            .collect();
        template_path(raw_path, &known)
    }

    /// Resource ID registered for a route template.
    pub fn resource_id_for(&self, template: &str) -> Option<String> {
        self.resources.read().get(template).cloned()
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }
}

impl Rbac {
    /// Create the endpoint's resource and grant each of its roles.
    ///
    /// Meant to run once per route at startup. Safe to repeat.
    #[instrument(skip(self, endpoint), fields(path = %endpoint.path))]
    pub async fn register_endpoint(&self, endpoint: &Endpoint) -> RbacResult<Resource> {
        endpoint.validate()?;
        let resource = self
            .new_resource(
                NewResource::new(endpoint.resource_id())
                    .resource_type(ENDPOINT_RESOURCE_TYPE)
                    .data(endpoint.path.clone())
                    .public(true),
            )
            .await?;

        let derived = endpoint.method_access();
        for grant in endpoint.role_access.values() {
            let access = if grant.access == 0 { derived } else { grant.access };
            self.add_permission_resource_to_role(&grant.role, &resource, &[access])
                .await?;
        }
        info!(
            resource_id = %resource.id,
            roles = endpoint.role_access.len(),
            "Registered endpoint"
        );
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ACCESS_DELETE, ACCESS_READ, ACCESS_UPDATE, ACCESS_WRITE};
    use crate::store::{MemoryStore, Table};
    use std::sync::Arc;
    use test_case::test_case;

    #[test]
    fn test_roles_combine_on_re_add() {
        let admin = Role::with_id("r-admin");
        let endpoint = Endpoint::new("widgets")
            .roles(ACCESS_READ, &[admin.clone()])
            .roles(ACCESS_DELETE, &[admin]);
        assert_eq!(endpoint.role_access["r-admin"].access, ACCESS_READ | ACCESS_DELETE);
    }

    #[test_case(Endpoint::new("e"), "path,role_access,methods" ; "nothing set")]
    #[test_case(Endpoint::new("e").path("/a"), "role_access,methods" ; "path only")]
    #[test_case(Endpoint::new("e").methods(["GET"]), "path,role_access" ; "methods only")]
    fn test_validate_lists_missing_fields(endpoint: Endpoint, expected: &str) {
        let err = endpoint.validate().unwrap_err();
        assert!(err.to_string().ends_with(expected), "{}", err);
    }

    #[test]
    fn test_validate_accepts_complete_endpoint() {
        let endpoint = Endpoint::new("widgets")
            .path("/api/v1/widgets/{id}")
            .methods(["GET"])
            .roles(0, &[Role::with_id("r1")]);
        assert!(endpoint.validate().is_ok());
        assert_eq!(endpoint.resource_id(), ".api.v1.widgets.{id}");
    }

    #[test]
    fn test_registry_templates() {
        let registry = EndpointRegistry::new();
        registry.record(
            &Endpoint::new("widget")
                .path("/api/v1/widgets/{id}")
                .methods(["GET"])
                .roles(0, &[Role::with_id("r1")]),
        );

        assert_eq!(registry.variables(), vec!["id".to_string()]);
        let template = registry.template_for("/api/v1/widgets/42", &[("id", "42"), ("page", "2")]);
        assert_eq!(template, "/api/v1/widgets/{id}");
        assert_eq!(
            registry.resource_id_for(&template).as_deref(),
            Some(".api.v1.widgets.{id}")
        );
        assert!(registry.resource_id_for("/unknown").is_none());
    }

    #[tokio::test]
    async fn test_register_endpoint_grants_roles() {
        let store = Arc::new(MemoryStore::new());
        let rbac = Rbac::uncached(store.clone());
        let viewer = rbac.new_role("viewer", "", 1).await.unwrap();
        let admin = rbac.new_role("admin", "", 10).await.unwrap();

        let endpoint = Endpoint::new("widget")
            .path("/api/v1/widgets/{id}")
            .methods(["GET", "PUT"])
            .roles(0, &[viewer.clone()])
            .roles(ACCESS_DELETE, &[admin.clone()]);

        let resource = rbac.register_endpoint(&endpoint).await.unwrap();
        assert_eq!(resource.id, ".api.v1.widgets.{id}");
        assert_eq!(resource.resource_type, ENDPOINT_RESOURCE_TYPE);
        assert_eq!(resource.data, "/api/v1/widgets/{id}");
        assert!(resource.public);

        assert!(rbac.role_has_permission(&viewer, &resource, &[ACCESS_UPDATE]).await.unwrap());
        assert!(!rbac.role_has_permission(&viewer, &resource, &[ACCESS_WRITE]).await.unwrap());
        assert!(rbac.role_has_permission(&admin, &resource, &[ACCESS_DELETE]).await.unwrap());

        rbac.register_endpoint(&endpoint).await.unwrap();
        assert_eq!(store.len(Table::Resource), 1);
        assert_eq!(store.len(Table::RoleResourcePermissions), 2);
    }

    #[tokio::test]
    async fn test_register_invalid_endpoint_fails() {
        let rbac = Rbac::uncached(Arc::new(MemoryStore::new()));
        let err = rbac.register_endpoint(&Endpoint::new("e")).await.unwrap_err();
        assert!(err.is_validation());
    }
}
