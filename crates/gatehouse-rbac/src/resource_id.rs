//! Resource identifier normalization.
//!
//! Resources are named by dotted paths: the route `/api/v1/resource-name`
//! becomes `.api.v1.resource_name`.

use crate::error::{RbacError, RbacResult};
use once_cell::sync::Lazy;
use regex::Regex;

static VALID_RESOURCE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z0-9_\-{}]{2,}\.*)+$").expect("static regex"));

static PATH_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^}]+)\}").expect("static regex"));

fn substitute(part: &str) -> String {
    part.replace('/', ".").replace('-', "_")
}

/// Convert a URL path into a resource ID.
///
/// Lower-cases, then maps `/` to `.` and `-` to `_`. Leading and trailing
/// separators survive: `/api/` becomes `.api.`.
pub fn url_to_resource_id(path: &str) -> String {
    substitute(&path.to_lowercase())
}

/// Join path fragments into one resource ID.
///
/// Each part gets the same substitution as [`url_to_resource_id`] (without
/// lower-casing) and loses one leading and one trailing `.` before joining.
pub fn join_resource_id<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|part| {
            let id = substitute(part.as_ref());
            let id = id.strip_prefix('.').unwrap_or(&id);
            let id = id.strip_suffix('.').unwrap_or(id);
            id.to_string()
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Lower-case and validate a resource ID, returning the canonical form.
///
/// Segments need at least two of `[a-z0-9_-{}]`. Leading dots mark the root
/// produced by [`url_to_resource_id`] and are not checked against the
/// segment rule.
pub fn validate_resource_id(id: &str) -> RbacResult<String> {
    let canonical = id.to_lowercase();
    let body = canonical.trim_start_matches('.');
    if VALID_RESOURCE_NAME.is_match(body) {
        Ok(canonical)
    } else {
        Err(RbacError::validation(format!(
            "invalid resource id format ({})",
            canonical
        )))
    }
}

/// Placeholder names in a route path, in order of appearance.
///
/// `/accounts/{account_id}/users/{user_id}` yields `account_id`, `user_id`.
pub fn path_variables(path: &str) -> Vec<String> {
    PATH_VARIABLE
        .captures_iter(path)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Rebuild a route template from a concrete request path.
///
/// Every segment equal to one of the `(name, value)` parameters is replaced
/// with `{name}`. Matching is per segment, so a value that also occurs inside
/// another segment is left alone there.
pub fn template_path(raw_path: &str, params: &[(&str, &str)]) -> String {
    raw_path
        .split('/')
        .map(|segment| {
            params
                .iter()
                .find(|(_, value)| !value.is_empty() && *value == segment)
                .map(|(name, _)| format!("{{{}}}", name))
                .unwrap_or_else(|| segment.to_string())
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_url_to_resource_id() {
        let cases = vec![
            ("/api/v1/resource", ".api.v1.resource"),
            ("/API/V1/RESOURCE", ".api.v1.resource"),
            ("/api/v1/resource-name", ".api.v1.resource_name"),
            ("api/v1/resource-name", "api.v1.resource_name"),
            ("/api/v1/resource-name/", ".api.v1.resource_name."),
            ("/api/v1/resource-name/sub-resource", ".api.v1.resource_name.sub_resource"),
            ("/api/v1/widgets/{id}", ".api.v1.widgets.{id}"),
        ];

        for (path, expected) in cases {
            assert_eq!(url_to_resource_id(path), expected, "{}", path);
        }
    }

    #[test]
    fn test_join_resource_id() {
        let cases: Vec<(Vec<&str>, &str)> = vec![
            (vec!["api/v1/resource"], "api.v1.resource"),
            (vec!["api/v1/resource", "sub-resource"], "api.v1.resource.sub_resource"),
            (vec!["api/v1/resource/", "/sub-resource"], "api.v1.resource.sub_resource"),
            (vec!["api/v1/resource-name"], "api.v1.resource_name"),
            (vec!["api/v1/resource-name/", "/sub-resource"], "api.v1.resource_name.sub_resource"),
            (vec!["api/v1/resource", "sub/resource"], "api.v1.resource.sub.resource"),
            (
                vec!["api/v1/resource", "sub-resource", "another-resource"],
                "api.v1.resource.sub_resource.another_resource",
            ),
        ];

        for (parts, expected) in cases {
            assert_eq!(join_resource_id(&parts), expected, "{:?}", parts);
        }
    }

    #[test]
    fn test_join_resource_id_keeps_case() {
        assert_eq!(join_resource_id(&["Api", "V1"]), "Api.V1");
    }

    #[test]
    fn test_validate_resource_id() {
        assert_eq!(validate_resource_id(".api.v1.widgets").unwrap(), ".api.v1.widgets");
        assert_eq!(validate_resource_id("API.V1.Widgets").unwrap(), "api.v1.widgets");
        assert!(validate_resource_id(".api.v1.widgets.{id}").is_ok());
        assert!(validate_resource_id("api.v1.resource_name").is_ok());
        assert!(validate_resource_id("api.v1.resource-name").is_ok());
        assert!(validate_resource_id("api.v1.").is_ok());

        assert!(validate_resource_id("").is_err());
        assert!(validate_resource_id("a").is_err());
        assert!(validate_resource_id("api.v1.x").is_err());
        assert!(validate_resource_id("api/v1").is_err());
        assert!(validate_resource_id("api v1").is_err());
        assert!(validate_resource_id("...").is_err());
    }

    #[test]
    fn test_validation_error_names_the_id() {
        let err = validate_resource_id("Bad Id").unwrap_err();
        assert!(err.to_string().contains("bad id"));
        assert!(matches!(err, RbacError::Validation { .. }));
    }

    #[test]
    fn test_path_variables() {
        assert_eq!(
            path_variables("/accounts/{account_id}/users/{user_id}"),
            vec!["account_id", "user_id"]
        );
        assert!(path_variables("/api/v1/widgets").is_empty());
    }

    #[test]
    fn test_template_path() {
        assert_eq!(
            template_path("/api/v1/widgets/42", &[("id", "42")]),
            "/api/v1/widgets/{id}"
        );
        assert_eq!(
            template_path("/a/42/b/420", &[("id", "42")]),
            "/a/{id}/b/420"
        );
        assert_eq!(template_path("/api/v1/widgets", &[]), "/api/v1/widgets");
    }

    proptest! {
        #[test]
        fn test_url_ids_never_contain_slash_or_dash(path in "[/a-zA-Z0-9_-]{0,40}") {
            let id = url_to_resource_id(&path);
            prop_assert!(!id.contains('/'));
            prop_assert!(!id.contains('-'));
            prop_assert_eq!(id.len(), path.len());
        }

        #[test]
        fn test_normalized_routes_validate(segments in prop::collection::vec("[a-z0-9_-]{2,8}", 1..5)) {
            let path = format!("/{}", segments.join("/"));
            prop_assert!(validate_resource_id(&url_to_resource_id(&path)).is_ok());
        }
    }
}
