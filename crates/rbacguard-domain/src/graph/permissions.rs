//! Effective permission sets.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::{resource_matches, Permission, Target, WILDCARD};

/// The set of atomic permissions a subject holds.
///
/// Backed by an ordered set, so union is exact and iteration order is
/// stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EffectivePermissions {
    permissions: BTreeSet<Permission>,
}

impl EffectivePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.permissions.insert(permission)
    }

    /// Adds every permission from `other`.
    pub fn union_with(&mut self, other: &EffectivePermissions) {
        self.permissions.extend(other.permissions.iter().cloned());
    }

    /// Returns true if `verb` on every `resource` object in `api_group` is
    /// granted for a request in `namespace` (`None` for cluster-wide).
    ///
    /// Grants limited to specific resource names do not count.
    pub fn allows(&self, namespace: Option<&str>, api_group: &str, resource: &str, verb: &str) -> bool {
        self.permissions.iter().any(|permission| {
            permission.scope.covers(namespace)
                && matches_value(&permission.verb, verb)
                && match &permission.target {
                    Target::Resource {
                        api_group: group,
                        resource: res,
                        resource_name: None,
                    } => matches_value(group, api_group) && resource_matches(res, resource),
                    _ => false,
                }
        })
    }

    /// Verbs granted on `resource` in `api_group` for `namespace`, as
    /// written (a wildcard grant shows up as `*`).
    pub fn verbs_on(&self, namespace: Option<&str>, api_group: &str, resource: &str) -> BTreeSet<&str> {
        self.permissions
            .iter()
            .filter(|permission| permission.scope.covers(namespace))
            .filter(|permission| match &permission.target {
                Target::Resource {
                    api_group: group,
                    resource: res,
                    resource_name: None,
                } => matches_value(group, api_group) && resource_matches(res, resource),
                _ => false,
            })
            .map(|permission| permission.verb.as_str())
            .collect()
    }
}

impl Extend<Permission> for EffectivePermissions {
    fn extend<I: IntoIterator<Item = Permission>>(&mut self, iter: I) {
        self.permissions.extend(iter);
    }
}

impl FromIterator<Permission> for EffectivePermissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self {
            permissions: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a EffectivePermissions {
    type Item = &'a Permission;
    type IntoIter = std::collections::btree_set::Iter<'a, Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.permissions.iter()
    }
}

fn matches_value(granted: &str, requested: &str) -> bool {
    granted == requested || granted == WILDCARD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Rule, Scope};

    fn ns(name: &str) -> Scope {
        Scope::Namespace(name.to_string())
    }

    #[test]
    fn test_allows_exact_grant() {
        let perms: EffectivePermissions = Rule::new([""], ["pods"], ["get", "list"])
            .permissions(&ns("ns1"))
            .into_iter()
            .collect();

        assert!(perms.allows(Some("ns1"), "", "pods", "get"));
        assert!(perms.allows(Some("ns1"), "", "pods", "list"));
        assert!(!perms.allows(Some("ns1"), "", "pods", "watch"));
        assert!(!perms.allows(Some("ns2"), "", "pods", "get"));
        assert!(!perms.allows(None, "", "pods", "get"));
    }

    #[test]
    fn test_cluster_grant_applies_everywhere() {
        let perms: EffectivePermissions = Rule::new(["apps"], ["*"], ["get"])
            .permissions(&Scope::Cluster)
            .into_iter()
            .collect();

        assert!(perms.allows(Some("any"), "apps", "deployments", "get"));
        assert!(perms.allows(None, "apps", "statefulsets", "get"));
        assert!(!perms.allows(None, "", "pods", "get"));
    }

    #[test]
    fn test_subresource_wildcard_grant() {
        let perms: EffectivePermissions = Rule::new([""], ["*/token"], ["create"])
            .permissions(&Scope::Cluster)
            .into_iter()
            .collect();

        assert!(perms.allows(Some("ns1"), "", "serviceaccounts/token", "create"));
        assert!(!perms.allows(Some("ns1"), "", "serviceaccounts", "create"));
        let verbs: Vec<&str> = perms
            .verbs_on(None, "", "serviceaccounts/token")
            .into_iter()
            .collect();
        assert_eq!(verbs, vec!["create"]);
    }

    #[test]
    fn test_named_grant_is_not_unrestricted() {
        let perms: EffectivePermissions = Rule::new([""], ["configmaps"], ["get"])
            .with_resource_names(["settings"])
            .permissions(&ns("ns1"))
            .into_iter()
            .collect();

        assert_eq!(perms.len(), 1);
        assert!(!perms.allows(Some("ns1"), "", "configmaps", "get"));
    }

    #[test]
    fn test_verbs_on() {
        let perms: EffectivePermissions = Rule::new([""], ["pods"], ["get", "list"])
            .permissions(&ns("ns1"))
            .into_iter()
            .collect();

        let verbs: Vec<&str> = perms.verbs_on(Some("ns1"), "", "pods").into_iter().collect();
        assert_eq!(verbs, vec!["get", "list"]);
        assert!(perms.verbs_on(Some("ns2"), "", "pods").is_empty());
    }

    #[test]
    fn test_union_is_idempotent() {
        let mut perms: EffectivePermissions = Rule::new([""], ["pods"], ["get"])
            .permissions(&ns("ns1"))
            .into_iter()
            .collect();
        let copy = perms.clone();

        perms.union_with(&copy);

        assert_eq!(perms, copy);
    }
}
