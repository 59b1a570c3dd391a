//! Raw Kubernetes RBAC manifest records.
//!
//! These mirror the wire shape of `rbac.authorization.k8s.io/v1` objects
//! closely enough to deserialize them straight from YAML or JSON. Every
//! field the loader validates is optional here so a missing value turns into
//! a `MalformedDefinition` naming the field instead of an opaque serde error.
//! Unknown fields are ignored, which lets whole manifest directories
//! (Deployments, ConfigMaps, ...) pass through.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One Kubernetes object, or a `List` of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub api_version: Option<String>,
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub rules: Option<Vec<PolicyRuleSpec>>,
    pub aggregation_rule: Option<AggregationRuleSpec>,
    pub role_ref: Option<RoleRefSpec>,
    pub subjects: Option<Vec<SubjectSpec>>,
    /// Populated for `List` kinds.
    pub items: Option<Vec<Manifest>>,
}

impl Manifest {
    /// Returns true for `List`, `RoleList`, `ClusterRoleBindingList`, ...
    pub fn is_list(&self) -> bool {
        self.kind.as_deref().is_some_and(|kind| kind.ends_with("List"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: Option<String>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRuleSpec {
    #[serde(default)]
    pub api_groups: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default)]
    pub resource_names: Vec<String>,
    #[serde(default, rename = "nonResourceURLs")]
    pub non_resource_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRuleSpec {
    #[serde(default)]
    pub cluster_role_selectors: Vec<LabelSelectorSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorSpec {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRefSpec {
    pub api_group: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
}

/// A binding subject or group member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSpec {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub api_group: Option<String>,
}

impl SubjectSpec {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }
}

/// One entry of a directory group-membership export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMembershipRecord {
    pub group: Option<String>,
    #[serde(default)]
    pub members: Vec<SubjectSpec>,
}

/// Everything a single evaluation run is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyInput {
    #[serde(default)]
    pub manifests: Vec<Manifest>,
    #[serde(default)]
    pub memberships: Vec<GroupMembershipRecord>,
}
