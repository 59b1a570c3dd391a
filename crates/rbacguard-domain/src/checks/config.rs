//! Configuration for the least-privilege checker.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::CheckId;

/// An API action considered sensitive enough to flag wherever it is
/// granted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensitiveAction {
    /// `""` for the core API group.
    #[serde(default)]
    pub api_group: String,
    pub resource: String,
    pub verb: String,
}

impl SensitiveAction {
    pub fn new(api_group: &str, resource: &str, verb: &str) -> Self {
        Self {
            api_group: api_group.to_string(),
            resource: resource.to_string(),
            verb: verb.to_string(),
        }
    }
}

impl fmt::Display for SensitiveAction {
    /// `get secrets`, `escalate clusterroles.rbac.authorization.k8s.io`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.api_group.is_empty() {
            write!(f, "{} {}", self.verb, self.resource)
        } else {
            write!(f, "{} {}.{}", self.verb, self.resource, self.api_group)
        }
    }
}

/// Configuration for the least-privilege checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Actions the escalation check flags.
    #[serde(default = "default_escalation_actions")]
    pub escalation_actions: Vec<SensitiveAction>,
    /// Subjects in more groups than this get a fan-out warning.
    #[serde(default = "default_max_group_memberships")]
    pub max_group_memberships: usize,
    /// Resources that only exist cluster-wide. A ClusterRoleBinding that
    /// grants any of them is never reported as over-scoped.
    #[serde(default = "default_cluster_scoped_resources")]
    pub cluster_scoped_resources: BTreeSet<String>,
    #[serde(default)]
    pub disabled_checks: BTreeSet<CheckId>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            escalation_actions: default_escalation_actions(),
            max_group_memberships: default_max_group_memberships(),
            cluster_scoped_resources: default_cluster_scoped_resources(),
            disabled_checks: BTreeSet::new(),
        }
    }
}

/// Credential-read-equivalent actions plus the RBAC verbs that let a
/// subject grant itself more than it holds.
pub fn default_escalation_actions() -> Vec<SensitiveAction> {
    const RBAC: &str = "rbac.authorization.k8s.io";
    vec![
        SensitiveAction::new("", "secrets", "get"),
        SensitiveAction::new("", "secrets", "list"),
        SensitiveAction::new("", "secrets", "watch"),
        SensitiveAction::new("", "serviceaccounts/token", "create"),
        SensitiveAction::new(RBAC, "roles", "escalate"),
        SensitiveAction::new(RBAC, "clusterroles", "escalate"),
        SensitiveAction::new(RBAC, "roles", "bind"),
        SensitiveAction::new(RBAC, "clusterroles", "bind"),
        SensitiveAction::new("", "users", "impersonate"),
        SensitiveAction::new("", "groups", "impersonate"),
        SensitiveAction::new("", "serviceaccounts", "impersonate"),
    ]
}

fn default_max_group_memberships() -> usize {
    5
}

/// Built-in cluster-scoped resources of a stock cluster. Subresources
/// (`nodes/proxy`) follow their parent.
pub fn default_cluster_scoped_resources() -> BTreeSet<String> {
    [
        "apiservices",
        "certificatesigningrequests",
        "clusterrolebindings",
        "clusterroles",
        "componentstatuses",
        "csidrivers",
        "csinodes",
        "customresourcedefinitions",
        "ingressclasses",
        "mutatingwebhookconfigurations",
        "namespaces",
        "nodes",
        "persistentvolumes",
        "priorityclasses",
        "runtimeclasses",
        "selfsubjectaccessreviews",
        "selfsubjectrulesreviews",
        "storageclasses",
        "subjectaccessreviews",
        "tokenreviews",
        "validatingwebhookconfigurations",
        "volumeattachments",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl CheckerConfig {
    pub fn with_escalation_actions(mut self, actions: Vec<SensitiveAction>) -> Self {
        self.escalation_actions = actions;
        self
    }

    pub fn with_max_group_memberships(mut self, max: usize) -> Self {
        self.max_group_memberships = max;
        self
    }

    pub fn with_cluster_scoped_resources<I>(mut self, resources: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.cluster_scoped_resources = resources.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `resource` (or the parent of a subresource) only exists
    /// cluster-wide. Wildcard resources always reach cluster-scoped ones.
    pub fn is_cluster_scoped(&self, resource: &str) -> bool {
        let parent = resource.split_once('/').map_or(resource, |(parent, _)| parent);
        parent == crate::model::WILDCARD || self.cluster_scoped_resources.contains(parent)
    }

    pub fn with_disabled_check(mut self, check: CheckId) -> Self {
        self.disabled_checks.insert(check);
        self
    }

    pub fn is_enabled(&self, check: CheckId) -> bool {
        !self.disabled_checks.contains(&check)
    }
}
