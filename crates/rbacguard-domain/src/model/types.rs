//! Core type definitions for the RBAC policy model.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Matches any API group, resource or verb.
pub const WILDCARD: &str = "*";

/// The kind of identity a subject represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    User,
    Group,
    ServiceAccount,
}

impl SubjectKind {
    /// Parses the `kind` field of a Kubernetes subject.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "User" => Some(Self::User),
            "Group" => Some(Self::Group),
            "ServiceAccount" => Some(Self::ServiceAccount),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Group => "Group",
            Self::ServiceAccount => "ServiceAccount",
        }
    }
}

/// An identity that can be granted permissions.
///
/// Ordering is (kind, namespace, name), which keeps every collection of
/// subjects in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    /// Only set for service accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl Subject {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            namespace: None,
            name: name.into(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Group,
            namespace: None,
            name: name.into(),
        }
    }

    pub fn service_account(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::ServiceAccount,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == SubjectKind::Group
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}:{}/{}", self.kind.as_str(), namespace, self.name),
            None => write!(f, "{}:{}", self.kind.as_str(), self.name),
        }
    }
}

/// Where a role or binding applies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Cluster,
    Namespace(String),
}

impl Scope {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Scope::Cluster => None,
            Scope::Namespace(namespace) => Some(namespace),
        }
    }

    /// Returns true if a grant in this scope applies to a request in
    /// `namespace` (`None` meaning a cluster-wide request).
    pub fn covers(&self, namespace: Option<&str>) -> bool {
        match self {
            Scope::Cluster => true,
            Scope::Namespace(own) => namespace == Some(own.as_str()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Cluster => write!(f, "cluster"),
            Scope::Namespace(namespace) => write!(f, "namespace/{namespace}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    Role,
    ClusterRole,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "Role",
            Self::ClusterRole => "ClusterRole",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BindingKind {
    RoleBinding,
    ClusterRoleBinding,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleBinding => "RoleBinding",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
        }
    }
}

/// Uniquely identifies a Role or ClusterRole within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleKey {
    pub kind: RoleKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl RoleKey {
    pub fn role(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: RoleKind::Role,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster_role(name: impl Into<String>) -> Self {
        Self {
            kind: RoleKind::ClusterRole,
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for RoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{} {}/{}", self.kind.as_str(), namespace, self.name),
            None => write!(f, "{} {}", self.kind.as_str(), self.name),
        }
    }
}

/// A single permission rule (Kubernetes `PolicyRule`).
///
/// Every field is an ordered set so two rules granting the same thing
/// compare equal regardless of how their manifests listed the values.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rule {
    pub api_groups: BTreeSet<String>,
    pub resources: BTreeSet<String>,
    pub verbs: BTreeSet<String>,
    /// Empty means every object of the matched resources.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub resource_names: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub non_resource_urls: BTreeSet<String>,
}

impl Rule {
    /// Creates a resource rule.
    pub fn new<G, R, V>(api_groups: G, resources: R, verbs: V) -> Self
    where
        G: IntoIterator,
        G::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            api_groups: api_groups.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            verbs: verbs.into_iter().map(Into::into).collect(),
            resource_names: BTreeSet::new(),
            non_resource_urls: BTreeSet::new(),
        }
    }

    /// Creates a rule over non-resource URLs such as `/healthz`.
    pub fn non_resource<U, V>(urls: U, verbs: V) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            verbs: verbs.into_iter().map(Into::into).collect(),
            non_resource_urls: urls.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_resource_names<N>(mut self, names: N) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
    {
        self.resource_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_non_resource(&self) -> bool {
        !self.non_resource_urls.is_empty()
    }

    /// Returns true if this rule grants `verb` on `resource` in `api_group`,
    /// honouring wildcards.
    pub fn matches(&self, api_group: &str, resource: &str, verb: &str) -> bool {
        !self.is_non_resource()
            && contains_or_wildcard(&self.api_groups, api_group)
            && self
                .resources
                .iter()
                .any(|granted| resource_matches(granted, resource))
            && contains_or_wildcard(&self.verbs, verb)
    }

    /// Returns true if the rule's name restriction admits `name`
    /// (`None` meaning every object).
    pub fn covers_name(&self, name: Option<&str>) -> bool {
        if self.resource_names.is_empty() {
            return true;
        }
        name.is_some_and(|name| self.resource_names.contains(name))
    }

    /// Flattens the rule into atomic permissions within `scope`.
    ///
    /// Non-resource URLs only exist cluster-wide, so a namespaced scope
    /// yields nothing for them.
    pub fn permissions(&self, scope: &Scope) -> Vec<Permission> {
        let mut permissions = Vec::new();
        if self.is_non_resource() {
            if *scope != Scope::Cluster {
                return permissions;
            }
            for url in &self.non_resource_urls {
                for verb in &self.verbs {
                    permissions.push(Permission {
                        scope: scope.clone(),
                        verb: verb.clone(),
                        target: Target::NonResource { url: url.clone() },
                    });
                }
            }
            return permissions;
        }

        let names: Vec<Option<&String>> = if self.resource_names.is_empty() {
            vec![None]
        } else {
            self.resource_names.iter().map(Some).collect()
        };
        for api_group in &self.api_groups {
            for resource in &self.resources {
                for verb in &self.verbs {
                    for &name in &names {
                        permissions.push(Permission {
                            scope: scope.clone(),
                            verb: verb.clone(),
                            target: Target::Resource {
                                api_group: api_group.clone(),
                                resource: resource.clone(),
                                resource_name: name.cloned(),
                            },
                        });
                    }
                }
            }
        }
        permissions
    }
}

pub(crate) fn contains_or_wildcard(set: &BTreeSet<String>, value: &str) -> bool {
    set.contains(value) || set.contains(WILDCARD)
}

/// Kubernetes resource matching: exact, `*`, or `*/<sub>` against any
/// resource's `<sub>` subresource.
pub(crate) fn resource_matches(granted: &str, requested: &str) -> bool {
    if granted == requested || granted == WILDCARD {
        return true;
    }
    match (granted.strip_prefix("*/"), requested.split_once('/')) {
        (Some(granted_sub), Some((_, requested_sub))) => granted_sub == requested_sub,
        _ => false,
    }
}

/// A `matchLabels` selector used by aggregated ClusterRoles.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// An empty selector matches everything.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

/// A Role or ClusterRole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub key: RoleKey,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Rules as written in the manifest.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Non-empty for aggregated ClusterRoles.
    #[serde(default)]
    pub aggregation: Vec<LabelSelector>,
    /// Rules the role actually grants. Derived on every graph build.
    #[serde(skip)]
    pub(crate) effective_rules: BTreeSet<Rule>,
}

impl Role {
    pub fn new(key: RoleKey, rules: Vec<Rule>) -> Self {
        Self {
            key,
            labels: BTreeMap::new(),
            rules,
            aggregation: Vec::new(),
            effective_rules: BTreeSet::new(),
        }
    }

    pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn with_aggregation(mut self, selectors: Vec<LabelSelector>) -> Self {
        self.aggregation = selectors;
        self
    }

    pub fn scope(&self) -> Scope {
        match &self.key.namespace {
            Some(namespace) => Scope::Namespace(namespace.clone()),
            None => Scope::Cluster,
        }
    }

    pub fn is_aggregated(&self) -> bool {
        !self.aggregation.is_empty()
    }

    /// Rules granted by this role, including aggregated ones.
    pub fn effective_rules(&self) -> &BTreeSet<Rule> {
        &self.effective_rules
    }
}

/// A RoleBinding or ClusterRoleBinding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub kind: BindingKind,
    pub namespace: Option<String>,
    pub name: String,
    pub role: RoleKey,
    pub subjects: BTreeSet<Subject>,
}

impl Binding {
    pub fn role_binding<I>(
        namespace: impl Into<String>,
        name: impl Into<String>,
        role: RoleKey,
        subjects: I,
    ) -> Self
    where
        I: IntoIterator<Item = Subject>,
    {
        Self {
            kind: BindingKind::RoleBinding,
            namespace: Some(namespace.into()),
            name: name.into(),
            role,
            subjects: subjects.into_iter().collect(),
        }
    }

    pub fn cluster_role_binding<I>(name: impl Into<String>, role: RoleKey, subjects: I) -> Self
    where
        I: IntoIterator<Item = Subject>,
    {
        Self {
            kind: BindingKind::ClusterRoleBinding,
            namespace: None,
            name: name.into(),
            role,
            subjects: subjects.into_iter().collect(),
        }
    }

    /// Scope in which the bound role's rules take effect.
    pub fn scope(&self) -> Scope {
        match &self.namespace {
            Some(namespace) => Scope::Namespace(namespace.clone()),
            None => Scope::Cluster,
        }
    }

    /// Human-readable identifier, e.g. `RoleBinding ns1/read-pods`.
    pub fn id(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{} {}/{}", self.kind.as_str(), namespace, self.name),
            None => format!("{} {}", self.kind.as_str(), self.name),
        }
    }

    /// Sort key: (kind, namespace, name).
    pub(crate) fn sort_key(&self) -> (BindingKind, Option<&str>, &str) {
        (self.kind, self.namespace.as_deref(), self.name.as_str())
    }
}

/// What an atomic permission applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Resource {
        api_group: String,
        resource: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_name: Option<String>,
    },
    NonResource {
        url: String,
    },
}

/// An atomic grant: one verb on one target within one scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub scope: Scope,
    pub verb: String,
    pub target: Target,
}

impl Permission {
    /// Unrestricted resource permission, mostly useful in tests.
    pub fn resource(
        scope: Scope,
        api_group: impl Into<String>,
        resource: impl Into<String>,
        verb: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            verb: verb.into(),
            target: Target::Resource {
                api_group: api_group.into(),
                resource: resource.into(),
                resource_name: None,
            },
        }
    }
}
