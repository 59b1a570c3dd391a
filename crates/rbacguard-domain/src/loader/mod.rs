//! Model loader.
//!
//! Turns raw manifest and group-membership records into a `PolicyGraph`.
//!
//! # Load modes
//!
//! - `Strict` fails the whole load on the first malformed record.
//! - `Lenient` drops the malformed record, keeps its error in
//!   `LoadOutcome::errors`, and carries on.
//!
//! A binding whose role reference does not resolve is fatal in both modes,
//! including when the role itself was dropped for being malformed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DomainError, DomainResult};
use crate::graph::PolicyGraph;
use crate::model::{
    Binding, BindingKind, GroupMembershipRecord, LabelSelector, Manifest, PolicyInput,
    PolicyRuleSpec, Role, RoleKey, RoleKind, Rule, Subject, SubjectKind, SubjectSpec,
};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// How malformed records are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    #[default]
    Strict,
    Lenient,
}

/// Options for building a graph from raw records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub mode: LoadMode,
    /// Attach `system:authenticated` and friends to every identity.
    pub implicit_groups: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            mode: LoadMode::Strict,
            implicit_groups: true,
        }
    }
}

impl LoadOptions {
    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_implicit_groups(mut self, enabled: bool) -> Self {
        self.implicit_groups = enabled;
        self
    }
}

/// Result of a successful load.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub graph: PolicyGraph,
    /// Records dropped in lenient mode. Always empty in strict mode.
    pub errors: Vec<DomainError>,
}

/// Builds a `PolicyGraph` from raw records.
pub fn load(input: &PolicyInput, options: &LoadOptions) -> DomainResult<LoadOutcome> {
    let mut loader = Loader::new(options.mode);

    let mut manifests = Vec::new();
    flatten(&input.manifests, &mut manifests);

    for (index, manifest) in manifests.iter().enumerate() {
        loader.add_manifest(index, manifest)?;
    }
    for (index, record) in input.memberships.iter().enumerate() {
        loader.add_membership(index, record)?;
    }

    let Loader {
        roles,
        bindings,
        memberships,
        errors,
        ..
    } = loader;

    let graph = PolicyGraph::new(
        roles.into_values().collect(),
        bindings.into_values().collect(),
        memberships,
        options.implicit_groups,
    )?;

    info!(
        manifests = manifests.len(),
        memberships = input.memberships.len(),
        dropped = errors.len(),
        "policy input loaded"
    );

    Ok(LoadOutcome { graph, errors })
}

fn flatten<'a>(manifests: &'a [Manifest], out: &mut Vec<&'a Manifest>) {
    for manifest in manifests {
        match (&manifest.items, manifest.is_list()) {
            (Some(items), true) => flatten(items, out),
            _ => out.push(manifest),
        }
    }
}

struct Loader {
    mode: LoadMode,
    roles: BTreeMap<RoleKey, Role>,
    bindings: BTreeMap<(BindingKind, Option<String>, String), Binding>,
    memberships: BTreeMap<String, BTreeSet<Subject>>,
    errors: Vec<DomainError>,
}

impl Loader {
    fn new(mode: LoadMode) -> Self {
        Self {
            mode,
            roles: BTreeMap::new(),
            bindings: BTreeMap::new(),
            memberships: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Strict mode propagates the error; lenient mode records it.
    fn reject(&mut self, err: DomainError) -> DomainResult<()> {
        match self.mode {
            LoadMode::Strict => Err(err),
            LoadMode::Lenient => {
                warn!(error = %err, "skipping malformed definition");
                self.errors.push(err);
                Ok(())
            }
        }
    }

    fn add_manifest(&mut self, index: usize, manifest: &Manifest) -> DomainResult<()> {
        let Some(kind) = manifest.kind.as_deref() else {
            return self.reject(DomainError::malformed(
                manifest_entity(index, manifest),
                "kind",
                "is required",
            ));
        };

        let entity = manifest_entity(index, manifest);
        let result = match kind {
            "Role" | "ClusterRole" => parse_role(kind, manifest, &entity).and_then(|role| {
                if self.roles.contains_key(&role.key) {
                    return Err(DomainError::malformed(
                        role.key.to_string(),
                        "metadata.name",
                        "is defined more than once",
                    ));
                }
                self.roles.insert(role.key.clone(), role);
                Ok(())
            }),
            "RoleBinding" | "ClusterRoleBinding" => parse_binding(kind, manifest, &entity).and_then(|binding| {
                let key = (binding.kind, binding.namespace.clone(), binding.name.clone());
                if self.bindings.contains_key(&key) {
                    return Err(DomainError::malformed(
                        binding.id(),
                        "metadata.name",
                        "is defined more than once",
                    ));
                }
                self.bindings.insert(key, binding);
                Ok(())
            }),
            other => {
                debug!(kind = other, name = ?manifest.metadata.name, "ignoring non-RBAC manifest");
                Ok(())
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) => self.reject(err),
        }
    }

    fn add_membership(&mut self, index: usize, record: &GroupMembershipRecord) -> DomainResult<()> {
        match parse_membership(index, record) {
            // Exports are often paged, so repeated groups merge.
            Ok((group, members)) => {
                self.memberships.entry(group).or_default().extend(members);
                Ok(())
            }
            Err(err) => self.reject(err),
        }
    }
}

fn manifest_entity(index: usize, manifest: &Manifest) -> String {
    let kind = manifest.kind.as_deref().unwrap_or("manifest");
    match (&manifest.metadata.namespace, &manifest.metadata.name) {
        (Some(namespace), Some(name)) => format!("{kind} {namespace}/{name}"),
        (None, Some(name)) => format!("{kind} {name}"),
        _ => format!("{kind} #{index}"),
    }
}

fn required<'a>(value: &'a Option<String>, entity: &str, field: &str) -> DomainResult<&'a str> {
    match value.as_deref() {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DomainError::malformed(entity, field, "is required")),
    }
}

fn check_api_version(manifest: &Manifest, entity: &str) -> DomainResult<()> {
    match manifest.api_version.as_deref() {
        Some(version) if !version.starts_with(&format!("{RBAC_API_GROUP}/")) => Err(
            DomainError::malformed(entity, "apiVersion", format!("'{version}' is not an RBAC API version")),
        ),
        _ => Ok(()),
    }
}

/// Validates namespace presence for the object's scope.
fn scoped_namespace(
    manifest: &Manifest,
    entity: &str,
    namespaced: bool,
) -> DomainResult<Option<String>> {
    match (&manifest.metadata.namespace, namespaced) {
        (Some(namespace), true) if !namespace.trim().is_empty() => Ok(Some(namespace.clone())),
        (_, true) => Err(DomainError::malformed(entity, "metadata.namespace", "is required")),
        (Some(_), false) => Err(DomainError::malformed(
            entity,
            "metadata.namespace",
            "must not be set on a cluster-scoped object",
        )),
        (None, false) => Ok(None),
    }
}

fn parse_role(kind: &str, manifest: &Manifest, entity: &str) -> DomainResult<Role> {
    check_api_version(manifest, entity)?;
    let name = required(&manifest.metadata.name, entity, "metadata.name")?;
    let namespaced = kind == "Role";
    let namespace = scoped_namespace(manifest, entity, namespaced)?;

    let key = RoleKey {
        kind: if namespaced { RoleKind::Role } else { RoleKind::ClusterRole },
        namespace,
        name: name.to_string(),
    };

    let aggregation: Vec<LabelSelector> = match &manifest.aggregation_rule {
        Some(_) if namespaced => {
            return Err(DomainError::malformed(
                entity,
                "aggregationRule",
                "is only valid on a ClusterRole",
            ));
        }
        Some(rule) if rule.cluster_role_selectors.is_empty() => {
            return Err(DomainError::malformed(
                entity,
                "aggregationRule.clusterRoleSelectors",
                "must not be empty",
            ));
        }
        Some(rule) => rule
            .cluster_role_selectors
            .iter()
            .map(|selector| LabelSelector {
                match_labels: selector.match_labels.clone(),
            })
            .collect(),
        None => Vec::new(),
    };

    let rules = manifest
        .rules
        .iter()
        .flatten()
        .enumerate()
        .map(|(index, spec)| parse_rule(spec, entity, index, namespaced))
        .collect::<DomainResult<Vec<Rule>>>()?;

    Ok(Role::new(key, rules)
        .with_labels(manifest.metadata.labels.clone())
        .with_aggregation(aggregation))
}

fn parse_rule(spec: &PolicyRuleSpec, entity: &str, index: usize, namespaced: bool) -> DomainResult<Rule> {
    let field = |name: &str| format!("rules[{index}].{name}");

    if spec.verbs.is_empty() {
        return Err(DomainError::malformed(entity, field("verbs"), "must not be empty"));
    }

    if !spec.non_resource_urls.is_empty() {
        if namespaced {
            return Err(DomainError::malformed(
                entity,
                field("nonResourceURLs"),
                "is only valid on a ClusterRole",
            ));
        }
        if !spec.resources.is_empty() {
            return Err(DomainError::malformed(
                entity,
                field("resources"),
                "cannot be combined with nonResourceURLs",
            ));
        }
        return Ok(Rule::non_resource(spec.non_resource_urls.iter().cloned(), spec.verbs.iter().cloned()));
    }

    if spec.resources.is_empty() {
        return Err(DomainError::malformed(entity, field("resources"), "must not be empty"));
    }
    if spec.api_groups.is_empty() {
        return Err(DomainError::malformed(entity, field("apiGroups"), "must not be empty"));
    }

    Ok(Rule::new(
        spec.api_groups.iter().cloned(),
        spec.resources.iter().cloned(),
        spec.verbs.iter().cloned(),
    )
    .with_resource_names(spec.resource_names.iter().cloned()))
}

fn parse_binding(kind: &str, manifest: &Manifest, entity: &str) -> DomainResult<Binding> {
    check_api_version(manifest, entity)?;
    let name = required(&manifest.metadata.name, entity, "metadata.name")?;
    let namespaced = kind == "RoleBinding";
    let namespace = scoped_namespace(manifest, entity, namespaced)?;

    let Some(role_ref) = &manifest.role_ref else {
        return Err(DomainError::malformed(entity, "roleRef", "is required"));
    };
    let role_name = required(&role_ref.name, entity, "roleRef.name")?;
    let role = match required(&role_ref.kind, entity, "roleRef.kind")? {
        "ClusterRole" => RoleKey::cluster_role(role_name),
        "Role" if namespaced => RoleKey {
            kind: RoleKind::Role,
            namespace: namespace.clone(),
            name: role_name.to_string(),
        },
        "Role" => {
            return Err(DomainError::malformed(
                entity,
                "roleRef.kind",
                "must be ClusterRole for a ClusterRoleBinding",
            ));
        }
        other => {
            return Err(DomainError::malformed(
                entity,
                "roleRef.kind",
                format!("'{other}' is not Role or ClusterRole"),
            ));
        }
    };

    let specs = manifest.subjects.as_deref().unwrap_or_default();
    if specs.is_empty() {
        return Err(DomainError::malformed(entity, "subjects", "must not be empty"));
    }
    let subjects = specs
        .iter()
        .enumerate()
        .map(|(index, spec)| parse_subject(spec, entity, &format!("subjects[{index}]")))
        .collect::<DomainResult<BTreeSet<Subject>>>()?;

    Ok(Binding {
        kind: if namespaced {
            BindingKind::RoleBinding
        } else {
            BindingKind::ClusterRoleBinding
        },
        namespace,
        name: name.to_string(),
        role,
        subjects,
    })
}

fn parse_subject(spec: &SubjectSpec, entity: &str, field: &str) -> DomainResult<Subject> {
    let kind_name = required(&spec.kind, entity, &format!("{field}.kind"))?;
    let Some(kind) = SubjectKind::parse(kind_name) else {
        return Err(DomainError::malformed(
            entity,
            format!("{field}.kind"),
            format!("'{kind_name}' is not User, Group or ServiceAccount"),
        ));
    };
    let name = required(&spec.name, entity, &format!("{field}.name"))?;

    match kind {
        SubjectKind::ServiceAccount => {
            let namespace = required(&spec.namespace, entity, &format!("{field}.namespace"))?;
            Ok(Subject::service_account(namespace, name))
        }
        SubjectKind::User => Ok(Subject::user(name)),
        SubjectKind::Group => Ok(Subject::group(name)),
    }
}

fn parse_membership(
    index: usize,
    record: &GroupMembershipRecord,
) -> DomainResult<(String, BTreeSet<Subject>)> {
    let entity = match &record.group {
        Some(group) => format!("group membership {group}"),
        None => format!("group membership #{index}"),
    };
    let group = required(&record.group, &entity, "group")?;
    let members = record
        .members
        .iter()
        .enumerate()
        .map(|(i, spec)| parse_subject(spec, &entity, &format!("members[{i}]")))
        .collect::<DomainResult<BTreeSet<Subject>>>()?;
    Ok((group.to_string(), members))
}
