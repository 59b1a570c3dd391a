//! Flags cluster-wide bindings whose permissions namespaced Roles already
//! provide.

use crate::graph::PolicyGraph;
use crate::model::{BindingKind, Role, Scope, Target};

use super::{subject_names, Check, CheckId, CheckerConfig, Finding, Severity};

/// A ClusterRoleBinding is over-scoped when the Roles of at least one
/// namespace together grant everything its ClusterRole grants.
///
/// ClusterRoles with non-resource rules, with rules on cluster-scoped or
/// wildcard resources, or with no rules at all, are never flagged: none of
/// those can be granted by a RoleBinding.
pub struct OverScopingCheck;

/// (api_group, resource, verb, resource_name)
type Atom = (String, String, String, Option<String>);

impl Check for OverScopingCheck {
    fn id(&self) -> CheckId {
        CheckId::OverScoping
    }

    fn run(&self, graph: &PolicyGraph, config: &CheckerConfig) -> Vec<Finding> {
        let by_namespace = graph.roles_by_namespace();
        let mut findings = Vec::new();

        for binding in graph.bindings() {
            if binding.kind != BindingKind::ClusterRoleBinding {
                continue;
            }
            let Some(role) = graph.role(&binding.role) else {
                continue;
            };
            let Some(atoms) = resource_atoms(role, config) else {
                continue;
            };

            let namespaces: Vec<&str> = by_namespace
                .iter()
                .filter(|(_, roles)| atoms.iter().all(|atom| covered(atom, roles)))
                .map(|(namespace, _)| *namespace)
                .collect();
            if namespaces.is_empty() {
                continue;
            }

            findings.push(Finding {
                severity: Severity::Warning,
                check: CheckId::OverScoping,
                subjects: subject_names(&binding.subjects),
                rule: CheckId::OverScoping.to_string(),
                target: binding.id(),
                message: format!(
                    "{} grants {} cluster-wide, but Roles in namespace(s) {} already cover its permissions; \
                     consider RoleBindings instead",
                    binding.id(),
                    role.key,
                    namespaces.join(", ")
                ),
            });
        }
        findings
    }
}

/// Flattens the role's rules into atoms, or `None` if the role cannot be
/// narrowed to a namespace.
fn resource_atoms(role: &Role, config: &CheckerConfig) -> Option<Vec<Atom>> {
    let rules = role.effective_rules();
    if rules.is_empty() || rules.iter().any(|rule| rule.is_non_resource()) {
        return None;
    }

    let atoms: Vec<Atom> = rules
        .iter()
        .flat_map(|rule| rule.permissions(&Scope::Cluster))
        .filter_map(|permission| match permission.target {
            Target::Resource {
                api_group,
                resource,
                resource_name,
            } => Some((api_group, resource, permission.verb, resource_name)),
            Target::NonResource { .. } => None,
        })
        .collect();
    if atoms.iter().any(|(_, resource, _, _)| config.is_cluster_scoped(resource)) {
        return None;
    }
    Some(atoms)
}

fn covered(atom: &Atom, roles: &[&Role]) -> bool {
    let (api_group, resource, verb, name) = atom;
    roles.iter().any(|role| {
        role.effective_rules()
            .iter()
            .any(|rule| rule.matches(api_group, resource, verb) && rule.covers_name(name.as_deref()))
    })
}
