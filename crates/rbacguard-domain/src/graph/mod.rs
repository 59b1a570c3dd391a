//! Binding graph.
//!
//! A `PolicyGraph` links subjects to bindings, bindings to roles, and roles
//! to rules for one snapshot of a cluster's RBAC configuration.
//!
//! # Design
//!
//! - **Built once**: the graph is constructed from a snapshot, evaluated and
//!   dropped. Nothing mutates it after `PolicyGraph::new` returns.
//! - **Derived aggregation**: aggregated ClusterRole rules are recomputed on
//!   every build and never stored in manifests.
//! - **Referential integrity**: every binding's role reference is checked at
//!   construction time; a dangling reference fails the build.
//! - **Ordered collections**: `BTreeMap`/`BTreeSet` everywhere so every walk
//!   over the graph happens in the same order.

mod aggregation;
#[cfg(test)]
mod graph_proptest;
mod membership;
mod permissions;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{DomainError, DomainResult};
use crate::model::{Binding, BindingKind, Role, RoleKey, RoleKind, Subject};

pub use membership::{implicit_groups, AUTHENTICATED_GROUP, SERVICE_ACCOUNTS_GROUP};
pub use permissions::EffectivePermissions;

/// The complete RBAC configuration of one cluster snapshot.
#[derive(Debug, Clone)]
pub struct PolicyGraph {
    roles: BTreeMap<RoleKey, Role>,
    /// Sorted by (kind, namespace, name).
    bindings: Vec<Binding>,
    /// group -> direct members
    members: BTreeMap<String, BTreeSet<Subject>>,
    /// member -> groups listing it directly
    parents: BTreeMap<Subject, BTreeSet<String>>,
    /// subject -> indexes into `bindings`
    subject_bindings: BTreeMap<Subject, Vec<usize>>,
    subjects: BTreeSet<Subject>,
    implicit_groups: bool,
}

impl PolicyGraph {
    /// Builds a graph from already validated definitions.
    ///
    /// Fails with `MalformedDefinition` on duplicate roles or bindings, on a
    /// ClusterRoleBinding pointing at a namespaced Role, and with
    /// `DanglingReference` when a binding's role is not defined.
    pub fn new(
        roles: Vec<Role>,
        bindings: Vec<Binding>,
        memberships: BTreeMap<String, BTreeSet<Subject>>,
        implicit_groups: bool,
    ) -> DomainResult<Self> {
        let mut role_map = BTreeMap::new();
        for role in roles {
            if role_map.contains_key(&role.key) {
                return Err(DomainError::malformed(
                    role.key.to_string(),
                    "metadata.name",
                    "is defined more than once",
                ));
            }
            role_map.insert(role.key.clone(), role);
        }
        aggregation::resolve_effective_rules(&mut role_map);

        let mut bindings = bindings;
        bindings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        for pair in bindings.windows(2) {
            if pair[0].sort_key() == pair[1].sort_key() {
                return Err(DomainError::malformed(
                    pair[1].id(),
                    "metadata.name",
                    "is defined more than once",
                ));
            }
        }
        for binding in &bindings {
            check_role_reference(binding, &role_map)?;
        }

        let mut subjects = BTreeSet::new();
        let mut subject_bindings: BTreeMap<Subject, Vec<usize>> = BTreeMap::new();
        for (index, binding) in bindings.iter().enumerate() {
            for subject in &binding.subjects {
                subjects.insert(subject.clone());
                subject_bindings
                    .entry(subject.clone())
                    .or_default()
                    .push(index);
            }
        }

        let mut parents: BTreeMap<Subject, BTreeSet<String>> = BTreeMap::new();
        for (group, group_members) in &memberships {
            subjects.insert(Subject::group(group.clone()));
            for member in group_members {
                subjects.insert(member.clone());
                parents
                    .entry(member.clone())
                    .or_default()
                    .insert(group.clone());
            }
        }

        debug!(
            roles = role_map.len(),
            bindings = bindings.len(),
            groups = memberships.len(),
            subjects = subjects.len(),
            "policy graph built"
        );

        Ok(Self {
            roles: role_map,
            bindings,
            members: memberships,
            parents,
            subject_bindings,
            subjects,
            implicit_groups,
        })
    }

    pub fn role(&self, key: &RoleKey) -> Option<&Role> {
        self.roles.get(key)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// Namespaced Roles grouped by namespace.
    pub fn roles_by_namespace(&self) -> BTreeMap<&str, Vec<&Role>> {
        let mut grouped: BTreeMap<&str, Vec<&Role>> = BTreeMap::new();
        for role in self.roles.values() {
            if let (RoleKind::Role, Some(namespace)) = (role.key.kind, role.key.namespace.as_deref()) {
                grouped.entry(namespace).or_default().push(role);
            }
        }
        grouped
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Bindings that name `subject` directly.
    pub fn bindings_for<'a>(&'a self, subject: &Subject) -> impl Iterator<Item = &'a Binding> + 'a {
        self.subject_bindings
            .get(subject)
            .into_iter()
            .flatten()
            .map(move |&index| &self.bindings[index])
    }

    /// Bindings that reference the role `key`.
    pub fn bindings_to<'a>(&'a self, key: &'a RoleKey) -> impl Iterator<Item = &'a Binding> + 'a {
        self.bindings.iter().filter(move |binding| binding.role == *key)
    }

    /// Every subject named by a binding or a membership record.
    pub fn subjects(&self) -> &BTreeSet<Subject> {
        &self.subjects
    }

    /// Direct members of `group`.
    pub fn members_of(&self, group: &str) -> Option<&BTreeSet<Subject>> {
        self.members.get(group)
    }

    /// ClusterRoles pulled into `role` by its aggregation selectors.
    pub fn aggregated_from<'a>(&'a self, role: &'a Role) -> impl Iterator<Item = &'a RoleKey> + 'a {
        aggregation::selected_roles(role, &self.roles)
    }

    /// Explicit groups `subject` belongs to, including nested ones.
    ///
    /// Fails with `CyclicMembership` if the traversal loops.
    pub fn groups_of(&self, subject: &Subject) -> DomainResult<BTreeSet<String>> {
        membership::transitive_groups(&self.parents, subject)
    }

    /// Explicit plus implicit (`system:*`) groups, when implicit groups are
    /// enabled for this graph.
    pub fn effective_groups(&self, subject: &Subject) -> DomainResult<BTreeSet<String>> {
        let mut groups = self.groups_of(subject)?;
        if self.implicit_groups {
            groups.extend(implicit_groups(subject));
        }
        Ok(groups)
    }

    /// Permissions granted by bindings that name `subject` directly.
    pub fn direct_permissions(&self, subject: &Subject) -> EffectivePermissions {
        let mut permissions = EffectivePermissions::new();
        for binding in self.bindings_for(subject) {
            let Some(role) = self.roles.get(&binding.role) else {
                continue;
            };
            let scope = binding.scope();
            for rule in role.effective_rules() {
                permissions.extend(rule.permissions(&scope));
            }
        }
        permissions
    }

    /// Union of the permissions granted to `subject` directly and through
    /// every group it belongs to.
    pub fn effective_permissions(&self, subject: &Subject) -> DomainResult<EffectivePermissions> {
        let mut permissions = self.direct_permissions(subject);
        for group in self.effective_groups(subject)? {
            permissions.union_with(&self.direct_permissions(&Subject::group(group)));
        }
        Ok(permissions)
    }
}

fn check_role_reference(binding: &Binding, roles: &BTreeMap<RoleKey, Role>) -> DomainResult<()> {
    match (binding.kind, binding.role.kind) {
        (BindingKind::ClusterRoleBinding, RoleKind::Role) => {
            return Err(DomainError::malformed(
                binding.id(),
                "roleRef.kind",
                "must be ClusterRole for a ClusterRoleBinding",
            ));
        }
        (BindingKind::RoleBinding, RoleKind::Role) if binding.role.namespace != binding.namespace => {
            return Err(DomainError::malformed(
                binding.id(),
                "roleRef",
                "must reference a Role in the binding's own namespace",
            ));
        }
        _ => {}
    }

    if !roles.contains_key(&binding.role) {
        return Err(DomainError::DanglingReference {
            binding: binding.id(),
            role: binding.role.to_string(),
        });
    }
    Ok(())
}
