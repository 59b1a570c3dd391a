//! Effective rule computation, including ClusterRole aggregation.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::warn;

use crate::model::{Role, RoleKey, RoleKind, Rule};

/// Fills in `effective_rules` for every role.
///
/// Plain roles grant exactly their own rules. An aggregated ClusterRole
/// grants the union of every ClusterRole its selectors reach, following
/// nested aggregations. Selector cycles terminate because each role is
/// expanded at most once per aggregation.
pub(crate) fn resolve_effective_rules(roles: &mut BTreeMap<RoleKey, Role>) {
    let mut resolved: BTreeMap<RoleKey, BTreeSet<Rule>> = BTreeMap::new();

    for (key, role) in roles.iter() {
        let rules = if role.is_aggregated() {
            if !role.rules.is_empty() {
                warn!(
                    role = %key,
                    discarded = role.rules.len(),
                    "aggregated ClusterRole lists its own rules; they are replaced by the aggregation"
                );
            }
            aggregate(key, roles)
        } else {
            role.rules.iter().cloned().collect()
        };
        resolved.insert(key.clone(), rules);
    }

    for (key, rules) in resolved {
        if let Some(role) = roles.get_mut(&key) {
            role.effective_rules = rules;
        }
    }
}

/// ClusterRoles selected by the aggregation rules of `role`.
pub(crate) fn selected_roles<'a>(
    role: &'a Role,
    roles: &'a BTreeMap<RoleKey, Role>,
) -> impl Iterator<Item = &'a RoleKey> + 'a {
    roles.iter().filter_map(move |(key, candidate)| {
        let selected = key.kind == RoleKind::ClusterRole
            && *key != role.key
            && role
                .aggregation
                .iter()
                .any(|selector| selector.matches(&candidate.labels));
        selected.then_some(key)
    })
}

fn aggregate(root: &RoleKey, roles: &BTreeMap<RoleKey, Role>) -> BTreeSet<Rule> {
    let mut rules = BTreeSet::new();
    let mut visited = BTreeSet::from([root.clone()]);
    let mut queue = VecDeque::from([root.clone()]);

    while let Some(key) = queue.pop_front() {
        let Some(role) = roles.get(&key) else {
            continue;
        };
        if key != *root && !role.is_aggregated() {
            rules.extend(role.rules.iter().cloned());
        }
        if role.is_aggregated() {
            for selected in selected_roles(role, roles) {
                if visited.insert(selected.clone()) {
                    queue.push_back(selected.clone());
                }
            }
        }
    }
    rules
}
