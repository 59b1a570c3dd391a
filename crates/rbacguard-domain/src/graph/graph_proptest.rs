//! Property-based tests for permission resolution.

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use proptest::prelude::*;

    use crate::graph::{EffectivePermissions, PolicyGraph};
    use crate::model::{Binding, Role, RoleKey, Rule, Subject};

    const RESOURCES: [&str; 4] = ["pods", "secrets", "configmaps", "services"];
    const VERBS: [&str; 3] = ["get", "list", "watch"];

    fn roles() -> Vec<Role> {
        RESOURCES
            .iter()
            .zip(VERBS.iter().cycle())
            .map(|(resource, verb)| {
                Role::new(
                    RoleKey::cluster_role(format!("{resource}-{verb}")),
                    vec![Rule::new([""], [*resource], [*verb])],
                )
            })
            .collect()
    }

    /// Membership edges only point from lower to higher group indexes, so
    /// the generated graph is always acyclic.
    fn graph_strategy() -> impl Strategy<Value = PolicyGraph> {
        (
            prop::collection::vec((0usize..4, 0usize..6), 0..12),
            prop::collection::vec((0usize..6, 0usize..6), 0..12),
            prop::collection::vec((0usize..10, 0usize..4, any::<bool>()), 0..16),
        )
            .prop_map(|(user_edges, group_edges, grants)| {
                let mut memberships: BTreeMap<String, BTreeSet<Subject>> = BTreeMap::new();
                for (user, group) in user_edges {
                    memberships
                        .entry(format!("g{group}"))
                        .or_default()
                        .insert(Subject::user(format!("u{user}")));
                }
                for (child, parent) in group_edges {
                    if child < parent {
                        memberships
                            .entry(format!("g{parent}"))
                            .or_default()
                            .insert(Subject::group(format!("g{child}")));
                    }
                }

                let roles = roles();
                let mut bindings = Vec::new();
                for (index, (subject, role, namespaced)) in grants.into_iter().enumerate() {
                    let subject = if subject < 4 {
                        Subject::user(format!("u{subject}"))
                    } else {
                        Subject::group(format!("g{}", subject - 4))
                    };
                    let key = roles[role].key.clone();
                    let name = format!("grant-{index}");
                    bindings.push(if namespaced {
                        Binding::role_binding("team", name, key, [subject])
                    } else {
                        Binding::cluster_role_binding(name, key, [subject])
                    });
                }

                PolicyGraph::new(roles, bindings, memberships, false)
                    .expect("generated graph is well formed")
            })
    }

    proptest! {
        #[test]
        fn test_effective_is_union_of_direct_and_group_permissions(graph in graph_strategy()) {
            for subject in graph.subjects() {
                let effective = graph.effective_permissions(subject).unwrap();

                let mut expected = graph.direct_permissions(subject);
                for group in graph.groups_of(subject).unwrap() {
                    let group_perms = graph
                        .effective_permissions(&Subject::group(group))
                        .unwrap();
                    expected.union_with(&group_perms);
                }

                prop_assert_eq!(effective, expected, "mismatch for {}", subject);
            }
        }

        #[test]
        fn test_effective_permissions_are_deterministic(graph in graph_strategy()) {
            for subject in graph.subjects() {
                let first = graph.effective_permissions(subject).unwrap();
                let second = graph.effective_permissions(subject).unwrap();
                prop_assert_eq!(first, second);
            }
        }

        #[test]
        fn test_member_holds_superset_of_each_group(graph in graph_strategy()) {
            for subject in graph.subjects() {
                let effective = graph.effective_permissions(subject).unwrap();
                for group in graph.groups_of(subject).unwrap() {
                    let group_perms: EffectivePermissions = graph
                        .effective_permissions(&Subject::group(group))
                        .unwrap();
                    prop_assert!(group_perms.iter().all(|p| effective.contains(p)));
                }
            }
        }
    }
}
