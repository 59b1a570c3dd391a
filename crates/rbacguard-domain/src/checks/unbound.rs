//! Flags roles nothing uses.

use std::collections::BTreeSet;

use crate::graph::PolicyGraph;
use crate::model::RoleKey;

use super::{Check, CheckId, CheckerConfig, Finding, Severity};

/// `Info` for every role that no binding references and no aggregated
/// ClusterRole selects.
pub struct UnboundRoleCheck;

impl Check for UnboundRoleCheck {
    fn id(&self) -> CheckId {
        CheckId::UnboundRole
    }

    fn run(&self, graph: &PolicyGraph, _config: &CheckerConfig) -> Vec<Finding> {
        let mut used: BTreeSet<&RoleKey> = graph.bindings().iter().map(|binding| &binding.role).collect();
        for role in graph.roles().filter(|role| role.is_aggregated()) {
            used.extend(graph.aggregated_from(role));
        }

        graph
            .roles()
            .filter(|role| !used.contains(&role.key))
            .map(|role| Finding {
                severity: Severity::Info,
                check: CheckId::UnboundRole,
                subjects: Vec::new(),
                rule: CheckId::UnboundRole.to_string(),
                target: role.key.to_string(),
                message: format!("{} is not referenced by any binding or aggregation", role.key),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{Binding, LabelSelector, Role, Rule, Subject};

    #[test]
    fn test_reports_only_unused_roles() {
        let graph = PolicyGraph::new(
            vec![
                Role::new(RoleKey::role("ns1", "used"), vec![Rule::new([""], ["pods"], ["get"])]),
                Role::new(RoleKey::role("ns1", "unused"), vec![Rule::new([""], ["pods"], ["get"])]),
                Role::new(RoleKey::cluster_role("piece"), vec![Rule::new([""], ["pods"], ["list"])])
                    .with_labels([("aggregate", "true")]),
                Role::new(RoleKey::cluster_role("aggregate"), vec![])
                    .with_aggregation(vec![LabelSelector::new([("aggregate", "true")])]),
            ],
            vec![
                Binding::role_binding("ns1", "used", RoleKey::role("ns1", "used"), [Subject::user("a")]),
                Binding::cluster_role_binding(
                    "aggregate",
                    RoleKey::cluster_role("aggregate"),
                    [Subject::group("g")],
                ),
            ],
            BTreeMap::new(),
            true,
        )
        .unwrap();

        let findings = UnboundRoleCheck.run(&graph, &CheckerConfig::default());

        let targets: Vec<&str> = findings.iter().map(|f| f.target.as_str()).collect();
        assert_eq!(targets, vec!["Role ns1/unused"]);
        assert_eq!(findings[0].severity, Severity::Info);
    }
}
