//! Flags roles that grant a configured sensitive action.

use crate::graph::PolicyGraph;

use super::{subject_names, Check, CheckId, CheckerConfig, Finding, Severity};

/// One `Violation` per (role, sensitive action) pair the role grants.
pub struct EscalationCheck;

impl Check for EscalationCheck {
    fn id(&self) -> CheckId {
        CheckId::Escalation
    }

    fn run(&self, graph: &PolicyGraph, config: &CheckerConfig) -> Vec<Finding> {
        let mut findings = Vec::new();
        for role in graph.roles() {
            let granted = config.escalation_actions.iter().filter(|action| {
                role.effective_rules()
                    .iter()
                    .any(|rule| rule.matches(&action.api_group, &action.resource, &action.verb))
            });

            for action in granted {
                let subjects = subject_names(
                    graph
                        .bindings_to(&role.key)
                        .flat_map(|binding| binding.subjects.iter()),
                );
                findings.push(Finding {
                    severity: Severity::Violation,
                    check: CheckId::Escalation,
                    subjects,
                    rule: format!("{}:{}", CheckId::Escalation, action),
                    target: role.key.to_string(),
                    message: format!("{} grants sensitive action '{}'", role.key, action),
                });
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::checks::SensitiveAction;
    use crate::model::{Binding, Role, RoleKey, Rule, Subject};

    fn run(roles: Vec<Role>, bindings: Vec<Binding>, config: &CheckerConfig) -> Vec<Finding> {
        let graph = PolicyGraph::new(roles, bindings, BTreeMap::new(), true).unwrap();
        EscalationCheck.run(&graph, config)
    }

    #[test]
    fn test_flags_configured_action_once() {
        let config = CheckerConfig::default()
            .with_escalation_actions(vec![SensitiveAction::new("", "secrets", "get")]);
        let role = Role::new(
            RoleKey::role("ns1", "secret-reader"),
            vec![Rule::new([""], ["secrets"], ["get"])],
        );
        let binding = Binding::role_binding(
            "ns1",
            "read",
            RoleKey::role("ns1", "secret-reader"),
            [Subject::user("alice"), Subject::service_account("ns1", "bot")],
        );

        let findings = run(vec![role], vec![binding], &config);

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.severity, Severity::Violation);
        assert_eq!(finding.target, "Role ns1/secret-reader");
        assert_eq!(finding.rule, "escalation:get secrets");
        assert!(finding.message.contains("get secrets"));
        assert_eq!(finding.subjects, vec!["ServiceAccount:ns1/bot", "User:alice"]);
    }

    #[test]
    fn test_wildcard_rule_grants_every_action() {
        let role = Role::new(RoleKey::cluster_role("admin"), vec![Rule::new(["*"], ["*"], ["*"])]);
        let findings = run(vec![role], vec![], &CheckerConfig::default());
        assert_eq!(findings.len(), CheckerConfig::default().escalation_actions.len());
    }

    #[test]
    fn test_subresource_wildcard_grants_token_creation() {
        let role = Role::new(
            RoleKey::cluster_role("token-minter"),
            vec![Rule::new([""], ["*/token"], ["create"])],
        );

        let findings = run(vec![role], vec![], &CheckerConfig::default());

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "escalation:create serviceaccounts/token");
        assert_eq!(findings[0].target, "ClusterRole token-minter");
    }

    #[test]
    fn test_harmless_role_is_not_flagged() {
        let role = Role::new(
            RoleKey::role("ns1", "view"),
            vec![Rule::new([""], ["pods"], ["get", "list"])],
        );
        assert!(run(vec![role], vec![], &CheckerConfig::default()).is_empty());
    }

    #[test]
    fn test_other_api_group_is_not_flagged() {
        let role = Role::new(
            RoleKey::role("ns1", "custom"),
            vec![Rule::new(["example.com"], ["secrets"], ["get"])],
        );
        assert!(run(vec![role], vec![], &CheckerConfig::default()).is_empty());
    }
}
