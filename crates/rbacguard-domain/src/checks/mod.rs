//! Least-privilege checker.
//!
//! Each check is a pure function over a `PolicyGraph`. Checks never see
//! each other's findings, so they can run in any order and their results
//! are simply concatenated.

mod config;
mod escalation;
mod fanout;
mod over_scoping;
mod unbound;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::PolicyGraph;

pub use config::{
    default_cluster_scoped_resources, default_escalation_actions, CheckerConfig, SensitiveAction,
};
pub use escalation::EscalationCheck;
pub use fanout::MembershipFanoutCheck;
pub use over_scoping::OverScopingCheck;
pub use unbound::UnboundRoleCheck;

/// How serious a finding is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Violation,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Violation => "violation",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a built-in check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckId {
    Escalation,
    OverScoping,
    MembershipFanout,
    UnboundRole,
}

impl CheckId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckId::Escalation => "escalation",
            CheckId::OverScoping => "over-scoping",
            CheckId::MembershipFanout => "membership-fanout",
            CheckId::UnboundRole => "unbound-role",
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem found in the policy graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    /// The check that produced this finding.
    pub check: CheckId,
    /// Subjects involved, in display form and sorted.
    pub subjects: Vec<String>,
    /// Identifier of the rule triggered, e.g. `escalation:get secrets`.
    pub rule: String,
    /// The role, binding or subject the finding is about.
    pub target: String,
    pub message: String,
}

impl Finding {
    /// Subject used for report ordering: the first involved subject, or
    /// empty when none is involved.
    pub fn subject_key(&self) -> &str {
        self.subjects.first().map(String::as_str).unwrap_or("")
    }
}

/// A single least-privilege check.
pub trait Check {
    fn id(&self) -> CheckId;

    /// Evaluates the check. Must not depend on any other check.
    fn run(&self, graph: &PolicyGraph, config: &CheckerConfig) -> Vec<Finding>;
}

/// Runs the enabled built-in checks against a graph.
pub struct Checker {
    config: CheckerConfig,
    checks: Vec<Box<dyn Check>>,
}

impl Checker {
    pub fn new(config: CheckerConfig) -> Self {
        Self {
            config,
            checks: vec![
                Box::new(EscalationCheck),
                Box::new(OverScopingCheck),
                Box::new(MembershipFanoutCheck),
                Box::new(UnboundRoleCheck),
            ],
        }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn evaluate(&self, graph: &PolicyGraph) -> Vec<Finding> {
        let mut findings = Vec::new();
        for check in &self.checks {
            if !self.config.is_enabled(check.id()) {
                debug!(check = %check.id(), "check disabled");
                continue;
            }
            let found = check.run(graph, &self.config);
            debug!(check = %check.id(), findings = found.len(), "check complete");
            findings.extend(found);
        }
        findings
    }
}

impl Default for Checker {
    fn default() -> Self {
        Self::new(CheckerConfig::default())
    }
}

/// Evaluates every enabled check against `graph`.
pub fn evaluate(graph: &PolicyGraph, config: &CheckerConfig) -> Vec<Finding> {
    Checker::new(config.clone()).evaluate(graph)
}

/// Display forms of `subjects`, sorted and deduplicated.
pub(crate) fn subject_names<'a, I>(subjects: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a crate::model::Subject>,
{
    let mut names: Vec<String> = subjects.into_iter().map(ToString::to_string).collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{Binding, Role, RoleKey, Rule, Subject};

    fn graph() -> PolicyGraph {
        let reader = Role::new(
            RoleKey::role("ns1", "secret-reader"),
            vec![Rule::new([""], ["secrets"], ["get"])],
        );
        let orphan = Role::new(
            RoleKey::role("ns1", "orphan"),
            vec![Rule::new([""], ["pods"], ["get"])],
        );
        let binding = Binding::role_binding(
            "ns1",
            "read-secrets",
            RoleKey::role("ns1", "secret-reader"),
            [Subject::user("alice")],
        );
        PolicyGraph::new(vec![reader, orphan], vec![binding], BTreeMap::new(), true).unwrap()
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Violation > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_check_id_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&CheckId::MembershipFanout).unwrap(),
            "\"membership-fanout\""
        );
        assert_eq!(CheckId::OverScoping.to_string(), "over-scoping");
    }

    #[test]
    fn test_evaluate_concatenates_checks() {
        let findings = evaluate(&graph(), &CheckerConfig::default());
        let checks: Vec<CheckId> = findings.iter().map(|f| f.check).collect();
        assert_eq!(checks, vec![CheckId::Escalation, CheckId::UnboundRole]);
    }

    #[test]
    fn test_disabled_check_is_skipped() {
        let config = CheckerConfig::default().with_disabled_check(CheckId::UnboundRole);
        let findings = evaluate(&graph(), &config);
        assert!(findings.iter().all(|f| f.check != CheckId::UnboundRole));
    }

    #[test]
    fn test_checks_are_order_insensitive() {
        let graph = graph();
        let config = CheckerConfig::default();
        let mut forward: Vec<Finding> = Vec::new();
        let mut backward: Vec<Finding> = Vec::new();
        let checks: Vec<Box<dyn Check>> = vec![
            Box::new(EscalationCheck),
            Box::new(OverScopingCheck),
            Box::new(MembershipFanoutCheck),
            Box::new(UnboundRoleCheck),
        ];
        for check in &checks {
            forward.extend(check.run(&graph, &config));
        }
        for check in checks.iter().rev() {
            backward.extend(check.run(&graph, &config));
        }
        forward.sort_by(|a, b| a.rule.cmp(&b.rule).then(a.target.cmp(&b.target)));
        backward.sort_by(|a, b| a.rule.cmp(&b.rule).then(a.target.cmp(&b.target)));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_subject_key() {
        let finding = Finding {
            severity: Severity::Info,
            check: CheckId::UnboundRole,
            subjects: vec![],
            rule: "unbound-role".to_string(),
            target: "Role ns1/orphan".to_string(),
            message: String::new(),
        };
        assert_eq!(finding.subject_key(), "");
    }
}
