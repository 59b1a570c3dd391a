//! Flags subjects that belong to too many groups.
//!
//! Every group a directory user belongs to ends up in their token, so a
//! large fan-out bloats tokens and slows logins.

use crate::error::DomainError;
use crate::graph::PolicyGraph;

use super::{Check, CheckId, CheckerConfig, Finding, Severity};

/// Rule id reported when group traversal loops.
pub const MEMBERSHIP_CYCLE_RULE: &str = "membership-cycle";

/// `Warning` for each subject whose transitive explicit groups exceed
/// `max_group_memberships`. Implicit `system:*` groups are not counted.
///
/// A subject whose groups cannot be resolved because of a membership cycle
/// gets a `Violation` instead.
pub struct MembershipFanoutCheck;

impl Check for MembershipFanoutCheck {
    fn id(&self) -> CheckId {
        CheckId::MembershipFanout
    }

    fn run(&self, graph: &PolicyGraph, config: &CheckerConfig) -> Vec<Finding> {
        let max = config.max_group_memberships;
        let mut findings = Vec::new();

        for subject in graph.subjects() {
            match graph.groups_of(subject) {
                Ok(groups) if groups.len() > max => findings.push(Finding {
                    severity: Severity::Warning,
                    check: CheckId::MembershipFanout,
                    subjects: vec![subject.to_string()],
                    rule: CheckId::MembershipFanout.to_string(),
                    target: subject.to_string(),
                    message: format!(
                        "{subject} belongs to {} groups (limit {max}): {}",
                        groups.len(),
                        groups.iter().cloned().collect::<Vec<_>>().join(", ")
                    ),
                }),
                Ok(_) => {}
                Err(DomainError::CyclicMembership { path, .. }) => findings.push(Finding {
                    severity: Severity::Violation,
                    check: CheckId::MembershipFanout,
                    subjects: vec![subject.to_string()],
                    rule: MEMBERSHIP_CYCLE_RULE.to_string(),
                    target: subject.to_string(),
                    message: format!("group membership of {subject} is cyclic: {path}"),
                }),
                Err(err) => findings.push(Finding {
                    severity: Severity::Violation,
                    check: CheckId::MembershipFanout,
                    subjects: vec![subject.to_string()],
                    rule: CheckId::MembershipFanout.to_string(),
                    target: subject.to_string(),
                    message: err.to_string(),
                }),
            }
        }
        findings
    }
}
