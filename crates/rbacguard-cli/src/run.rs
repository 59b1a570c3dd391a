//! One evaluation run: load, check, report.

use tracing::{info, warn};

use rbacguard_domain::model::PolicyInput;
use rbacguard_domain::{load, Checker, DomainError, DomainResult, Report};

use crate::config::{FailOn, GuardConfig};

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    /// Records dropped by a lenient load.
    pub load_errors: Vec<DomainError>,
}

impl RunOutcome {
    /// Whether the report holds a finding at or above the `fail_on` level.
    pub fn should_fail(&self, fail_on: FailOn) -> bool {
        fail_on
            .threshold()
            .is_some_and(|threshold| self.report.has_at_least(threshold))
    }
}

/// Builds the policy graph from `input` and runs every enabled check.
///
/// Fails on any load error that the configured load mode treats as fatal.
pub fn run(input: &PolicyInput, config: &GuardConfig) -> DomainResult<RunOutcome> {
    let outcome = load(input, &config.load_options())?;
    for err in &outcome.errors {
        warn!(error = %err, "record dropped");
    }

    let checker = Checker::new(config.checker_config());
    let report = Report::new(checker.evaluate(&outcome.graph));

    info!(
        violations = report.summary.violations,
        warnings = report.summary.warnings,
        info = report.summary.info,
        dropped = outcome.errors.len(),
        "evaluation complete"
    );

    Ok(RunOutcome {
        report,
        load_errors: outcome.errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbacguard_domain::model::{GroupMembershipRecord, SubjectSpec};
    use rbacguard_domain::Severity;

    fn fanout_input(groups: usize) -> PolicyInput {
        PolicyInput {
            manifests: vec![],
            memberships: (0..groups)
                .map(|i| GroupMembershipRecord {
                    group: Some(format!("g{i}")),
                    members: vec![SubjectSpec::new("User", "alice")],
                })
                .collect(),
        }
    }

    #[test]
    fn test_run_reports_fanout_warning() {
        let outcome = run(&fanout_input(6), &GuardConfig::default()).unwrap();
        assert_eq!(outcome.report.summary.warnings, 1);
        assert_eq!(outcome.report.highest_severity(), Some(Severity::Warning));
        assert!(outcome.load_errors.is_empty());
    }

    #[test]
    fn test_should_fail_respects_threshold() {
        let outcome = run(&fanout_input(6), &GuardConfig::default()).unwrap();
        assert!(!outcome.should_fail(FailOn::Violation));
        assert!(outcome.should_fail(FailOn::Warning));
        assert!(!outcome.should_fail(FailOn::Never));
    }

    #[test]
    fn test_lenient_run_keeps_dropped_records() {
        let mut input = fanout_input(1);
        input.memberships.push(GroupMembershipRecord {
            group: None,
            members: vec![],
        });

        let mut config = GuardConfig::default();
        assert!(run(&input, &config).is_err());

        config.load.lenient = true;
        let outcome = run(&input, &config).unwrap();
        assert_eq!(outcome.load_errors.len(), 1);
    }
}
