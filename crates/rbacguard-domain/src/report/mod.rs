//! Report emitter.
//!
//! Turns a list of findings into a stable, diffable document. The same
//! findings always produce byte-identical output regardless of the order
//! the checks returned them in.

use std::cmp::Ordering;

use serde::Serialize;

use crate::checks::{Finding, Severity};

/// Finding counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub violations: usize,
    pub warnings: usize,
    pub info: usize,
}

impl Summary {
    fn count(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Violation => summary.violations += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.violations + self.warnings + self.info
    }
}

/// Sorted findings plus their summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub findings: Vec<Finding>,
}

impl Report {
    pub fn new(mut findings: Vec<Finding>) -> Self {
        sort_findings(&mut findings);
        Self {
            summary: Summary::count(&findings),
            findings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Severity of the most serious finding, if any.
    pub fn highest_severity(&self) -> Option<Severity> {
        // sorted most severe first
        self.findings.first().map(|finding| finding.severity)
    }

    /// Whether any finding is at least as severe as `threshold`.
    pub fn has_at_least(&self, threshold: Severity) -> bool {
        self.highest_severity()
            .is_some_and(|severity| severity >= threshold)
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// One line per finding, followed by a summary line.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for finding in &self.findings {
            let subjects = if finding.subjects.is_empty() {
                "-".to_string()
            } else {
                finding.subjects.join(",")
            };
            out.push_str(&format!(
                "{:<9} {:<20} {} [{}] {}\n",
                finding.severity.as_str().to_uppercase(),
                finding.rule,
                finding.target,
                subjects,
                finding.message
            ));
        }
        out.push_str(&format!(
            "{} violation(s), {} warning(s), {} info\n",
            self.summary.violations, self.summary.warnings, self.summary.info
        ));
        out
    }
}

/// Sorts by severity (most severe first), subject, rule, then target,
/// message and the full subject list as tiebreakers.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(compare);
}

fn compare(a: &Finding, b: &Finding) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| a.subject_key().cmp(b.subject_key()))
        .then_with(|| a.rule.cmp(&b.rule))
        .then_with(|| a.target.cmp(&b.target))
        .then_with(|| a.message.cmp(&b.message))
        .then_with(|| a.subjects.cmp(&b.subjects))
        .then_with(|| a.check.cmp(&b.check))
}
