//! Nested group membership traversal.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{DomainError, DomainResult};
use crate::model::{Subject, SubjectKind};

/// Group every authenticated identity belongs to.
pub const AUTHENTICATED_GROUP: &str = "system:authenticated";
/// Group every service account belongs to.
pub const SERVICE_ACCOUNTS_GROUP: &str = "system:serviceaccounts";

/// Groups the Kubernetes authenticator attaches without any membership
/// record.
pub fn implicit_groups(subject: &Subject) -> Vec<String> {
    match subject.kind {
        SubjectKind::User => vec![AUTHENTICATED_GROUP.to_string()],
        SubjectKind::ServiceAccount => {
            let mut groups = vec![
                AUTHENTICATED_GROUP.to_string(),
                SERVICE_ACCOUNTS_GROUP.to_string(),
            ];
            if let Some(namespace) = &subject.namespace {
                groups.push(format!("{SERVICE_ACCOUNTS_GROUP}:{namespace}"));
            }
            groups
        }
        SubjectKind::Group => Vec::new(),
    }
}

/// Resolves every group `subject` belongs to, directly or through nested
/// groups.
///
/// `parents` maps a member to the groups that list it directly. A group
/// reached twice along different paths is fine; a group reached again while
/// still on the current path is a cycle.
pub(crate) fn transitive_groups(
    parents: &BTreeMap<Subject, BTreeSet<String>>,
    subject: &Subject,
) -> DomainResult<BTreeSet<String>> {
    let mut visited = BTreeSet::new();
    let mut path = Vec::new();
    if subject.is_group() {
        path.push(subject.name.clone());
    }

    dfs_collect(subject, parents, &mut visited, &mut path).map_err(|cycle| {
        DomainError::CyclicMembership {
            subject: subject.to_string(),
            path: cycle.join(" -> "),
        }
    })?;

    Ok(visited)
}

/// DFS over the membership graph. Returns the offending path on a cycle.
fn dfs_collect(
    node: &Subject,
    parents: &BTreeMap<Subject, BTreeSet<String>>,
    visited: &mut BTreeSet<String>,
    path: &mut Vec<String>,
) -> Result<(), Vec<String>> {
    let Some(groups) = parents.get(node) else {
        return Ok(());
    };

    for group in groups {
        if let Some(start) = path.iter().position(|g| g == group) {
            let mut cycle = path[start..].to_vec();
            cycle.push(group.clone());
            return Err(cycle);
        }
        if !visited.insert(group.clone()) {
            continue;
        }

        path.push(group.clone());
        dfs_collect(&Subject::group(group.clone()), parents, visited, path)?;
        path.pop();
    }
    Ok(())
}
