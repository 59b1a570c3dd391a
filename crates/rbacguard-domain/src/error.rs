//! Domain error types for policy loading and evaluation.

use thiserror::Error;

/// Domain-specific errors for policy loading and evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A Role, Binding or group membership record is missing a required
    /// field or carries an invalid one.
    #[error("malformed definition {entity}: field '{field}' {reason}")]
    MalformedDefinition {
        entity: String,
        field: String,
        reason: String,
    },

    /// Group membership traversal looped back on itself.
    #[error("cyclic group membership while resolving {subject}: {path}")]
    CyclicMembership { subject: String, path: String },

    /// A Binding names a Role that is not part of the loaded set.
    #[error("binding {binding} references undefined {role}")]
    DanglingReference { binding: String, role: String },
}

impl DomainError {
    pub(crate) fn malformed(
        entity: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedDefinition {
            entity: entity.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error halts the load in every mode.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DomainError::DanglingReference { .. })
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message_names_entity_and_field() {
        let err = DomainError::malformed("Role ns1/view", "rules[0].verbs", "must not be empty");
        assert_eq!(
            err.to_string(),
            "malformed definition Role ns1/view: field 'rules[0].verbs' must not be empty"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_only_dangling_reference_is_fatal() {
        let dangling = DomainError::DanglingReference {
            binding: "RoleBinding ns1/read".to_string(),
            role: "Role ns1/missing".to_string(),
        };
        let cycle = DomainError::CyclicMembership {
            subject: "Group:a".to_string(),
            path: "a -> b -> a".to_string(),
        };
        assert!(dangling.is_fatal());
        assert!(!cycle.is_fatal());
    }
}
