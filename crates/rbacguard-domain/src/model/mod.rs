//! RBAC policy model.
//!
//! This module contains:
//! - Core type definitions (Subject, Rule, Role, Binding, Permission)
//! - Raw manifest records as they appear in Kubernetes YAML/JSON

mod manifest;
mod types;

pub use manifest::*;
pub use types::*;
