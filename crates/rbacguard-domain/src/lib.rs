//! rbacguard-domain: Core RBAC policy analysis
//!
//! This crate contains the pure policy-checking logic including:
//! - Kubernetes RBAC manifest model and loader
//! - Binding graph with effective permission resolution
//! - Least-privilege checks
//! - Deterministic report emission
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              rbacguard-domain                │
//! ├─────────────────────────────────────────────┤
//! │  model/   - Roles, bindings, subjects       │
//! │  loader/  - Manifest → PolicyGraph          │
//! │  graph/   - Membership & permission graph   │
//! │  checks/  - Least-privilege checks          │
//! │  report/  - Sorted, diffable findings       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this crate performs I/O. Reading manifests from disk and
//! writing reports is left to the caller.

pub mod checks;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod report;

// Re-export commonly used types at the crate root
pub use checks::{evaluate, CheckId, Checker, CheckerConfig, Finding, SensitiveAction, Severity};
pub use error::{DomainError, DomainResult};
pub use graph::{EffectivePermissions, PolicyGraph};
pub use loader::{load, LoadMode, LoadOptions, LoadOutcome};
pub use report::{Report, Summary};
