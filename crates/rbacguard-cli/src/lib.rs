//! rbacguard-cli: file input, configuration and logging around
//! `rbacguard-domain`.
//!
//! The `rbacguard` binary is a thin wrapper over this library:
//!
//! ```text
//! config::GuardConfig ──┐
//! input::read_*  ───────┼──> run::run ──> Report ──> stdout / --output
//! observability ────────┘
//! ```

pub mod config;
pub mod input;
pub mod observability;
pub mod run;

pub use config::{ConfigLoadError, FailOn, GuardConfig, ReportFormat};
pub use input::{read_policy_input, InputError};
pub use run::{run, RunOutcome};
