//! rbacguard binary
//!
//! Checks Kubernetes RBAC manifests for least-privilege problems.
//!
//! # Usage
//!
//! ```bash
//! # Check a manifest directory, fail on violations
//! rbacguard --manifests deploy/rbac
//!
//! # Include a directory group export, JSON report to a file
//! rbacguard -m deploy/rbac --memberships groups.yaml --format json -o report.json
//!
//! # Tune via environment
//! RBACGUARD_CHECKS__MAX_GROUP_MEMBERSHIPS=10 rbacguard -m deploy/rbac
//! ```
//!
//! Exit status: 0 when no finding reaches `--fail-on`, 1 when one does,
//! 2 when input or configuration could not be loaded.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use rbacguard_cli::observability::{init_logging, LoggingConfig};
use rbacguard_cli::{read_policy_input, run, FailOn, GuardConfig, ReportFormat};

/// rbacguard - least-privilege checks for Kubernetes RBAC
#[derive(Parser, Debug)]
#[command(name = "rbacguard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Manifest files or directories
    #[arg(short, long, required = true, num_args = 1..)]
    manifests: Vec<PathBuf>,

    /// Group membership export files
    #[arg(long)]
    memberships: Vec<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum)]
    format: Option<ReportFormat>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Drop malformed records instead of failing
    #[arg(long)]
    lenient: bool,

    /// Lowest severity that makes the run fail
    #[arg(long, value_enum)]
    fail_on: Option<FailOn>,
}

impl Args {
    /// Command-line flags win over file and environment settings.
    fn apply(&self, config: &mut GuardConfig) {
        if let Some(format) = self.format {
            config.report.format = format;
        }
        if let Some(fail_on) = self.fail_on {
            config.report.fail_on = fail_on;
        }
        if self.lenient {
            config.load.lenient = true;
        }
    }
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn try_main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GuardConfig::load(path)?,
        None => GuardConfig::from_env()?,
    };
    args.apply(&mut config);

    init_logging(LoggingConfig::from_settings(&config.logging));
    info!(version = env!("CARGO_PKG_VERSION"), "starting rbacguard");

    let input = read_policy_input(&args.manifests, &args.memberships)?;
    let outcome = run(&input, &config).context("failed to load policy")?;

    let rendered = match config.report.format {
        ReportFormat::Json => outcome.report.render_json()?,
        ReportFormat::Text => outcome.report.render_text(),
    };
    match &args.output {
        Some(path) => fs::write(path, &rendered)
            .with_context(|| format!("failed to write report to {}", path.display()))?,
        None => print!("{rendered}"),
    }

    if outcome.should_fail(config.report.fail_on) {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_manifests_are_required() {
        assert!(Args::try_parse_from(["rbacguard"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "rbacguard",
            "-m",
            "a.yaml",
            "b/",
            "--format",
            "json",
            "--fail-on",
            "never",
            "--lenient",
        ])
        .unwrap();
        assert_eq!(args.manifests, vec![PathBuf::from("a.yaml"), PathBuf::from("b/")]);

        let mut config = GuardConfig::default();
        args.apply(&mut config);
        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.report.fail_on, FailOn::Never);
        assert!(config.load.lenient);
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let args = Args::try_parse_from(["rbacguard", "--manifests", "rbac"]).unwrap();
        let mut config = GuardConfig::default();
        config.report.fail_on = FailOn::Warning;
        args.apply(&mut config);
        assert_eq!(config.report.fail_on, FailOn::Warning);
        assert_eq!(config.report.format, ReportFormat::Text);
    }
}
