//! Configuration management for rbacguard.
//!
//! Configuration is layered from three sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values, which take
//! precedence over defaults. Command-line flags are applied on top by the
//! binary.
//!
//! # Example
//!
//! ```ignore
//! use rbacguard_cli::config::GuardConfig;
//!
//! // Load from file with env overrides
//! let config = GuardConfig::load("rbacguard.yaml")?;
//!
//! // Or load from environment only
//! let config = GuardConfig::from_env()?;
//! ```

use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use rbacguard_domain::checks::{default_cluster_scoped_resources, default_escalation_actions};
use rbacguard_domain::{CheckId, CheckerConfig, LoadMode, LoadOptions, SensitiveAction, Severity};

const ENV_PREFIX: &str = "RBACGUARD";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GuardConfig {
    #[serde(default)]
    pub logging: LoggingSettings,

    /// How manifests are turned into a graph
    #[serde(default)]
    pub load: LoadSettings,

    /// Check tuning
    #[serde(default)]
    pub checks: ChecksSettings,

    /// Output settings
    #[serde(default)]
    pub report: ReportSettings,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Loader settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoadSettings {
    /// Drop malformed records instead of failing the run
    ///
    /// Environment variable: `RBACGUARD_LOAD__LENIENT`
    #[serde(default)]
    pub lenient: bool,

    /// Attach `system:authenticated` and the service-account groups to
    /// every identity
    ///
    /// Environment variable: `RBACGUARD_LOAD__IMPLICIT_GROUPS`
    #[serde(default = "default_true")]
    pub implicit_groups: bool,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            lenient: false,
            implicit_groups: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Check settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ChecksSettings {
    /// Actions the escalation check looks for. Unset means the built-in list.
    #[serde(default)]
    pub escalation_actions: Option<Vec<SensitiveAction>>,

    /// Fan-out warning fires above this many groups
    ///
    /// Environment variable: `RBACGUARD_CHECKS__MAX_GROUP_MEMBERSHIPS`
    #[serde(default = "default_max_group_memberships")]
    pub max_group_memberships: usize,

    /// Resources no namespaced Role can grant. Unset means the built-in list.
    ///
    /// Environment variable: `RBACGUARD_CHECKS__CLUSTER_SCOPED_RESOURCES`
    /// (comma-separated)
    #[serde(default)]
    pub cluster_scoped_resources: Option<Vec<String>>,

    /// Checks to skip
    ///
    /// Environment variable: `RBACGUARD_CHECKS__DISABLED` (comma-separated)
    #[serde(default)]
    pub disabled: Vec<CheckId>,
}

impl Default for ChecksSettings {
    fn default() -> Self {
        Self {
            escalation_actions: None,
            max_group_memberships: default_max_group_memberships(),
            cluster_scoped_resources: None,
            disabled: Vec::new(),
        }
    }
}

fn default_max_group_memberships() -> usize {
    5
}

/// Report output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Lowest severity that makes the run exit non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailOn {
    #[default]
    Violation,
    Warning,
    Never,
}

impl FailOn {
    pub fn threshold(&self) -> Option<Severity> {
        match self {
            FailOn::Violation => Some(Severity::Violation),
            FailOn::Warning => Some(Severity::Warning),
            FailOn::Never => None,
        }
    }
}

/// Report settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ReportSettings {
    /// Environment variable: `RBACGUARD_REPORT__FORMAT`
    #[serde(default)]
    pub format: ReportFormat,

    /// Environment variable: `RBACGUARD_REPORT__FAIL_ON`
    #[serde(default)]
    pub fail_on: FailOn,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl GuardConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `RBACGUARD_` and use `__` as
    /// separator, e.g. `RBACGUARD_LOGGING__LEVEL=debug` overrides
    /// `logging.level`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&GuardConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            // RBACGUARD_CHECKS__MAX_GROUP_MEMBERSHIPS -> checks.max_group_memberships
            .add_source(env_source())
            .build()?;

        let guard_config: GuardConfig = config.try_deserialize()?;
        guard_config.validate()?;

        Ok(guard_config)
    }

    /// Load configuration from defaults and environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&GuardConfig::default())?)
            .add_source(env_source())
            .build()?;

        let guard_config: GuardConfig = config.try_deserialize()?;
        guard_config.validate()?;

        Ok(guard_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        if self.checks.max_group_memberships == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "checks.max_group_memberships must be greater than 0".to_string(),
            });
        }

        if let Some(actions) = &self.checks.escalation_actions {
            if let Some(action) = actions
                .iter()
                .find(|a| a.resource.trim().is_empty() || a.verb.trim().is_empty())
            {
                return Err(ConfigLoadError::Invalid {
                    message: format!(
                        "checks.escalation_actions entries need a resource and a verb, got: {action:?}"
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn load_options(&self) -> LoadOptions {
        let mode = if self.load.lenient {
            LoadMode::Lenient
        } else {
            LoadMode::Strict
        };
        LoadOptions::default()
            .with_mode(mode)
            .with_implicit_groups(self.load.implicit_groups)
    }

    pub fn checker_config(&self) -> CheckerConfig {
        let actions = self
            .checks
            .escalation_actions
            .clone()
            .unwrap_or_else(default_escalation_actions);

        let cluster_scoped = self
            .checks
            .cluster_scoped_resources
            .clone()
            .map(|resources| resources.into_iter().collect())
            .unwrap_or_else(default_cluster_scoped_resources);

        self.checks.disabled.iter().fold(
            CheckerConfig::default()
                .with_escalation_actions(actions)
                .with_max_group_memberships(self.checks.max_group_memberships)
                .with_cluster_scoped_resources(cluster_scoped),
            |config, check| config.with_disabled_check(*check),
        )
    }
}

/// `RBACGUARD_CHECKS__DISABLED=unbound-role,over-scoping` -> `checks.disabled`
fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("checks.disabled")
        .with_list_parse_key("checks.cluster_scoped_resources")
}
