use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hierarchy::{HierarchyConfig, HierarchyEdge};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub sweeper: SweeperConfig,
    pub policy: PolicyConfig,
    pub hierarchy: HierarchyConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct SweeperConfig {
    pub interval_hours: u64,
}

/// Security-code and department policy. The two expiration windows were
/// hardcoded literals in the original system; here they are stakeholder
/// configuration.
#[derive(Clone, Debug)]
pub struct PolicyConfig {
    /// Working days after the trip start date that a chain-issued code stays
    /// valid.
    pub code_valid_working_days_after_start: i64,
    /// Working days from issuance for codes regenerated after approval or
    /// reissued on demand.
    pub code_reissue_working_days: i64,
    /// The division office sections requests normally route through. Requests
    /// may still carry custom entries outside this list.
    pub standard_departments: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub sweeper_interval_hours: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://travo.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            sweeper: SweeperConfig { interval_hours: 24 },
            policy: PolicyConfig {
                code_valid_working_days_after_start: 2,
                code_reissue_working_days: 7,
                standard_departments: vec![
                    "Office of the Schools Division Superintendent".to_string(),
                    "Curriculum Implementation Division".to_string(),
                    "School Governance and Operations Division".to_string(),
                    "Administrative Services".to_string(),
                    "Finance Services".to_string(),
                ],
            },
            hierarchy: HierarchyConfig::default(),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Loads configuration with precedence defaults < file < environment <
    /// programmatic overrides, then validates fail-fast.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("travo.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(sweeper) = patch.sweeper {
            if let Some(interval_hours) = sweeper.interval_hours {
                self.sweeper.interval_hours = interval_hours;
            }
        }

        if let Some(policy) = patch.policy {
            if let Some(days) = policy.code_valid_working_days_after_start {
                self.policy.code_valid_working_days_after_start = days;
            }
            if let Some(days) = policy.code_reissue_working_days {
                self.policy.code_reissue_working_days = days;
            }
            if let Some(departments) = policy.standard_departments {
                self.policy.standard_departments = departments;
            }
        }

        if let Some(hierarchy) = patch.hierarchy {
            if let Some(edges) = hierarchy.edges {
                self.hierarchy.edges = edges;
            }
            if let Some(wildcards) = hierarchy.wildcard_validators {
                self.hierarchy.wildcard_validators = wildcards;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TRAVO_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TRAVO_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TRAVO_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TRAVO_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TRAVO_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRAVO_SWEEPER_INTERVAL_HOURS") {
            self.sweeper.interval_hours = parse_u64("TRAVO_SWEEPER_INTERVAL_HOURS", &value)?;
        }

        if let Some(value) = read_env("TRAVO_POLICY_CODE_VALID_WORKING_DAYS_AFTER_START") {
            self.policy.code_valid_working_days_after_start =
                parse_i64("TRAVO_POLICY_CODE_VALID_WORKING_DAYS_AFTER_START", &value)?;
        }
        if let Some(value) = read_env("TRAVO_POLICY_CODE_REISSUE_WORKING_DAYS") {
            self.policy.code_reissue_working_days =
                parse_i64("TRAVO_POLICY_CODE_REISSUE_WORKING_DAYS", &value)?;
        }

        let log_level = read_env("TRAVO_LOGGING_LEVEL").or_else(|| read_env("TRAVO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TRAVO_LOGGING_FORMAT").or_else(|| read_env("TRAVO_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(interval_hours) = overrides.sweeper_interval_hours {
            self.sweeper.interval_hours = interval_hours;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        validate_sweeper(&self.sweeper)?;
        validate_policy(&self.policy)?;
        validate_hierarchy(&self.hierarchy)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("travo.toml"), PathBuf::from("config/travo.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_sweeper(sweeper: &SweeperConfig) -> Result<(), ConfigError> {
    if sweeper.interval_hours == 0 || sweeper.interval_hours > 168 {
        return Err(ConfigError::Validation(
            "sweeper.interval_hours must be in range 1..=168".to_string(),
        ));
    }

    Ok(())
}

fn validate_policy(policy: &PolicyConfig) -> Result<(), ConfigError> {
    if !(1..=30).contains(&policy.code_valid_working_days_after_start) {
        return Err(ConfigError::Validation(
            "policy.code_valid_working_days_after_start must be in range 1..=30".to_string(),
        ));
    }

    if !(1..=30).contains(&policy.code_reissue_working_days) {
        return Err(ConfigError::Validation(
            "policy.code_reissue_working_days must be in range 1..=30".to_string(),
        ));
    }

    if policy.standard_departments.iter().any(|department| department.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "policy.standard_departments must not contain blank entries".to_string(),
        ));
    }

    Ok(())
}

fn validate_hierarchy(hierarchy: &HierarchyConfig) -> Result<(), ConfigError> {
    if hierarchy.edges.is_empty() && hierarchy.wildcard_validators.is_empty() {
        return Err(ConfigError::Validation(
            "hierarchy must declare at least one edge or wildcard validator".to_string(),
        ));
    }

    let mut seen_requesters = HashSet::new();
    for edge in &hierarchy.edges {
        if !seen_requesters.insert(edge.requester) {
            return Err(ConfigError::Validation(format!(
                "hierarchy.edges declares more than one validator for requester `{}`",
                edge.requester
            )));
        }
        if edge.validator == edge.requester {
            return Err(ConfigError::Validation(format!(
                "hierarchy.edges must not let `{}` validate itself",
                edge.validator
            )));
        }
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    sweeper: Option<SweeperPatch>,
    policy: Option<PolicyPatch>,
    hierarchy: Option<HierarchyPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct SweeperPatch {
    interval_hours: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyPatch {
    code_valid_working_days_after_start: Option<i64>,
    code_reissue_working_days: Option<i64>,
    standard_departments: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct HierarchyPatch {
    edges: Option<Vec<HierarchyEdge>>,
    wildcard_validators: Option<Vec<crate::domain::user::Role>>,
}
