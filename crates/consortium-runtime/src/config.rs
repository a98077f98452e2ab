//! Runtime configuration.
//!
//! Loaded from TOML with every field optional, then overridden from
//! `CONSORTIUM_*` environment variables.

use serde::Deserialize;
use thiserror::Error;

use consortium_kernel::model::DEFAULT_GRANT_MODE;

pub const ENV_APPROVAL_ENABLED: &str = "CONSORTIUM_APPROVAL_ENABLED";
pub const ENV_FAILURE_TOLERANCE: &str = "CONSORTIUM_FAILURE_TOLERANCE";
pub const ENV_MAX_PARALLELISM: &str = "CONSORTIUM_MAX_PARALLELISM";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "CONSORTIUM_RETRY_MAX_ATTEMPTS";
pub const ENV_JOB_NAMESPACE: &str = "CONSORTIUM_JOB_NAMESPACE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// When set, submitted jobs wait in AwaitingApproval for every participant.
    pub enabled: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fraction of failed tasks an independent BestEffort job tolerates
    /// before it is failed early. Must lie in `[0, 1]`.
    pub failure_tolerance: f64,
    /// Applied to jobs that do not set `max_parallelism`; `None` is unbounded.
    pub default_max_parallelism: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per optimistic-concurrency write before the conflict is
    /// surfaced.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GrantConfig {
    pub id_prefix: String,
    pub default_grant_mode: String,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            id_prefix: "domaindatagrant".to_string(),
            default_grant_mode: DEFAULT_GRANT_MODE.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ResyncConfig {
    /// Namespace holding jobs.
    pub namespace: String,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            namespace: "cross-domain".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub approval: ApprovalConfig,
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub grant: GrantConfig,
    pub resync: ResyncConfig,
}

impl RuntimeConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps an env key to its value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_APPROVAL_ENABLED) {
            self.approval.enabled = parse_env(ENV_APPROVAL_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_FAILURE_TOLERANCE) {
            self.scheduler.failure_tolerance = parse_env(ENV_FAILURE_TOLERANCE, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_PARALLELISM) {
            self.scheduler.default_max_parallelism =
                Some(parse_env(ENV_MAX_PARALLELISM, &value)?);
        }
        if let Some(value) = lookup(ENV_RETRY_MAX_ATTEMPTS) {
            self.retry.max_attempts = parse_env(ENV_RETRY_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = lookup(ENV_JOB_NAMESPACE) {
            self.resync.namespace = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tolerance = self.scheduler.failure_tolerance;
        if !(0.0..=1.0).contains(&tolerance) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.failure_tolerance must be within [0, 1], got {tolerance}"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.scheduler.default_max_parallelism == Some(0) {
            return Err(ConfigError::Invalid(
                "scheduler.default_max_parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
