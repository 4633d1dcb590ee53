use std::str::FromStr;
use std::time::Duration;

use crackhash_core::digest::HashAlgorithm;
use crackhash_core::retry::{RetryPolicy, DEFAULT_RETRY_COUNT};

/// Default number of direct-mode tasks a worker holds while it is busy.
pub const DEFAULT_TASK_BACKLOG: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

fn env_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Where tasks come from and where results go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSource {
    /// The manager POSTs tasks; results are PATCHed back to `MANAGER_URL`.
    Direct,
    /// Tasks are pulled from the shared `tasks` queue; results are pushed
    /// onto the `results` queue.
    Queue,
}

impl FromStr for TaskSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "http" => Ok(TaskSource::Direct),
            "queue" => Ok(TaskSource::Queue),
            other => Err(format!("expected 'direct' or 'queue', got '{other}'")),
        }
    }
}

/// Worker process settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub source: TaskSource,
    /// Manager base URL; required in direct mode.
    pub manager_url: Option<String>,
    /// Retry policy for result delivery.
    pub retry: RetryPolicy,
    /// Delay between empty queue polls.
    pub poll_interval: Duration,
    pub hash_algorithm: HashAlgorithm,
    /// Required in queue mode.
    pub database_url: Option<String>,
    pub queue_visibility: Duration,
    pub task_backlog: usize,
}

impl WorkerConfig {
    /// Load worker settings.
    ///
    /// | Env Var                 | Default          |
    /// |-------------------------|------------------|
    /// | `HOST`                  | `0.0.0.0`        |
    /// | `PORT`                  | `8080`           |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`             |
    /// | `DELIVERY_MODE`         | `direct`         |
    /// | `MANAGER_URL`           | direct mode only |
    /// | `RETRY_COUNT`           | `3`              |
    /// | `RETRY_TIMEOUT_SECONDS` | `1`              |
    /// | `POLL_INTERVAL_SECONDS` | `1`              |
    /// | `HASH_ALGORITHM`        | `md5`            |
    /// | `DATABASE_URL`          | queue mode only  |
    /// | `QUEUE_VISIBILITY_SECS` | `60`             |
    /// | `TASK_BACKLOG`          | `16`             |
    pub fn from_env() -> Result<Self, ConfigError> {
        let source: TaskSource = env_or("DELIVERY_MODE", TaskSource::Direct)?;

        let manager_url = std::env::var("MANAGER_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        let database_url = std::env::var("DATABASE_URL").ok();
        match source {
            TaskSource::Direct if manager_url.is_none() => {
                return Err(ConfigError::Missing("MANAGER_URL"))
            }
            TaskSource::Queue if database_url.is_none() => {
                return Err(ConfigError::Missing("DATABASE_URL"))
            }
            _ => {}
        }

        let task_backlog: usize = env_or("TASK_BACKLOG", DEFAULT_TASK_BACKLOG)?;
        if task_backlog == 0 {
            return Err(ConfigError::Invalid {
                name: "TASK_BACKLOG",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("PORT", 8080)?,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
            source,
            manager_url,
            retry: RetryPolicy::new(
                env_or("RETRY_COUNT", DEFAULT_RETRY_COUNT)?,
                Duration::from_secs(env_or("RETRY_TIMEOUT_SECONDS", 1)?),
            ),
            poll_interval: Duration::from_secs(env_or("POLL_INTERVAL_SECONDS", 1)?),
            hash_algorithm: env_or("HASH_ALGORITHM", HashAlgorithm::default())?,
            database_url,
            queue_visibility: Duration::from_secs(env_or("QUEUE_VISIBILITY_SECS", 60)?),
            task_backlog,
        })
    }
}
