use std::str::FromStr;
use std::time::Duration;

use crackhash_core::digest::HashAlgorithm;
use crackhash_core::retry::{RetryPolicy, DEFAULT_RETRY_COUNT};
use crackhash_core::store::memory::DEFAULT_MAX_REQUESTS;

/// Errors raised while reading configuration from the environment.
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

/// Read `name`, falling back to `default` when unset.
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

/// Split a comma-separated list, dropping blanks.
fn env_list(name: &'static str, default: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// HTTP server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        let cors_origins = env_list("CORS_ORIGINS", "http://localhost:5173");
        for origin in &cors_origins {
            origin
                .parse::<axum::http::HeaderValue>()
                .map_err(|e| ConfigError::Invalid {
                    name: "CORS_ORIGINS",
                    value: origin.clone(),
                    reason: e.to_string(),
                })?;
        }

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("PORT", 3000)?,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
        })
    }
}

/// How tasks and results travel between the manager and the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Tasks are POSTed to worker `i` for part `i`; results come back over
    /// HTTP. Single manager, in-process store.
    Direct,
    /// Intake, tasks and results go through durable Postgres queues and the
    /// request store lives in Postgres.
    Queue,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "http" => Ok(DeliveryMode::Direct),
            "queue" => Ok(DeliveryMode::Queue),
            other => Err(format!("expected 'direct' or 'queue', got '{other}'")),
        }
    }
}

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CrackConfig {
    /// Worker base URLs; the pool size fixes every request's part count.
    pub worker_urls: Vec<String>,
    pub delivery_mode: DeliveryMode,
    /// Retry policy for every call made to a worker.
    pub retry: RetryPolicy,
    /// Delay between intake/store polls.
    pub poll_interval: Duration,
    /// Period of the health monitor and the timeout sweep.
    pub healthcheck_interval: Duration,
    /// Lifetime of an IN_PROGRESS request before it is moved to ERROR.
    pub request_timeout_secs: u64,
    /// Retention ceiling for the in-process store.
    pub store_max_requests: usize,
    pub hash_algorithm: HashAlgorithm,
    /// Required in queue mode.
    pub database_url: Option<String>,
    /// Lease length of an unacknowledged queue delivery.
    pub queue_visibility: Duration,
}

impl CrackConfig {
    /// Load coordinator settings.
    ///
    /// | Env Var                      | Default   |
    /// |------------------------------|-----------|
    /// | `WORKER_URLS`                | required  |
    /// | `DELIVERY_MODE`              | `direct`  |
    /// | `RETRY_COUNT`                | `3`       |
    /// | `RETRY_TIMEOUT_SECONDS`      | `1`       |
    /// | `POLL_INTERVAL_SECONDS`      | `1`       |
    /// | `HEALTHCHECK_SECONDS`        | `3`       |
    /// | `CRACK_REQUEST_TIMEOUT_SECS` | `30000`   |
    /// | `STORE_MAX_REQUESTS`         | `1000`    |
    /// | `HASH_ALGORITHM`             | `md5`     |
    /// | `DATABASE_URL`               | queue mode only |
    /// | `QUEUE_VISIBILITY_SECS`      | `60`      |
    pub fn from_env() -> Result<Self, ConfigError> {
        let worker_urls: Vec<String> = env_list("WORKER_URLS", "")
            .into_iter()
            .map(|url| url.trim_end_matches('/').to_string())
            .collect();
        if worker_urls.is_empty() {
            return Err(ConfigError::Missing("WORKER_URLS"));
        }

        let delivery_mode: DeliveryMode = env_or("DELIVERY_MODE", DeliveryMode::Direct)?;
        let database_url = std::env::var("DATABASE_URL").ok();
        if delivery_mode == DeliveryMode::Queue && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let poll_interval = Duration::from_secs(env_or("POLL_INTERVAL_SECONDS", 1)?);
        let queue_visibility = Duration::from_secs(env_or("QUEUE_VISIBILITY_SECS", 60)?);
        if poll_interval >= queue_visibility {
            return Err(ConfigError::Invalid {
                name: "QUEUE_VISIBILITY_SECS",
                value: queue_visibility.as_secs().to_string(),
                reason: "must be longer than POLL_INTERVAL_SECONDS".to_string(),
            });
        }

        Ok(Self {
            worker_urls,
            delivery_mode,
            retry: RetryPolicy::new(
                env_or("RETRY_COUNT", DEFAULT_RETRY_COUNT)?,
                Duration::from_secs(env_or("RETRY_TIMEOUT_SECONDS", 1)?),
            ),
            poll_interval,
            healthcheck_interval: Duration::from_secs(env_or("HEALTHCHECK_SECONDS", 3)?),
            request_timeout_secs: env_or("CRACK_REQUEST_TIMEOUT_SECS", 30_000)?,
            store_max_requests: env_or("STORE_MAX_REQUESTS", DEFAULT_MAX_REQUESTS)?,
            hash_algorithm: env_or("HASH_ALGORITHM", HashAlgorithm::default())?,
            database_url,
            queue_visibility,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_mode_parses_case_insensitively() {
        assert_eq!("Direct".parse::<DeliveryMode>(), Ok(DeliveryMode::Direct));
        assert_eq!("QUEUE".parse::<DeliveryMode>(), Ok(DeliveryMode::Queue));
        assert!("rabbit".parse::<DeliveryMode>().is_err());
    }

    #[test]
    fn invalid_value_names_the_variable() {
        let err = ConfigError::Invalid {
            name: "PORT",
            value: "abc".into(),
            reason: "invalid digit found in string".into(),
        };
        assert!(err.to_string().starts_with("PORT has an invalid value 'abc'"));
    }
}
