//! Client configuration.
//!
//! This module provides the configuration consumed at client construction:
//! which database to talk to, how the session pool is sized and how hard the
//! transaction runner retries aborted transactions. Configuration is built
//! programmatically or loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `TXN_CLIENT_PROJECT`: Project of the database (required)
//! - `TXN_CLIENT_INSTANCE`: Instance of the database (required)
//! - `TXN_CLIENT_DATABASE`: Database name (required)
//! - `TXN_CLIENT_MIN_SESSIONS`: Sessions kept warm (default: `1`)
//! - `TXN_CLIENT_MAX_SESSIONS`: Upper bound on live sessions (default: `16`)
//! - `TXN_CLIENT_MAX_ATTEMPTS`: Transaction attempts before giving up (default: `10`)
//! - `TXN_CLIENT_ACQUIRE_TIMEOUT_MS`: How long `acquire` waits for a session (default: `30000`)
//!
//! # Invariants
//!
//! - A validated `SessionPoolOptions` has `0 < max_sessions` and `min_sessions <= max_sessions`
//! - A validated `RetrySettings` has `max_attempts >= 1` and `initial_backoff <= max_backoff`

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Fully qualified identifier of a database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatabaseId {
    pub project: String,
    pub instance: String,
    pub database: String,
}

impl DatabaseId {
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        instance: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            instance: instance.into(),
            database: database.into(),
        }
    }

    /// Resource name, e.g. `projects/p/instances/i/databases/d`.
    #[must_use]
    pub fn name(&self) -> String {
        format!(
            "projects/{}/instances/{}/databases/{}",
            self.project, self.instance, self.database
        )
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Sizing and housekeeping policy of the session pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPoolOptions {
    /// Sessions created eagerly and kept through idle eviction.
    pub min_sessions: usize,
    /// Upper bound on idle plus checked-out sessions.
    pub max_sessions: usize,
    /// How long `acquire` waits for capacity before failing.
    pub acquire_timeout: Duration,
    /// Idle sessions unused for longer than this are evicted by maintenance.
    /// `Duration::ZERO` disables eviction.
    pub idle_timeout: Duration,
    /// Period of the background maintenance task.
    pub maintenance_interval: Duration,
}

impl SessionPoolOptions {
    pub const DEFAULT_MIN_SESSIONS: usize = 1;
    pub const DEFAULT_MAX_SESSIONS: usize = 16;
    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
    pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10);

    #[must_use]
    pub const fn with_min_sessions(mut self, min_sessions: usize) -> Self {
        self.min_sessions = min_sessions;
        self
    }

    #[must_use]
    pub const fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Check the sizing invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_sessions` is zero or smaller than `min_sessions`,
    /// or if the maintenance interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maintenance_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "maintenance_interval".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_sessions".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.min_sessions > self.max_sessions {
            return Err(ConfigError::InvalidValue {
                name: "min_sessions".to_string(),
                message: format!(
                    "{} exceeds max_sessions ({})",
                    self.min_sessions, self.max_sessions
                ),
            });
        }
        Ok(())
    }
}

impl Default for SessionPoolOptions {
    fn default() -> Self {
        Self {
            min_sessions: Self::DEFAULT_MIN_SESSIONS,
            max_sessions: Self::DEFAULT_MAX_SESSIONS,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
            maintenance_interval: Self::DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

/// Retry ceiling and backoff curve for aborted transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Optional wall-clock ceiling across all attempts of one `run`.
    pub max_elapsed: Option<Duration>,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Randomize each delay within `[delay / 2, delay]`.
    pub jitter: bool,
}

impl RetrySettings {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(10);
    pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1);
    pub const DEFAULT_MULTIPLIER: f64 = 2.0;

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub const fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    #[must_use]
    pub const fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Check the retry invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if no attempt is allowed, the multiplier shrinks the
    /// delay, or the initial backoff exceeds the maximum.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(ConfigError::InvalidValue {
                name: "multiplier".to_string(),
                message: format!("{} must be a finite number >= 1.0", self.multiplier),
            });
        }
        if self.initial_backoff > self.max_backoff {
            return Err(ConfigError::InvalidValue {
                name: "initial_backoff".to_string(),
                message: format!(
                    "{:?} exceeds max_backoff ({:?})",
                    self.initial_backoff, self.max_backoff
                ),
            });
        }
        Ok(())
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            max_elapsed: None,
            initial_backoff: Self::DEFAULT_INITIAL_BACKOFF,
            max_backoff: Self::DEFAULT_MAX_BACKOFF,
            multiplier: Self::DEFAULT_MULTIPLIER,
            jitter: true,
        }
    }
}

/// Client configuration.
///
/// # Post-conditions
///
/// When constructed via `from_env()` the pool options and retry settings
/// have passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub database: DatabaseId,
    pub pool: SessionPoolOptions,
    pub retry: RetrySettings,
}

/// Error returned when loading or validating configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// A setting has an invalid value.
    InvalidValue { name: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ClientConfig {
    #[must_use]
    pub fn new(database: DatabaseId) -> Self {
        Self {
            database,
            pool: SessionPoolOptions::default(),
            retry: RetrySettings::default(),
        }
    }

    #[must_use]
    pub fn with_pool_options(mut self, pool: SessionPoolOptions) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn with_retry_settings(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Validate pool options and retry settings.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate()?;
        self.retry.validate()
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - One of the database identifier variables is not set or is empty
    /// - A numeric variable is set but does not parse
    /// - The resulting configuration fails validation
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = DatabaseId::new(
            required(&lookup, "TXN_CLIENT_PROJECT")?,
            required(&lookup, "TXN_CLIENT_INSTANCE")?,
            required(&lookup, "TXN_CLIENT_DATABASE")?,
        );

        let pool = SessionPoolOptions::default()
            .with_min_sessions(optional(
                &lookup,
                "TXN_CLIENT_MIN_SESSIONS",
                SessionPoolOptions::DEFAULT_MIN_SESSIONS,
            )?)
            .with_max_sessions(optional(
                &lookup,
                "TXN_CLIENT_MAX_SESSIONS",
                SessionPoolOptions::DEFAULT_MAX_SESSIONS,
            )?)
            .with_acquire_timeout(Duration::from_millis(optional(
                &lookup,
                "TXN_CLIENT_ACQUIRE_TIMEOUT_MS",
                30_000_u64,
            )?));

        let retry = RetrySettings::default().with_max_attempts(optional(
            &lookup,
            "TXN_CLIENT_MAX_ATTEMPTS",
            RetrySettings::DEFAULT_MAX_ATTEMPTS,
        )?);

        let config = Self {
            database,
            pool,
            retry,
        };
        config.validate()?;
        Ok(config)
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(value)
}

fn optional<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a valid number"),
        }),
        None => Ok(default),
    }
}
