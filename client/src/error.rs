//! Client error taxonomy and the retry classification used by the runner.
//!
//! Only two kinds of failure are absorbed by the transaction runner:
//! aborts and missing sessions. Everything else reaches the caller with the
//! original code and message intact.

use std::fmt;
use std::time::Duration;

use crate::config::ConfigError;
use crate::status::{Code, Status};

/// Errors surfaced by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The transaction was aborted by a conflicting transaction. Retryable.
    Aborted {
        message: String,
        /// Server-provided hint for how long to wait before retrying.
        retry_delay: Option<Duration>,
    },
    /// The session used by the attempt is unknown to the store. Retryable
    /// with a different session.
    SessionNotFound { message: String },
    /// Any other status returned by the store.
    Rpc(Status),
    /// The caller-imposed deadline expired.
    DeadlineExceeded { deadline: Duration },
    /// The operation was cancelled before it completed.
    Cancelled(String),
    /// The session pool has been closed.
    PoolClosed,
    /// No session became available within the acquire timeout.
    PoolExhausted {
        max_sessions: usize,
        waited: Duration,
    },
    /// The retry ceiling was hit. `last` is the failure of the final attempt.
    AbortedTooManyTimes {
        attempts: u32,
        last: Box<ClientError>,
    },
    /// An object was used outside of its valid lifetime.
    InvalidState(String),
    /// A row payload could not be decoded.
    Decode(String),
    /// Invalid configuration.
    Config(ConfigError),
}

/// What the runner should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Back off and run the body again on the same kind of session.
    Retry,
    /// Drop the session from the pool and run the body again.
    RetryWithNewSession,
    /// Stop and return the error to the caller.
    Fail,
}

impl ClientError {
    /// Stable classification of the error.
    #[must_use]
    pub const fn code(&self) -> Code {
        match self {
            Self::Aborted { .. } | Self::AbortedTooManyTimes { .. } => Code::Aborted,
            Self::SessionNotFound { .. } => Code::NotFound,
            Self::Rpc(status) => status.code,
            Self::DeadlineExceeded { .. } => Code::DeadlineExceeded,
            Self::Cancelled(_) => Code::Cancelled,
            Self::PoolClosed | Self::InvalidState(_) => Code::FailedPrecondition,
            Self::PoolExhausted { .. } => Code::ResourceExhausted,
            Self::Decode(_) => Code::Internal,
            Self::Config(_) => Code::InvalidArgument,
        }
    }

    /// Retry decision for a failed attempt.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::Aborted { .. } => Disposition::Retry,
            Self::SessionNotFound { .. } => Disposition::RetryWithNewSession,
            _ => Disposition::Fail,
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self.disposition(), Disposition::Fail)
    }

    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Server-provided retry delay, if this is an abort that carries one.
    #[must_use]
    pub const fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::Aborted { retry_delay, .. } => *retry_delay,
            _ => None,
        }
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn lock_poisoned(what: &str) -> Self {
        Self::InvalidState(format!("{what} lock poisoned"))
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        if status.code == Code::Aborted {
            return Self::Aborted {
                message: status.message,
                retry_delay: status.retry_delay,
            };
        }
        if status.is_session_not_found() {
            return Self::SessionNotFound {
                message: status.message,
            };
        }
        Self::Rpc(status)
    }
}

impl From<ConfigError> for ClientError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted { message, .. } => write!(f, "ABORTED: {message}"),
            Self::SessionNotFound { message } => write!(f, "NOT_FOUND: {message}"),
            Self::Rpc(status) => write!(f, "{status}"),
            Self::DeadlineExceeded { deadline } => {
                write!(f, "DEADLINE_EXCEEDED: operation did not finish within {deadline:?}")
            }
            Self::Cancelled(message) => write!(f, "CANCELLED: {message}"),
            Self::PoolClosed => write!(f, "FAILED_PRECONDITION: session pool has been closed"),
            Self::PoolExhausted {
                max_sessions,
                waited,
            } => write!(
                f,
                "RESOURCE_EXHAUSTED: no session available after {waited:?} (max_sessions={max_sessions})"
            ),
            Self::AbortedTooManyTimes { attempts, last } => write!(
                f,
                "ABORTED: transaction aborted too many times ({attempts} attempts), last error: {last}"
            ),
            Self::InvalidState(message) => write!(f, "FAILED_PRECONDITION: {message}"),
            Self::Decode(message) => write!(f, "INTERNAL: failed to decode row: {message}"),
            Self::Config(e) => write!(f, "INVALID_ARGUMENT: {e}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(status) => Some(status),
            Self::AbortedTooManyTimes { last, .. } => Some(last.as_ref()),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}
