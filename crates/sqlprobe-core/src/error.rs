//! Error Types
//!
//! `ProbeError` is the failure detail attached to an unhealthy check result.
//! It never escapes a probe: the executor converts every variant into a
//! [`HealthCheckResult`](crate::health::HealthCheckResult). `ConfigError`
//! covers setup-time failures (loading and validating probe configuration)
//! and is returned to the caller as usual.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Database backend a connection talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    Sqlite,
    /// Any connection type supplied by the caller
    #[serde(skip_deserializing)]
    Other,
}

impl DatabaseBackend {
    /// Registration name used when none is supplied
    pub fn default_probe_name(&self) -> &'static str {
        match self {
            DatabaseBackend::Postgres => "postgres",
            DatabaseBackend::Sqlite => "sqlite",
            DatabaseBackend::Other => "sql",
        }
    }
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseBackend::Postgres => write!(f, "postgres"),
            DatabaseBackend::Sqlite => write!(f, "sqlite"),
            DatabaseBackend::Other => write!(f, "other"),
        }
    }
}

/// Reasons a single probe attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The connection factory produced no connection.
    #[error("SQL connection cannot be null")]
    NullConnection,

    /// The connection source failed before a connection object existed.
    #[error("Failed to create connection: {reason}")]
    ConnectionFactory { reason: String },

    /// Opening the connection failed.
    #[error("Failed to open {backend} connection: {reason}")]
    Open {
        backend: DatabaseBackend,
        reason: String,
    },

    /// The health command failed on the server or in the driver.
    #[error("Health query failed on {backend}: {reason}")]
    Execute {
        backend: DatabaseBackend,
        reason: String,
    },

    /// An operation exceeded its time budget.
    #[error("{operation} timed out after {}", format_timeout(.timeout))]
    TimedOut {
        operation: &'static str,
        timeout: Duration,
    },

    /// The caller cancelled the check before it completed.
    #[error("Health check was cancelled")]
    Cancelled,
}

impl ProbeError {
    pub fn connection_factory(reason: impl Into<String>) -> Self {
        ProbeError::ConnectionFactory {
            reason: reason.into(),
        }
    }

    pub fn open(backend: DatabaseBackend, reason: impl Into<String>) -> Self {
        ProbeError::Open {
            backend,
            reason: reason.into(),
        }
    }

    pub fn execute(backend: DatabaseBackend, reason: impl Into<String>) -> Self {
        ProbeError::Execute {
            backend,
            reason: reason.into(),
        }
    }

    /// Whether the failure came from cancellation or a time budget rather than the database
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ProbeError::Cancelled | ProbeError::TimedOut { .. })
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;

fn format_timeout(timeout: &Duration) -> String {
    humantime::format_duration(*timeout).to_string()
}

/// Errors raised while loading or applying probe configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid probe configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Probe '{name}' needs exactly one of connection_string or connection_string_env")]
    ConnectionSource { name: String },

    #[error("Probe '{name}' uses backend '{backend}' which is not compiled into this build")]
    UnsupportedBackend {
        name: String,
        backend: DatabaseBackend,
    },

    #[error("Duplicate probe name '{name}'")]
    DuplicateName { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_connection_message() {
        assert_eq!(
            ProbeError::NullConnection.to_string(),
            "SQL connection cannot be null"
        );
    }

    #[test]
    fn test_timed_out_formats_duration() {
        let error = ProbeError::TimedOut {
            operation: "health check",
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(error.to_string(), "health check timed out after 1s 500ms");
        assert!(error.is_interrupted());
        assert!(ProbeError::Cancelled.is_interrupted());
        assert!(!ProbeError::NullConnection.is_interrupted());
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(DatabaseBackend::Postgres.default_probe_name(), "postgres");
        assert_eq!(DatabaseBackend::Sqlite.to_string(), "sqlite");
        assert_eq!(DatabaseBackend::Other.default_probe_name(), "sql");

        let error = ProbeError::open(DatabaseBackend::Postgres, "connection refused");
        assert_eq!(
            error.to_string(),
            "Failed to open postgres connection: connection refused"
        );
    }
}
