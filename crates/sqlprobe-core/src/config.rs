//! Probe configuration loaded from TOML
//!
//! ```toml
//! [[probe]]
//! name = "primary"
//! backend = "postgres"
//! connection_string_env = "DATABASE_URL"
//! failure_status = "degraded"
//! tags = ["db", "ready"]
//! timeout = "5s"
//! ```

use crate::connection::factory_error;
use crate::error::{ConfigError, DatabaseBackend, ProbeResult};
use crate::health::HealthStatus;
use crate::registration::SqlProbeOptions;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbesConfig {
    #[serde(default, rename = "probe")]
    pub probes: Vec<ProbeSettings>,
}

impl ProbesConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: ProbesConfig = toml::from_str(source)?;
        for probe in &config.probes {
            probe.connection_source()?;
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

/// One `[[probe]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSettings {
    pub name: Option<String>,
    pub backend: DatabaseBackend,
    pub connection_string: Option<String>,
    /// Environment variable read on every check
    pub connection_string_env: Option<String>,
    pub query: Option<String>,
    pub failure_status: Option<HealthStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub timeout: Option<Duration>,
}

/// Where a probe finds its connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSource {
    Literal(String),
    Env(String),
}

impl ConnectionSource {
    /// Resolve the connection string for one check
    pub fn resolve(&self) -> ProbeResult<String> {
        match self {
            ConnectionSource::Literal(value) => Ok(value.clone()),
            ConnectionSource::Env(var) => std::env::var(var)
                .map_err(|e| factory_error(format!("environment variable {var}: {e}"))),
        }
    }
}

impl ProbeSettings {
    /// Name used for the registration
    pub fn probe_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.backend.default_probe_name().to_string())
    }

    pub fn connection_source(&self) -> Result<ConnectionSource, ConfigError> {
        match (&self.connection_string, &self.connection_string_env) {
            (Some(value), None) => Ok(ConnectionSource::Literal(value.clone())),
            (None, Some(var)) => Ok(ConnectionSource::Env(var.clone())),
            _ => Err(ConfigError::ConnectionSource {
                name: self.probe_name(),
            }),
        }
    }

    /// Registration options for this probe
    pub fn options<C>(&self) -> SqlProbeOptions<C> {
        let mut options = SqlProbeOptions::new().name(self.probe_name());
        options.health_query = self.query.clone();
        options.failure_status = self.failure_status;
        options.tags = self.tags.clone();
        options.timeout = self.timeout;
        options
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|value| humantime::parse_duration(&value).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_probe_table() {
        let config = ProbesConfig::from_toml_str(
            r#"
            [[probe]]
            name = "primary"
            backend = "postgres"
            connection_string = "host=localhost user=postgres"
            query = "SELECT 2;"
            failure_status = "degraded"
            tags = ["db", "ready"]
            timeout = "1s 500ms"
            "#,
        )
        .unwrap();

        let probe = &config.probes[0];
        assert_eq!(probe.probe_name(), "primary");
        assert_eq!(probe.backend, DatabaseBackend::Postgres);
        assert_eq!(probe.failure_status, Some(HealthStatus::Degraded));
        assert_eq!(probe.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(
            probe.connection_source().unwrap(),
            ConnectionSource::Literal("host=localhost user=postgres".to_string())
        );
    }

    #[test]
    fn test_defaults_applied() {
        let config = ProbesConfig::from_toml_str(
            r#"
            [[probe]]
            backend = "sqlite"
            connection_string_env = "SQLPROBE_TEST_DB"
            "#,
        )
        .unwrap();

        let probe = &config.probes[0];
        assert_eq!(probe.probe_name(), "sqlite");
        assert!(probe.tags.is_empty());
        assert_eq!(probe.timeout, None);

        let options = probe.options::<()>();
        assert_eq!(options.name.as_deref(), Some("sqlite"));
        assert_eq!(options.health_query, None);
        assert_eq!(options.failure_status, None);
    }

    #[test]
    fn test_connection_source_must_be_unique() {
        let both = ProbesConfig::from_toml_str(
            r#"
            [[probe]]
            backend = "sqlite"
            connection_string = ":memory:"
            connection_string_env = "DB"
            "#,
        );
        assert!(matches!(both, Err(ConfigError::ConnectionSource { .. })));

        let neither = ProbesConfig::from_toml_str(
            r#"
            [[probe]]
            name = "orphan"
            backend = "postgres"
            "#,
        );
        assert!(matches!(
            neither,
            Err(ConfigError::ConnectionSource { name }) if name == "orphan"
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_timeout = ProbesConfig::from_toml_str(
            r#"
            [[probe]]
            backend = "sqlite"
            connection_string = ":memory:"
            timeout = "soon"
            "#,
        );
        assert!(matches!(bad_timeout, Err(ConfigError::Parse(_))));

        let custom_backend = ProbesConfig::from_toml_str(
            r#"
            [[probe]]
            backend = "other"
            connection_string = "x"
            "#,
        );
        assert!(matches!(custom_backend, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_env_var_is_factory_error() {
        let source = ConnectionSource::Env("SQLPROBE_DEFINITELY_UNSET_VAR".to_string());
        let error = source.resolve().unwrap_err();
        assert!(error.to_string().contains("SQLPROBE_DEFINITELY_UNSET_VAR"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probes.toml");
        std::fs::write(
            &path,
            "[[probe]]\nbackend = \"sqlite\"\nconnection_string = \":memory:\"\n",
        )
        .unwrap();

        let config = ProbesConfig::load(&path).unwrap();
        assert_eq!(config.probes.len(), 1);

        let missing = ProbesConfig::load(dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
