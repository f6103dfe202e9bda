//! Turn command-line arguments into health check registrations

use clap::{Args, ValueEnum};
use sqlprobe_backends::{SqlProbeBuilderExt, register_probes};
use sqlprobe_core::{
    ConfigError, HealthChecks, HealthChecksBuilder, HealthStatus, ProbesConfig, SqlProbeOptions,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Postgres,
    Sqlite,
}

/// Options for a single ad-hoc probe
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Database backend
    #[arg(long, value_enum)]
    pub backend: Backend,
    /// Connection string (PostgreSQL) or database path (SQLite)
    #[arg(long, env = "SQLPROBE_CONNECTION_STRING")]
    pub connection_string: String,
    /// Query to execute (default: SELECT 1;)
    #[arg(long)]
    pub query: Option<String>,
    /// Name reported for the probe
    #[arg(long)]
    pub name: Option<String>,
    /// Status reported when the probe fails (healthy, degraded, unhealthy)
    #[arg(long)]
    pub failure_status: Option<HealthStatus>,
    /// Tag to attach; may be repeated
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Time budget for the whole check, e.g. "5s" or "500ms"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

/// Options for running probes declared in a file
#[derive(Args, Debug)]
pub struct RunArgs {
    /// TOML file with [[probe]] tables
    #[arg(long, short)]
    pub config: PathBuf,
    /// Only run probes carrying this tag
    #[arg(long)]
    pub tag: Option<String>,
}

impl CheckArgs {
    fn options<C>(&self) -> SqlProbeOptions<C> {
        let mut options = SqlProbeOptions::new();
        options.health_query = self.query.clone();
        options.name = self.name.clone();
        options.failure_status = self.failure_status;
        options.tags = self.tags.clone();
        options.timeout = self.timeout;
        options
    }

    pub fn into_checks(self) -> Result<HealthChecks, ConfigError> {
        let mut builder = HealthChecksBuilder::new();
        match self.backend {
            Backend::Postgres => {
                builder.add_postgres(self.connection_string.clone(), self.options());
            }
            Backend::Sqlite => {
                builder.add_sqlite(self.connection_string.clone(), self.options());
            }
        }
        builder.build()
    }
}

impl RunArgs {
    pub fn load_checks(&self) -> Result<HealthChecks, ConfigError> {
        let config = ProbesConfig::load(&self.config)?;
        tracing::info!(
            path = %self.config.display(),
            probes = config.probes.len(),
            "Loaded probe configuration"
        );

        let mut builder = HealthChecksBuilder::new();
        register_probes(&mut builder, &config)?;
        builder.build()
    }
}
