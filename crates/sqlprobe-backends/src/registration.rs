//! Backend-specific registration helpers
//!
//! Sugar over [`HealthChecksBuilder::add_sql`] and friends that fixes the
//! connection type, plus registration of probes declared in a
//! [`ProbesConfig`].

use sqlprobe_core::{
    CancellationToken, ConfigError, DatabaseBackend, HealthChecksBuilder, ProbeResult,
    ProbeSettings, ProbesConfig,
};
#[cfg(any(feature = "postgres", feature = "sqlite"))]
use sqlprobe_core::SqlProbeOptions;
use std::future::Future;

#[cfg(feature = "postgres")]
use crate::postgres::PostgresConnection;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteConnection;

/// Register PostgreSQL and SQLite probes on a [`HealthChecksBuilder`]
pub trait SqlProbeBuilderExt {
    /// Probe PostgreSQL through a fixed connection string
    #[cfg(feature = "postgres")]
    fn add_postgres(
        &mut self,
        connection_string: impl Into<String>,
        options: SqlProbeOptions<PostgresConnection>,
    ) -> &mut Self;

    /// Probe PostgreSQL with a connection string produced on every check
    #[cfg(feature = "postgres")]
    fn add_postgres_with<F>(
        &mut self,
        connection_string: F,
        options: SqlProbeOptions<PostgresConnection>,
    ) -> &mut Self
    where
        F: Fn() -> ProbeResult<String> + Send + Sync + 'static;

    /// Probe PostgreSQL connections produced by an async factory
    #[cfg(feature = "postgres")]
    fn add_postgres_connection<F, Fut>(
        &mut self,
        connection_factory: F,
        options: SqlProbeOptions<PostgresConnection>,
    ) -> &mut Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult<Option<PostgresConnection>>> + Send + 'static;

    /// Probe the SQLite database at a path
    #[cfg(feature = "sqlite")]
    fn add_sqlite(
        &mut self,
        path: impl Into<String>,
        options: SqlProbeOptions<SqliteConnection>,
    ) -> &mut Self;

    /// Probe SQLite with a path produced on every check
    #[cfg(feature = "sqlite")]
    fn add_sqlite_with<F>(
        &mut self,
        path: F,
        options: SqlProbeOptions<SqliteConnection>,
    ) -> &mut Self
    where
        F: Fn() -> ProbeResult<String> + Send + Sync + 'static;

    /// Probe SQLite connections produced by an async factory
    #[cfg(feature = "sqlite")]
    fn add_sqlite_connection<F, Fut>(
        &mut self,
        connection_factory: F,
        options: SqlProbeOptions<SqliteConnection>,
    ) -> &mut Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult<Option<SqliteConnection>>> + Send + 'static;
}

impl SqlProbeBuilderExt for HealthChecksBuilder {
    #[cfg(feature = "postgres")]
    fn add_postgres(
        &mut self,
        connection_string: impl Into<String>,
        options: SqlProbeOptions<PostgresConnection>,
    ) -> &mut Self {
        self.add_sql(connection_string, options)
    }

    #[cfg(feature = "postgres")]
    fn add_postgres_with<F>(
        &mut self,
        connection_string: F,
        options: SqlProbeOptions<PostgresConnection>,
    ) -> &mut Self
    where
        F: Fn() -> ProbeResult<String> + Send + Sync + 'static,
    {
        self.add_sql_with(connection_string, options)
    }

    #[cfg(feature = "postgres")]
    fn add_postgres_connection<F, Fut>(
        &mut self,
        connection_factory: F,
        options: SqlProbeOptions<PostgresConnection>,
    ) -> &mut Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult<Option<PostgresConnection>>> + Send + 'static,
    {
        self.add_sql_connection(connection_factory, options)
    }

    #[cfg(feature = "sqlite")]
    fn add_sqlite(
        &mut self,
        path: impl Into<String>,
        options: SqlProbeOptions<SqliteConnection>,
    ) -> &mut Self {
        self.add_sql(path, options)
    }

    #[cfg(feature = "sqlite")]
    fn add_sqlite_with<F>(
        &mut self,
        path: F,
        options: SqlProbeOptions<SqliteConnection>,
    ) -> &mut Self
    where
        F: Fn() -> ProbeResult<String> + Send + Sync + 'static,
    {
        self.add_sql_with(path, options)
    }

    #[cfg(feature = "sqlite")]
    fn add_sqlite_connection<F, Fut>(
        &mut self,
        connection_factory: F,
        options: SqlProbeOptions<SqliteConnection>,
    ) -> &mut Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult<Option<SqliteConnection>>> + Send + 'static,
    {
        self.add_sql_connection(connection_factory, options)
    }
}

/// Register every probe declared in `config`
pub fn register_probes(
    builder: &mut HealthChecksBuilder,
    config: &ProbesConfig,
) -> Result<(), ConfigError> {
    for probe in &config.probes {
        register_probe(builder, probe)?;
    }
    Ok(())
}

/// Register one configured probe
pub fn register_probe(
    builder: &mut HealthChecksBuilder,
    probe: &ProbeSettings,
) -> Result<(), ConfigError> {
    let source = probe.connection_source()?;
    tracing::debug!(
        probe = %probe.probe_name(),
        backend = %probe.backend,
        "Registering configured probe"
    );

    match probe.backend {
        #[cfg(feature = "postgres")]
        DatabaseBackend::Postgres => {
            builder.add_postgres_with(move || source.resolve(), probe.options());
        }
        #[cfg(feature = "sqlite")]
        DatabaseBackend::Sqlite => {
            builder.add_sqlite_with(move || source.resolve(), probe.options());
        }
        backend => {
            return Err(ConfigError::UnsupportedBackend {
                name: probe.probe_name(),
                backend,
            });
        }
    }

    Ok(())
}
