//! # sqlprobe core
//!
//! Health probes for relational databases. A probe opens a connection,
//! runs a trivial query and reports a [`HealthStatus`] without ever
//! failing its caller.
//!
//! Backends live in `sqlprobe-backends`; this crate holds the connection
//! abstraction, the probe executor, registrations and configuration.

pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod probe;
pub mod registration;

pub use config::{ConnectionSource, ProbeSettings, ProbesConfig};
pub use connection::{
    BeforeOpen, CommandConfigurer, ConnectionFactory, ConnectionState, FromConnectionString,
    SqlCommand, SqlConnection,
};
pub use error::{ConfigError, DatabaseBackend, ProbeError, ProbeResult};
pub use health::{HealthCheck, HealthCheckContext, HealthCheckResult, HealthStatus};
pub use probe::{DEFAULT_HEALTH_QUERY, SqlHealthCheck, SqlHealthCheckBuilder};
pub use registration::{
    HealthCheckRegistration, HealthChecks, HealthChecksBuilder, HealthReport, HealthReportEntry,
    SqlProbeOptions,
};
pub use tokio_util::sync::CancellationToken;
