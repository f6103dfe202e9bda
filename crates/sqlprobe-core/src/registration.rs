//! Registrations, the registration builder and the check runner
//!
//! A [`HealthCheckRegistration`] binds a check to its name, failure status,
//! tags and timeout. [`HealthChecksBuilder`] offers one entry point per kind
//! of connection source; [`HealthChecks`] runs the result.

use crate::connection::{
    BeforeOpen, CommandConfigurer, ConnectionFactory, ConnectionStringFactory,
    FromConnectionString, SqlCommand, SqlConnection, string_source_factory,
};
use crate::error::{ConfigError, ProbeError, ProbeResult};
use crate::health::{HealthCheck, HealthCheckContext, HealthCheckResult, HealthStatus};
use crate::probe::{SqlHealthCheck, default_command, query_command};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A named check with its reporting policy
#[derive(Clone)]
pub struct HealthCheckRegistration {
    name: String,
    check: Arc<dyn HealthCheck>,
    failure_status: HealthStatus,
    tags: BTreeSet<String>,
    timeout: Option<Duration>,
}

impl HealthCheckRegistration {
    pub fn new(name: impl Into<String>, check: Arc<dyn HealthCheck>) -> Self {
        Self {
            name: name.into(),
            check,
            failure_status: HealthStatus::Unhealthy,
            tags: BTreeSet::new(),
            timeout: None,
        }
    }

    pub fn with_failure_status(mut self, status: HealthStatus) -> Self {
        self.failure_status = status;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn failure_status(&self) -> HealthStatus {
        self.failure_status
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run the check once, enforcing the registration timeout
    pub async fn run(&self, cancel: &CancellationToken) -> HealthCheckResult {
        let context = HealthCheckContext::new(&self.name, self.failure_status);
        let child = cancel.child_token();
        let check = self.check.check(&context, child.clone());

        let Some(limit) = self.timeout else {
            return check.await;
        };

        match tokio::time::timeout(limit, check).await {
            Ok(result) => result,
            Err(_) => {
                child.cancel();
                tracing::warn!(
                    probe = %self.name,
                    timeout = %humantime::format_duration(limit),
                    "Health check timed out"
                );
                HealthCheckResult::failure(
                    self.failure_status,
                    ProbeError::TimedOut {
                        operation: "health check",
                        timeout: limit,
                    },
                )
                .with_description("Check did not finish within its timeout")
            }
        }
    }
}

impl std::fmt::Debug for HealthCheckRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheckRegistration")
            .field("name", &self.name)
            .field("failure_status", &self.failure_status)
            .field("tags", &self.tags)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Optional settings for a SQL probe registration
pub struct SqlProbeOptions<C> {
    pub health_query: Option<String>,
    /// Takes precedence over `health_query`
    pub configure_command: Option<CommandConfigurer>,
    pub name: Option<String>,
    pub failure_status: Option<HealthStatus>,
    pub tags: Vec<String>,
    pub timeout: Option<Duration>,
    /// Applied to string-sourced connections before they open
    pub before_open: Option<BeforeOpen<C>>,
}

impl<C> Default for SqlProbeOptions<C> {
    fn default() -> Self {
        Self {
            health_query: None,
            configure_command: None,
            name: None,
            failure_status: None,
            tags: Vec::new(),
            timeout: None,
            before_open: None,
        }
    }
}

impl<C> SqlProbeOptions<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn health_query(mut self, query: impl Into<String>) -> Self {
        self.health_query = Some(query.into());
        self
    }

    pub fn configure_command<F>(mut self, configure: F) -> Self
    where
        F: Fn(&mut SqlCommand) + Send + Sync + 'static,
    {
        self.configure_command = Some(Arc::new(configure));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn failure_status(mut self, status: HealthStatus) -> Self {
        self.failure_status = Some(status);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn before_open<F>(mut self, configure: F) -> Self
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        self.before_open = Some(Arc::new(configure));
        self
    }
}

/// Collects registrations
#[derive(Debug, Default)]
pub struct HealthChecksBuilder {
    registrations: Vec<HealthCheckRegistration>,
}

impl HealthChecksBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add any check
    pub fn add(&mut self, registration: HealthCheckRegistration) -> &mut Self {
        tracing::debug!(probe = registration.name(), "Registered health check");
        self.registrations.push(registration);
        self
    }

    /// Probe a database reached through a fixed connection string
    pub fn add_sql<C>(
        &mut self,
        connection_string: impl Into<String>,
        options: SqlProbeOptions<C>,
    ) -> &mut Self
    where
        C: FromConnectionString + 'static,
    {
        let connection_string = connection_string.into();
        self.add_sql_with(move || Ok(connection_string.clone()), options)
    }

    /// Probe a database whose connection string is produced on every check
    pub fn add_sql_with<C, F>(
        &mut self,
        connection_string: F,
        mut options: SqlProbeOptions<C>,
    ) -> &mut Self
    where
        C: FromConnectionString + 'static,
        F: Fn() -> ProbeResult<String> + Send + Sync + 'static,
    {
        let source: ConnectionStringFactory = Arc::new(connection_string);
        let factory = string_source_factory(source, options.before_open.take());
        self.add_sql_factory(factory, options)
    }

    /// Probe connections produced by an async factory
    pub fn add_sql_connection<C, F, Fut>(
        &mut self,
        connection_factory: F,
        options: SqlProbeOptions<C>,
    ) -> &mut Self
    where
        C: SqlConnection + 'static,
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult<Option<C>>> + Send + 'static,
    {
        let factory: ConnectionFactory<C> =
            Arc::new(move |cancel| Box::pin(connection_factory(cancel)));
        self.add_sql_factory(factory, options)
    }

    fn add_sql_factory<C>(
        &mut self,
        factory: ConnectionFactory<C>,
        options: SqlProbeOptions<C>,
    ) -> &mut Self
    where
        C: SqlConnection + 'static,
    {
        let configure_command = match (options.configure_command, options.health_query) {
            (Some(configure), _) => configure,
            (None, Some(query)) => query_command(query),
            (None, None) => default_command(),
        };
        let check = SqlHealthCheck::new(factory, configure_command);

        let name = options
            .name
            .unwrap_or_else(|| C::BACKEND.default_probe_name().to_string());
        let mut registration = HealthCheckRegistration::new(name, Arc::new(check))
            .with_failure_status(options.failure_status.unwrap_or(HealthStatus::Unhealthy))
            .with_tags(options.tags);
        if let Some(timeout) = options.timeout {
            registration = registration.with_timeout(timeout);
        }

        self.add(registration)
    }

    /// Finish, rejecting duplicate names
    pub fn build(self) -> Result<HealthChecks, ConfigError> {
        let mut seen = BTreeSet::new();
        for registration in &self.registrations {
            if !seen.insert(registration.name()) {
                return Err(ConfigError::DuplicateName {
                    name: registration.name().to_string(),
                });
            }
        }

        Ok(HealthChecks {
            registrations: self.registrations,
        })
    }
}

/// A set of registrations that can be run on demand
#[derive(Debug, Clone, Default)]
pub struct HealthChecks {
    registrations: Vec<HealthCheckRegistration>,
}

impl HealthChecks {
    pub fn builder() -> HealthChecksBuilder {
        HealthChecksBuilder::new()
    }

    pub fn registrations(&self) -> &[HealthCheckRegistration] {
        &self.registrations
    }

    /// Check specific registration by name
    pub async fn check(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Option<HealthReportEntry> {
        let registration = self.registrations.iter().find(|r| r.name() == name)?;
        Some(run_entry(registration, cancel).await)
    }

    /// Run every registration concurrently
    pub async fn check_all(&self, cancel: &CancellationToken) -> HealthReport {
        self.check_matching(|_| true, cancel).await
    }

    /// Run registrations carrying `tag`
    pub async fn check_tagged(&self, tag: &str, cancel: &CancellationToken) -> HealthReport {
        self.check_matching(|r| r.tags().contains(tag), cancel).await
    }

    async fn check_matching<P>(&self, predicate: P, cancel: &CancellationToken) -> HealthReport
    where
        P: Fn(&HealthCheckRegistration) -> bool,
    {
        let start = Instant::now();
        let runs = self
            .registrations
            .iter()
            .filter(|r| predicate(*r))
            .map(|r| async move { (r.name().to_string(), run_entry(r, cancel).await) });
        let entries = futures::future::join_all(runs).await.into_iter().collect();

        HealthReport::from_entries(entries, start.elapsed())
    }
}

async fn run_entry(
    registration: &HealthCheckRegistration,
    cancel: &CancellationToken,
) -> HealthReportEntry {
    let start = Instant::now();
    let result = registration.run(cancel).await;
    HealthReportEntry::new(registration, result, start.elapsed())
}

/// Per-registration outcome inside a report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReportEntry {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: f64,
    pub tags: BTreeSet<String>,
}

impl HealthReportEntry {
    fn new(
        registration: &HealthCheckRegistration,
        result: HealthCheckResult,
        duration: Duration,
    ) -> Self {
        Self {
            status: result.status,
            description: result.description,
            error: result.error.map(|e| e.to_string()),
            duration_ms: duration.as_secs_f64() * 1000.0,
            tags: registration.tags().clone(),
        }
    }
}

/// Outcome of running a set of registrations
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub total_duration_ms: f64,
    pub entries: BTreeMap<String, HealthReportEntry>,
}

impl HealthReport {
    /// Aggregate status is the worst entry; an empty report is healthy
    pub fn from_entries(entries: BTreeMap<String, HealthReportEntry>, total: Duration) -> Self {
        let status = entries
            .values()
            .map(|entry| entry.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            total_duration_ms: total.as_secs_f64() * 1000.0,
            entries,
        }
    }
}
