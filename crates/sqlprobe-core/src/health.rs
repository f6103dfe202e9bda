//! Health check types and the `HealthCheck` trait
//!
//! A check is any async unit that inspects one dependency and reports a
//! [`HealthCheckResult`]. Checks never fail the caller: errors are carried
//! inside the result as [`ProbeError`] detail.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlprobe_core::health::{HealthCheck, HealthCheckContext, HealthStatus};
//!
//! async fn probe_once(check: &dyn HealthCheck) {
//!     let context = HealthCheckContext::new("primary", HealthStatus::Unhealthy);
//!     let result = check.check(&context, CancellationToken::new()).await;
//!     match result.status {
//!         HealthStatus::Healthy => println!("database is reachable"),
//!         _ => println!("database is down: {:?}", result.error),
//!     }
//! }
//! ```

use crate::error::ProbeError;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Health status levels, ordered from best to worst
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Dependency is fully operational
    #[default]
    Healthy,
    /// Dependency is operational but should not be relied on
    Degraded,
    /// Dependency is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if the status is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Check if the status is degraded
    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded)
    }

    /// Check if the status is unhealthy
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }

    /// Get status as string
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "healthy" => Ok(HealthStatus::Healthy),
            "degraded" => Ok(HealthStatus::Degraded),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            other => Err(format!(
                "unknown health status '{other}' (expected healthy, degraded or unhealthy)"
            )),
        }
    }
}

/// Outcome of a single check invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub description: Option<String>,
    pub error: Option<ProbeError>,
}

impl HealthCheckResult {
    /// Create a healthy result
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            description: None,
            error: None,
        }
    }

    /// Create a failed result with the given status and error detail
    pub fn failure(status: HealthStatus, error: ProbeError) -> Self {
        Self {
            status,
            description: None,
            error: Some(error),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// What a check knows about the registration it runs under
#[derive(Debug, Clone, Copy)]
pub struct HealthCheckContext<'a> {
    name: &'a str,
    failure_status: HealthStatus,
}

impl<'a> HealthCheckContext<'a> {
    pub fn new(name: &'a str, failure_status: HealthStatus) -> Self {
        Self {
            name,
            failure_status,
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Status to report when the check fails
    pub fn failure_status(&self) -> HealthStatus {
        self.failure_status
    }
}

/// Trait for health check implementations
#[async_trait::async_trait]
pub trait HealthCheck: Send + Sync {
    /// Perform the check. Implementations must return promptly once `cancel` fires.
    async fn check(
        &self,
        context: &HealthCheckContext<'_>,
        cancel: CancellationToken,
    ) -> HealthCheckResult;
}
