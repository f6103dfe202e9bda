//! SQL probe executor
//!
//! [`SqlHealthCheck`] runs one attempt per invocation: obtain a connection,
//! open it if needed, configure a command, execute it as a scalar query and
//! discard the value. Every failure, cancellation included, becomes a
//! [`HealthCheckResult`] carrying the registration's failure status.

use crate::connection::{
    CommandConfigurer, ConnectionFactory, ConnectionState, SqlCommand, SqlConnection,
};
use crate::error::{ProbeError, ProbeResult};
use crate::health::{HealthCheck, HealthCheckContext, HealthCheckResult};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Query used when none is configured
pub const DEFAULT_HEALTH_QUERY: &str = "SELECT 1;";

/// Health check that proves a database answers a trivial query
pub struct SqlHealthCheck<C> {
    connection_factory: ConnectionFactory<C>,
    configure_command: CommandConfigurer,
}

impl<C: SqlConnection + 'static> SqlHealthCheck<C> {
    pub fn new(
        connection_factory: ConnectionFactory<C>,
        configure_command: CommandConfigurer,
    ) -> Self {
        Self {
            connection_factory,
            configure_command,
        }
    }

    /// Start from an async connection factory
    pub fn builder<F, Fut>(factory: F) -> SqlHealthCheckBuilder<C>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult<Option<C>>> + Send + 'static,
    {
        SqlHealthCheckBuilder {
            connection_factory: Arc::new(move |cancel| Box::pin(factory(cancel))),
            configure_command: None,
        }
    }

    async fn probe(
        &self,
        context: &HealthCheckContext<'_>,
        cancel: &CancellationToken,
    ) -> ProbeResult<()> {
        let connection = cancellable(cancel, (self.connection_factory)(cancel.clone())).await?;
        let mut connection = connection.ok_or(ProbeError::NullConnection)?;

        let outcome = self.exercise(context, &mut connection, cancel).await;
        connection.close().await;
        outcome
    }

    async fn exercise(
        &self,
        context: &HealthCheckContext<'_>,
        connection: &mut C,
        cancel: &CancellationToken,
    ) -> ProbeResult<()> {
        if connection.state() != ConnectionState::Open {
            tracing::debug!(probe = context.name(), backend = %C::BACKEND, "Opening connection");
            cancellable(cancel, connection.open()).await?;
        }

        let mut command = connection.create_command();
        (self.configure_command)(&mut command);

        tracing::debug!(
            probe = context.name(),
            query = command.text(),
            "Executing health query"
        );
        // The scalar value itself is irrelevant; reaching it is the signal.
        let _ = match command.timeout() {
            Some(limit) => {
                let execution = tokio::time::timeout(limit, connection.execute_scalar(&command));
                cancellable(cancel, async {
                    execution.await.unwrap_or_else(|_| {
                        Err(ProbeError::TimedOut {
                            operation: "health query",
                            timeout: limit,
                        })
                    })
                })
                .await?
            }
            None => cancellable(cancel, connection.execute_scalar(&command)).await?,
        };

        Ok(())
    }
}

#[async_trait::async_trait]
impl<C: SqlConnection + 'static> HealthCheck for SqlHealthCheck<C> {
    async fn check(
        &self,
        context: &HealthCheckContext<'_>,
        cancel: CancellationToken,
    ) -> HealthCheckResult {
        match self.probe(context, &cancel).await {
            Ok(()) => HealthCheckResult::healthy(),
            Err(error) => {
                tracing::warn!(
                    probe = context.name(),
                    backend = %C::BACKEND,
                    error = %error,
                    "Health probe failed"
                );
                let description = if error.is_interrupted() {
                    "Check stopped before the database answered".to_string()
                } else {
                    format!("{} database is not answering queries", C::BACKEND)
                };
                HealthCheckResult::failure(context.failure_status(), error)
                    .with_description(description)
            }
        }
    }
}

impl<C> std::fmt::Debug for SqlHealthCheck<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlHealthCheck").finish_non_exhaustive()
    }
}

/// Builder for [`SqlHealthCheck`]
pub struct SqlHealthCheckBuilder<C> {
    connection_factory: ConnectionFactory<C>,
    configure_command: Option<CommandConfigurer>,
}

impl<C: SqlConnection + 'static> SqlHealthCheckBuilder<C> {
    /// Use a fixed query text
    pub fn query(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.configure_command(move |command| command.set_text(text.clone()))
    }

    /// Edit every command before it runs
    pub fn configure_command<F>(mut self, configure: F) -> Self
    where
        F: Fn(&mut SqlCommand) + Send + Sync + 'static,
    {
        self.configure_command = Some(Arc::new(configure));
        self
    }

    pub fn build(self) -> SqlHealthCheck<C> {
        SqlHealthCheck::new(
            self.connection_factory,
            self.configure_command.unwrap_or_else(default_command),
        )
    }
}

pub(crate) fn default_command() -> CommandConfigurer {
    query_command(DEFAULT_HEALTH_QUERY.to_string())
}

pub(crate) fn query_command(text: String) -> CommandConfigurer {
    Arc::new(move |command: &mut SqlCommand| command.set_text(text.clone()))
}

/// Race `operation` against cancellation
async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> ProbeResult<T>
where
    F: Future<Output = ProbeResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProbeError::Cancelled),
        result = operation => result,
    }
}
