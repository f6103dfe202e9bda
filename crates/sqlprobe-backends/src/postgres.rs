//! PostgreSQL connection for health probes
//!
//! Wraps `tokio-postgres`. The unopened connection holds the parsed
//! [`Config`], so `before_open` hooks can adjust it (application name,
//! connect timeout) before the probe connects.

use sqlprobe_core::{
    ConnectionState, DatabaseBackend, FromConnectionString, ProbeError, ProbeResult, SqlCommand,
    SqlConnection,
};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config, Error as PgError, NoTls, SimpleQueryMessage};

const APPLICATION_NAME: &str = "sqlprobe";

/// A single, unpooled PostgreSQL connection
pub struct PostgresConnection {
    config: Config,
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
}

impl PostgresConnection {
    /// Wrap an already built config; nothing connects until `open`
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: None,
            driver: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable access for `before_open` hooks
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Render driver errors, preferring the server's message when there is one
    fn describe_error(error: &PgError) -> String {
        match error.as_db_error() {
            Some(db_error) => format!("{}: {}", db_error.code().code(), db_error.message()),
            None => error.to_string(),
        }
    }

    fn release(&mut self) {
        self.client = None;
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl FromConnectionString for PostgresConnection {
    fn from_connection_string(connection_string: &str) -> ProbeResult<Self> {
        let mut config: Config = connection_string.parse().map_err(|e: PgError| {
            ProbeError::connection_factory(format!("Invalid PostgreSQL connection string: {e}"))
        })?;
        if config.get_application_name().is_none() {
            config.application_name(APPLICATION_NAME);
        }
        Ok(Self::new(config))
    }
}

#[async_trait::async_trait]
impl SqlConnection for PostgresConnection {
    const BACKEND: DatabaseBackend = DatabaseBackend::Postgres;

    fn state(&self) -> ConnectionState {
        match &self.client {
            None => ConnectionState::Closed,
            Some(client) if client.is_closed() => ConnectionState::Broken,
            Some(_) => ConnectionState::Open,
        }
    }

    async fn open(&mut self) -> ProbeResult<()> {
        self.release();

        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|e| ProbeError::open(Self::BACKEND, Self::describe_error(&e)))?;

        // The connection object drives the socket; it must be polled for the client to work.
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        self.client = Some(client);
        self.driver = Some(driver);
        Ok(())
    }

    async fn execute_scalar(&mut self, command: &SqlCommand) -> ProbeResult<Option<String>> {
        let client = self.client.as_ref().ok_or_else(|| {
            ProbeError::execute(Self::BACKEND, "connection is not open")
        })?;

        let messages = client
            .simple_query(command.text())
            .await
            .map_err(|e| ProbeError::execute(Self::BACKEND, Self::describe_error(&e)))?;

        Ok(messages.iter().find_map(|message| match message {
            SimpleQueryMessage::Row(row) => row.try_get(0).ok().flatten().map(str::to_owned),
            _ => None,
        }))
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("hosts", &self.config.get_hosts())
            .field("dbname", &self.config.get_dbname())
            .field("state", &self.state())
            .finish()
    }
}
