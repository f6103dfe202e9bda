//! Connection abstraction the probe executor drives
//!
//! Backends implement [`SqlConnection`] over their client library. A probe
//! receives a fresh, usually unopened, connection object on every check and
//! owns it until the check finishes.

use crate::error::{DatabaseBackend, ProbeError, ProbeResult};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lifecycle state reported by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
    /// Was open but the transport has gone away
    Broken,
}

/// Command handed to the configurator before execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlCommand {
    text: String,
    timeout: Option<Duration>,
}

impl SqlCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timeout: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Bound the execution time of this command
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }
}

/// A database connection as seen by the probe executor
#[async_trait::async_trait]
pub trait SqlConnection: Send {
    /// Backend this connection talks to
    const BACKEND: DatabaseBackend;

    fn state(&self) -> ConnectionState;

    /// Open the connection. Called only when `state()` is not `Open`.
    async fn open(&mut self) -> ProbeResult<()>;

    /// Create a blank command bound to this connection
    fn create_command(&self) -> SqlCommand {
        SqlCommand::default()
    }

    /// Execute `command` and return the first column of the first row, if any
    async fn execute_scalar(&mut self, command: &SqlCommand) -> ProbeResult<Option<String>>;

    /// Release the connection. Must be idempotent; `Drop` covers abandoned paths.
    async fn close(&mut self) {}
}

/// Connections that can be built from a connection string
pub trait FromConnectionString: SqlConnection + Sized {
    /// Build an unopened connection
    fn from_connection_string(connection_string: &str) -> ProbeResult<Self>;
}

/// Async factory producing a connection per check; `None` is a failure
pub type ConnectionFactory<C> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, ProbeResult<Option<C>>> + Send + Sync>;

/// Sync factory producing a connection string per check
pub type ConnectionStringFactory = Arc<dyn Fn() -> ProbeResult<String> + Send + Sync>;

/// Callback that edits the command before it runs
pub type CommandConfigurer = Arc<dyn Fn(&mut SqlCommand) + Send + Sync>;

/// Callback applied to an unopened connection on every check
pub type BeforeOpen<C> = Arc<dyn Fn(&mut C) + Send + Sync>;

/// Build a factory that creates connections from a string source
pub(crate) fn string_source_factory<C>(
    source: ConnectionStringFactory,
    before_open: Option<BeforeOpen<C>>,
) -> ConnectionFactory<C>
where
    C: FromConnectionString + 'static,
{
    Arc::new(move |_cancel| {
        let created = source().and_then(|connection_string| {
            let mut connection = C::from_connection_string(&connection_string)?;
            if let Some(configure) = &before_open {
                configure(&mut connection);
            }
            Ok(Some(connection))
        });
        Box::pin(futures::future::ready(created))
    })
}

/// Lift an error from a caller-supplied source into a probe failure
pub fn factory_error(error: impl std::fmt::Display) -> ProbeError {
    ProbeError::connection_factory(error.to_string())
}
