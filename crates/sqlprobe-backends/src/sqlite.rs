//! SQLite connection for health probes
//!
//! `rusqlite` is synchronous, so opening and querying run on tokio's
//! blocking pool. The connection is moved into the blocking task and handed
//! back with the result; if the probe is abandoned mid-query the task still
//! finishes and drops the connection itself.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle, OpenFlags};
use sqlprobe_core::{
    ConnectionState, DatabaseBackend, FromConnectionString, ProbeError, ProbeResult, SqlCommand,
    SqlConnection,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const IN_MEMORY: &str = ":memory:";

/// A single SQLite connection
#[derive(Debug)]
pub struct SqliteConnection {
    path: PathBuf,
    flags: OpenFlags,
    busy_timeout: Duration,
    connection: Option<Connection>,
}

impl SqliteConnection {
    /// Probe the database at `path`; `:memory:` opens a private in-memory database
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        // Only in-memory databases may be created on open.
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if path == Path::new(IN_MEMORY) {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        Self {
            path,
            flags,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            connection: None,
        }
    }

    /// Wrap a connection that is already open
    pub fn from_connection(connection: Connection) -> Self {
        let path = connection
            .path()
            .filter(|path| !path.is_empty())
            .unwrap_or(IN_MEMORY)
            .to_string();
        let mut wrapped = Self::new(path);
        wrapped.connection = Some(connection);
        wrapped
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Replace the open flags, e.g. to allow creating the file
    pub fn set_flags(&mut self, flags: OpenFlags) {
        self.flags = flags;
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    /// How long statements wait on a locked database
    pub fn set_busy_timeout(&mut self, timeout: Duration) {
        self.busy_timeout = timeout;
    }

    fn open_blocking(
        path: &Path,
        flags: OpenFlags,
        busy_timeout: Duration,
    ) -> ProbeResult<Connection> {
        let open_error =
            |e: rusqlite::Error| ProbeError::open(DatabaseBackend::Sqlite, e.to_string());

        let connection = Connection::open_with_flags(path, flags).map_err(open_error)?;
        connection.busy_timeout(busy_timeout).map_err(open_error)?;
        Ok(connection)
    }

    fn query_scalar(connection: &Connection, sql: &str) -> rusqlite::Result<Option<String>> {
        let mut statement = connection.prepare(sql)?;
        if statement.column_count() == 0 {
            statement.execute([])?;
            return Ok(None);
        }

        let mut rows = statement.query([])?;
        let value = match rows.next()? {
            Some(row) => render_value(row.get_ref(0)?),
            None => None,
        };
        Ok(value)
    }
}

/// Stops the statement running on the blocking pool if the query future is dropped
struct InterruptOnDrop {
    handle: Option<InterruptHandle>,
    abandoned: Arc<AtomicBool>,
}

impl InterruptOnDrop {
    fn new(connection: &Connection) -> Self {
        Self {
            handle: Some(connection.get_interrupt_handle()),
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag the blocking task checks before it starts the statement
    fn abandoned(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abandoned)
    }

    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // sqlite3_interrupt is a no-op when nothing is running yet.
            self.abandoned.store(true, Ordering::SeqCst);
            handle.interrupt();
            tracing::debug!("Interrupted abandoned SQLite query");
        }
    }
}

fn render_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Some(format!("<{} bytes>", blob.len())),
    }
}

impl FromConnectionString for SqliteConnection {
    fn from_connection_string(connection_string: &str) -> ProbeResult<Self> {
        let path = connection_string.trim();
        if path.is_empty() {
            return Err(ProbeError::connection_factory(
                "SQLite connection string must name a database file",
            ));
        }
        Ok(Self::new(path))
    }
}

#[async_trait::async_trait]
impl SqlConnection for SqliteConnection {
    const BACKEND: DatabaseBackend = DatabaseBackend::Sqlite;

    fn state(&self) -> ConnectionState {
        if self.connection.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    async fn open(&mut self) -> ProbeResult<()> {
        let path = self.path.clone();
        let flags = self.flags;
        let busy_timeout = self.busy_timeout;

        let connection = tokio::task::spawn_blocking(move || {
            Self::open_blocking(&path, flags, busy_timeout)
        })
        .await
        .map_err(|e| ProbeError::open(Self::BACKEND, format!("open task failed: {e}")))??;

        self.connection = Some(connection);
        Ok(())
    }

    async fn execute_scalar(&mut self, command: &SqlCommand) -> ProbeResult<Option<String>> {
        let connection = self
            .connection
            .take()
            .ok_or_else(|| ProbeError::execute(Self::BACKEND, "connection is not open"))?;
        let sql = command.text().to_string();
        let interrupt = InterruptOnDrop::new(&connection);
        let abandoned = interrupt.abandoned();

        let (connection, result) = tokio::task::spawn_blocking(move || {
            let result = if abandoned.load(Ordering::SeqCst) {
                Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
                    None,
                ))
            } else {
                Self::query_scalar(&connection, &sql)
            };
            (connection, result)
        })
        .await
        .map_err(|e| ProbeError::execute(Self::BACKEND, format!("query task failed: {e}")))?;
        interrupt.disarm();

        self.connection = Some(connection);
        result.map_err(|e| ProbeError::execute(Self::BACKEND, e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err((_, e)) = connection.close() {
                tracing::debug!(error = %e, "SQLite connection did not close cleanly");
            }
        }
    }
}
