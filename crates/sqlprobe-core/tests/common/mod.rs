//! Scripted connection shared by the integration tests

#![allow(dead_code)]

use sqlprobe_core::{
    ConnectionState, DatabaseBackend, FromConnectionString, ProbeError, ProbeResult, SqlCommand,
    SqlConnection,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the connection behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Healthy,
    FailOpen,
    FailQuery,
    /// Open never completes
    HangOpen,
    /// Query takes this long
    SlowQuery(Duration),
}

#[derive(Debug, Default)]
pub struct Journal {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub dropped: AtomicUsize,
    pub executed: Mutex<Vec<String>>,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

pub struct ScriptedConnection {
    pub script: Script,
    pub state: ConnectionState,
    pub journal: Arc<Journal>,
    pub marks: Vec<String>,
}

impl ScriptedConnection {
    pub fn new(script: Script, journal: &Arc<Journal>) -> Self {
        Self {
            script,
            state: ConnectionState::Closed,
            journal: Arc::clone(journal),
            marks: Vec::new(),
        }
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.journal.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SqlConnection for ScriptedConnection {
    const BACKEND: DatabaseBackend = DatabaseBackend::Other;

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn open(&mut self) -> ProbeResult<()> {
        self.journal.opened.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::FailOpen => Err(ProbeError::open(Self::BACKEND, "connection refused")),
            Script::HangOpen => {
                std::future::pending::<()>().await;
                Ok(())
            }
            _ => {
                self.state = ConnectionState::Open;
                Ok(())
            }
        }
    }

    async fn execute_scalar(&mut self, command: &SqlCommand) -> ProbeResult<Option<String>> {
        self.journal
            .executed
            .lock()
            .unwrap()
            .push(command.text().to_string());
        match self.script {
            Script::FailQuery => Err(ProbeError::execute(Self::BACKEND, "syntax error")),
            Script::SlowQuery(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Some("1".to_string()))
            }
            _ => Ok(Some("1".to_string())),
        }
    }

    async fn close(&mut self) {
        self.journal.closed.fetch_add(1, Ordering::SeqCst);
        self.state = ConnectionState::Closed;
    }
}

/// Connection strings name the script: `healthy`, `fail-open`, `fail-query`
pub struct StringConnection {
    pub inner: ScriptedConnection,
}

#[async_trait::async_trait]
impl SqlConnection for StringConnection {
    const BACKEND: DatabaseBackend = DatabaseBackend::Other;

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    async fn open(&mut self) -> ProbeResult<()> {
        self.inner.open().await
    }

    async fn execute_scalar(&mut self, command: &SqlCommand) -> ProbeResult<Option<String>> {
        self.inner.execute_scalar(command).await
    }
}

impl FromConnectionString for StringConnection {
    fn from_connection_string(connection_string: &str) -> ProbeResult<Self> {
        let script = match connection_string {
            "healthy" => Script::Healthy,
            "fail-open" => Script::FailOpen,
            "fail-query" => Script::FailQuery,
            other => {
                return Err(ProbeError::connection_factory(format!(
                    "unrecognised connection string '{other}'"
                )));
            }
        };
        Ok(Self {
            inner: ScriptedConnection::new(script, &Journal::new()),
        })
    }
}
