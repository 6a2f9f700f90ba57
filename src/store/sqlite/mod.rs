//! SQLite backend. One connection lives on a dedicated thread; async callers
//! hand it closures over a channel and await the reply.
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::errors::{AgentError, AgentResult};

mod migrations;
mod repository;

use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct WorkerHandle {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                tracing::error!("failed to send shutdown to DB thread: {err}");
            }
            if let Err(err) = handle.join() {
                tracing::error!("failed to join DB thread: {err:?}");
            }
        }
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<WorkerHandle>,
    path: Option<Arc<PathBuf>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and migrates it.
    pub fn open(path: PathBuf) -> AgentResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %path.display(), "opening sqlite store");
        let for_thread = path.clone();
        Self::spawn(move || Connection::open(&for_thread), Some(path))
    }

    pub fn open_in_memory() -> AgentResult<Self> {
        Self::spawn(Connection::open_in_memory, None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    fn spawn<F>(connect: F, path: Option<PathBuf>) -> AgentResult<Self>
    where
        F: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<AgentResult<()>>();

        let worker = thread::Builder::new()
            .name("macagent-db".into())
            .spawn(move || {
                let mut conn = match connect() {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.into()));
                        return;
                    }
                };
                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    tracing::warn!("failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    tracing::warn!("failed to enable foreign keys: {err}");
                }
                if ready_tx.send(run_migrations(&mut conn)).is_err() {
                    tracing::error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }
                tracing::debug!("database thread shutting down");
            })?;

        ready_rx
            .recv()
            .map_err(|_| AgentError::Store("database worker exited before signaling readiness".into()))??;

        Ok(Self {
            inner: Arc::new(WorkerHandle {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            path: path.map(Arc::new),
        })
    }

    pub(crate) async fn execute<F, T>(&self, task: F) -> AgentResult<T>
    where
        F: FnOnce(&mut Connection) -> AgentResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = DbCommand::Execute(Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                tracing::warn!("DB caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| AgentError::Store(format!("failed to send command to DB thread: {err}")))?;
        reply_rx
            .await
            .map_err(|_| AgentError::Store("database thread terminated unexpectedly".into()))?
    }
}

fn to_i64(value: u64) -> AgentResult<i64> {
    i64::try_from(value)
        .map_err(|_| AgentError::Store(format!("value {value} exceeds SQLite INTEGER range")))
}

fn to_u64(value: i64, field: &str) -> AgentResult<u64> {
    u64::try_from(value).map_err(|_| AgentError::Store(format!("{field} contains negative value {value}")))
}

fn to_u32(value: i64, field: &str) -> AgentResult<u32> {
    u32::try_from(value).map_err(|_| AgentError::Store(format!("{field} out of range: {value}")))
}

fn parse_datetime(value: &str, field: &str) -> AgentResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| AgentError::Store(format!("invalid {field} '{value}': {err}")))
}

fn parse_optional_datetime(value: Option<String>, field: &str) -> AgentResult<Option<DateTime<Utc>>> {
    value.map(|raw| parse_datetime(&raw, field)).transpose()
}

fn parse_uuid(value: &str, field: &str) -> AgentResult<Uuid> {
    Uuid::parse_str(value).map_err(|err| AgentError::Store(format!("invalid {field} '{value}': {err}")))
}
