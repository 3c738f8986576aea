//! Connection parameters and the lazily opened connection.
//!
//! Stages carry [`ConnectionParams`] in their spec and a [`LazyConnection`]
//! at runtime. The connection opens on first use behind a once-only gate,
//! so a stage decoded on a worker reopens its own connection.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::error::{self, SqliteError};

const IN_MEMORY: &str = ":memory:";

/// Everything needed to (re)open a connection. Plain data only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Database file path, or `:memory:`.
    pub path: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
}

impl ConnectionParams {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            busy_timeout_ms: None,
        }
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::Io`] if the parent directory can't be created,
    /// or [`SqliteError::Open`] if the database can't be opened.
    pub fn open(&self) -> error::Result<Connection> {
        let open_err = |source| SqliteError::Open {
            path: self.path.clone(),
            source,
        };
        let conn = if self.read_only {
            Connection::open_with_flags(
                &self.path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
            )
            .map_err(open_err)?
        } else {
            if self.path != IN_MEMORY {
                if let Some(parent) = Path::new(&self.path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
            }
            Connection::open(&self.path).map_err(open_err)?
        };
        if let Some(ms) = self.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))?;
        }
        tracing::debug!(path = self.path, read_only = self.read_only, "Opened sqlite connection");
        Ok(conn)
    }
}

/// A connection opened on first use.
pub struct LazyConnection {
    params: ConnectionParams,
    conn: OnceLock<Mutex<Connection>>,
}

impl LazyConnection {
    #[must_use]
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            conn: OnceLock::new(),
        }
    }

    /// Wrap an already open connection. `params` is what gets encoded.
    #[must_use]
    pub fn from_connection(params: ConnectionParams, conn: Connection) -> Self {
        Self {
            params,
            conn: OnceLock::from(Mutex::new(conn)),
        }
    }

    #[must_use]
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.get().is_some()
    }

    /// Acquire the connection lock, opening the connection first if needed.
    ///
    /// # Errors
    ///
    /// Returns the open error, or [`SqliteError::LockPoisoned`].
    pub fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        let conn = match self.conn.get() {
            Some(conn) => conn,
            None => {
                let opened = self.params.open()?;
                // A concurrent opener may have won; its connection is kept.
                let _ = self.conn.set(Mutex::new(opened));
                self.conn.get().ok_or(SqliteError::LockPoisoned)?
            }
        };
        conn.lock().map_err(|_| SqliteError::LockPoisoned)
    }

    /// Close the connection. The next use reopens it.
    pub fn release(&mut self) {
        if self.conn.take().is_some() {
            tracing::debug!(path = self.params.path, "Released sqlite connection");
        }
    }
}

impl std::fmt::Debug for LazyConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyConnection")
            .field("params", &self.params)
            .field("open", &self.is_open())
            .finish()
    }
}
