//! Bounded SQLite connection pool
//!
//! At most `max_connections` connections are checked out at once; callers
//! wait up to `connect_timeout` for a free slot. Returned connections are
//! kept idle for reuse until they exceed `idle_timeout`.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::StoreError;

/// Pool sizing and timeouts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

struct IdleConnection {
    conn: Connection,
    since: Instant,
}

type IdleList = Arc<Mutex<Vec<IdleConnection>>>;

pub struct ConnectionPool {
    path: PathBuf,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: IdleList,
}

impl ConnectionPool {
    /// Open a pool for the database file at `path`, creating it if needed.
    ///
    /// One connection is opened eagerly so a bad path fails at startup.
    pub fn open(path: impl AsRef<Path>, config: PoolConfig) -> Result<Self, StoreError> {
        if config.max_connections == 0 {
            return Err(StoreError::Connect(
                "pool needs at least one connection".to_string(),
            ));
        }

        let pool = Self {
            path: path.as_ref().to_path_buf(),
            config,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            idle: Arc::new(Mutex::new(Vec::with_capacity(config.max_connections))),
        };

        let first = pool.connect()?;
        first
            .query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(|e| StoreError::Connect(e.to_string()))?;
        pool.idle.lock().push(IdleConnection {
            conn: first,
            since: Instant::now(),
        });

        tracing::info!(
            "Opened database {} (max {} connections)",
            pool.path.display(),
            config.max_connections
        );
        Ok(pool)
    }

    /// Check out a connection, waiting at most `connect_timeout`.
    pub async fn acquire(&self) -> Result<PooledConnection, StoreError> {
        let permit = tokio::time::timeout(
            self.config.connect_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| StoreError::PoolTimeout(self.config.connect_timeout))?
        .map_err(|_| StoreError::Connect("connection pool is closed".to_string()))?;

        let conn = match self.take_idle() {
            Some(conn) => conn,
            None => self.connect()?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        })
    }

    /// Connections currently checked out.
    pub fn in_flight(&self) -> usize {
        self.config.max_connections - self.permits.available_permits()
    }

    /// Connections waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn take_idle(&self) -> Option<Connection> {
        let mut idle = self.idle.lock();
        while let Some(entry) = idle.pop() {
            if entry.since.elapsed() < self.config.idle_timeout {
                return Some(entry.conn);
            }
            tracing::debug!("Closing connection idle for {:?}", entry.since.elapsed());
        }
        None
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            StoreError::Connect(format!("'{}': {}", self.path.display(), e))
        })?;
        conn.busy_timeout(self.config.connect_timeout)?;
        Ok(conn)
    }
}

/// A checked-out connection; goes back to the pool when dropped
pub struct PooledConnection {
    conn: Option<Connection>,
    idle: IdleList,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        // A panic mid-statement may leave a transaction open; don't reuse it.
        if std::thread::panicking() || !conn.is_autocommit() {
            tracing::warn!("Discarding database connection after an interrupted operation");
            return;
        }

        self.idle.lock().push(IdleConnection {
            conn,
            since: Instant::now(),
        });
        // The permit is released after this, when `_permit` drops.
    }
}
