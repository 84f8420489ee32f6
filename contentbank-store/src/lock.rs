//! Lease-based advisory locks in SQLite.
//!
//! Runs on its own connection so that lock rows commit immediately and are
//! visible to every process sharing the database file, independent of any
//! merge transaction.

use chrono::Utc;
use contentbank_model::{Error, LockService, LockToken, Result};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

const LOCK_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS advisory_locks (
        name TEXT PRIMARY KEY,
        token TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    );
";

/// Lock service backed by an `advisory_locks` table.
pub struct SqliteLockService {
    conn: Mutex<Connection>,
    lease: Duration,
    poll_interval: Duration,
}

impl SqliteLockService {
    /// Opens (or creates) the lock table in the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// In-memory lock table, private to this process (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(LOCK_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            lease: Duration::from_secs(300),
            poll_interval: Duration::from_millis(50),
        })
    }

    /// How long a held lock survives without being released.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Lock("lock service connection poisoned".to_string()))
    }

    fn try_acquire(&self, name: &str, token: &str) -> Result<bool> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp_millis();
        let reclaimed = conn.execute(
            "DELETE FROM advisory_locks WHERE name = ?1 AND expires_at <= ?2",
            params![name, now],
        )?;
        if reclaimed > 0 {
            warn!("Reclaimed expired advisory lock '{}'", name);
        }
        let expires_at = now + self.lease.as_millis() as i64;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO advisory_locks (name, token, expires_at) VALUES (?1, ?2, ?3)",
            params![name, token, expires_at],
        )?;
        Ok(inserted == 1)
    }
}

impl LockService for SqliteLockService {
    fn acquire(&self, name: &str, timeout: Duration) -> Result<Option<LockToken>> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire(name, &token)? {
                debug!("Acquired advisory lock '{}'", name);
                return Ok(Some(LockToken {
                    name: name.to_string(),
                    token,
                }));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn release(&self, token: LockToken) -> Result<()> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM advisory_locks WHERE name = ?1 AND token = ?2",
            params![token.name, token.token],
        )?;
        if removed == 0 {
            warn!("Advisory lock '{}' expired before release", token.name);
        } else {
            debug!("Released advisory lock '{}'", token.name);
        }
        Ok(())
    }
}
