mod queries;
mod schema;
pub mod time;

use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

use crate::error::Result;

pub(crate) use queries::{
  active_plan_count, find_agent, find_task, flag, lead_name, require_agent, retire_flag_exists,
  set_flag, touch_agent,
};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_MAX_BUSY_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
  /// How long SQLite waits on a locked database before reporting busy.
  pub busy_timeout_ms: u64,
  /// Extra attempts at `BEGIN` after a busy report.
  pub max_busy_retries: u32,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
      max_busy_retries: DEFAULT_MAX_BUSY_RETRIES,
    }
  }
}

/// Shared transactional store. Every core operation is exactly one call to
/// [`Store::write`] or [`Store::read`].
pub struct Store {
  conn: Mutex<Connection>,
  options: StoreOptions,
}

impl Store {
  /// Open (or create) the database file, creating parent directories.
  pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
    if let Some(dir) = path.parent()
      && !dir.as_os_str().is_empty()
    {
      std::fs::create_dir_all(dir)
        .map_err(|err| crate::error::CommsError::content(dir.display().to_string(), err))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Self::init(conn, options)
  }

  /// Private in-memory database, for tests and dry runs.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Self::init(conn, StoreOptions::default())
  }

  fn init(conn: Connection, options: StoreOptions) -> Result<Self> {
    conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))?;
    schema::migrate(&conn)?;
    Ok(Self {
      conn: Mutex::new(conn),
      options,
    })
  }

  /// Run `op` inside an IMMEDIATE transaction. Commits on `Ok`, rolls back on
  /// `Err`, so a failed precondition never leaves partial state behind.
  pub fn write<T>(&self, op: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
    self.run(TransactionBehavior::Immediate, op)
  }

  /// Run a read-only `op` over a consistent snapshot.
  pub fn read<T>(&self, op: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
    self.run(TransactionBehavior::Deferred, op)
  }

  /// Raw access to the connection, for tests and maintenance.
  pub fn connection(&self) -> MutexGuard<'_, Connection> {
    self.conn.lock()
  }

  fn run<T>(
    &self,
    behavior: TransactionBehavior,
    op: impl FnOnce(&Transaction<'_>) -> Result<T>,
  ) -> Result<T> {
    let mut conn = self.conn.lock();
    let mut attempt = 0;
    loop {
      match conn.transaction_with_behavior(behavior) {
        Ok(tx) => {
          let out = op(&tx)?;
          tx.commit()?;
          return Ok(out);
        }
        Err(err) if is_busy(&err) && attempt < self.options.max_busy_retries => {
          attempt += 1;
          warn!(
            "store busy, retrying transaction ({attempt}/{})",
            self.options.max_busy_retries
          );
          std::thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)));
        }
        Err(err) => {
          debug!("failed to begin transaction: {err}");
          return Err(err.into());
        }
      }
    }
  }
}

fn is_busy(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::CommsError;

  #[test]
  fn failed_operation_rolls_back() {
    let store = Store::open_in_memory().unwrap();
    let res: Result<()> = store.write(|tx| {
      tx.execute(
        "INSERT INTO flags (key, value, set_by, set_at) VALUES ('moon_crash', '1', 'x', 'now')",
        [],
      )?;
      Err(CommsError::Blocked("late failure".to_string()))
    });
    assert!(res.unwrap_err().is_blocked());
    let count: i64 = store
      .read(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM flags", [], |r| r.get(0))?))
      .unwrap();
    assert_eq!(count, 0);
  }

  #[test]
  fn successful_operation_commits() {
    let store = Store::open_in_memory().unwrap();
    store
      .write(|tx| {
        tx.execute(
          "INSERT INTO flags (key, value, set_by, set_at) VALUES ('stand_down', '1', 'x', 'now')",
          [],
        )?;
        Ok(())
      })
      .unwrap();
    let count: i64 = store
      .connection()
      .query_row("SELECT COUNT(*) FROM flags", [], |r| r.get(0))
      .unwrap();
    assert_eq!(count, 1);
  }

  #[test]
  fn file_store_creates_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("minion.db");
    let _store = Store::open(&path, StoreOptions::default()).unwrap();
    assert!(path.exists());
  }
}
