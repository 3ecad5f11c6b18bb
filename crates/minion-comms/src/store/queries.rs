//! Lookups shared by several operations. All of them run inside the caller's
//! transaction.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Transaction, params};

use crate::error::{CommsError, Result};
use crate::model::{Agent, AgentClass, Flag, FlagKey, PlanStatus, Task};
use crate::store::time::format_ts;
use crate::utils::error_messages;

pub(crate) fn find_agent(tx: &Transaction<'_>, name: &str) -> Result<Option<Agent>> {
  let sql = format!("SELECT {} FROM agents WHERE name = ?1", Agent::COLUMNS);
  Ok(
    tx.query_row(&sql, params![name], Agent::from_row)
      .optional()?,
  )
}

/// The caller of an operation must be registered; absence is a gate failure.
pub(crate) fn require_agent(tx: &Transaction<'_>, name: &str) -> Result<Agent> {
  find_agent(tx, name)?.ok_or_else(|| CommsError::Blocked(error_messages::not_registered(name)))
}

pub(crate) fn find_task(tx: &Transaction<'_>, id: i64) -> Result<Task> {
  let sql = format!("SELECT {} FROM tasks WHERE id = ?1", Task::COLUMNS);
  tx.query_row(&sql, params![id], Task::from_row)
    .optional()?
    .ok_or_else(|| CommsError::NotFound(error_messages::task_not_found(id)))
}

/// Name of the longest-registered lead, if any.
pub(crate) fn lead_name(tx: &Transaction<'_>) -> Result<Option<String>> {
  Ok(
    tx.query_row(
      "SELECT name FROM agents WHERE agent_class = ?1 ORDER BY registered_at ASC, name ASC LIMIT 1",
      params![AgentClass::Lead],
      |row| row.get(0),
    )
    .optional()?,
  )
}

pub(crate) fn active_plan_count(tx: &Transaction<'_>) -> Result<i64> {
  Ok(tx.query_row(
    "SELECT COUNT(*) FROM battle_plan WHERE status = ?1",
    params![PlanStatus::Active],
    |row| row.get(0),
  )?)
}

/// The flag row when it is currently set.
pub(crate) fn flag(tx: &Transaction<'_>, key: FlagKey) -> Result<Option<Flag>> {
  let row = tx
    .query_row(
      "SELECT key, value, set_by, set_at FROM flags WHERE key = ?1",
      params![key],
      Flag::from_row,
    )
    .optional()?;
  Ok(row.filter(Flag::is_set))
}

pub(crate) fn set_flag(
  tx: &Transaction<'_>,
  key: FlagKey,
  set_by: &str,
  now: DateTime<Utc>,
) -> Result<()> {
  tx.execute(
    "INSERT INTO flags (key, value, set_by, set_at) VALUES (?1, '1', ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET value = '1', set_by = excluded.set_by, set_at = excluded.set_at",
    params![key, set_by, format_ts(now)],
  )?;
  Ok(())
}

pub(crate) fn retire_flag_exists(tx: &Transaction<'_>, agent: &str) -> Result<bool> {
  let found: Option<i64> = tx
    .query_row(
      "SELECT 1 FROM agent_retire WHERE agent_name = ?1",
      params![agent],
      |row| row.get(0),
    )
    .optional()?;
  Ok(found.is_some())
}

pub(crate) fn touch_agent(tx: &Transaction<'_>, name: &str, now: DateTime<Utc>) -> Result<()> {
  tx.execute(
    "UPDATE agents SET last_seen = ?1 WHERE name = ?2",
    params![format_ts(now), name],
  )?;
  Ok(())
}
