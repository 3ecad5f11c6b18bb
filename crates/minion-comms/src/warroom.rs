//! Battle plans and the raid log.

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{OptionalExtension as _, Transaction, params};
use serde::Serialize;

use crate::auth::{self, Operation};
use crate::config::AppContext;
use crate::content::{self, ContentStore};
use crate::error::{CommsError, Result};
use crate::model::{BattlePlan, PlanStatus, RaidLogEntry, RaidPriority};
use crate::store::require_agent;
use crate::store::time::{format_ts, now};
use crate::utils::error_messages;

pub const DEFAULT_RAID_LOG_COUNT: usize = 20;

const PLAN_COLUMNS: &str = "id, set_by, plan_file, status, created_at, updated_at";

/// Write the entry body and append a raid-log row.
pub(crate) fn append_raid(
  tx: &Transaction<'_>,
  store: &dyn ContentStore,
  agent: &str,
  text: &str,
  priority: RaidPriority,
  at: DateTime<Utc>,
) -> Result<i64> {
  let reference = content::raid_log_ref(agent, priority, at);
  store.write(&reference, text.as_bytes())?;
  tx.execute(
    "INSERT INTO raid_log (agent_name, entry_file, priority, created_at) VALUES (?1, ?2, ?3, ?4)",
    params![agent, reference, priority, format_ts(at)],
  )?;
  Ok(tx.last_insert_rowid())
}

fn supersede_active(tx: &Transaction<'_>, except: Option<i64>, stamp: &str) -> Result<usize> {
  Ok(tx.execute(
    "UPDATE battle_plan SET status = ?1, updated_at = ?2
     WHERE status = ?3 AND (?4 IS NULL OR id != ?4)",
    params![PlanStatus::Superseded, stamp, PlanStatus::Active, except],
  )?)
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSet {
  pub status: &'static str,
  pub plan_id: i64,
  pub plan_file: String,
  pub superseded: usize,
}

/// Replace the active battle plan with a new one.
pub fn set_battle_plan(ctx: &AppContext, caller: &str, plan: &str) -> Result<PlanSet> {
  debug!("set battle plan by {caller}");
  let out = ctx.store.write(|tx| {
    auth::authorize(tx, caller, Operation::SetBattlePlan)?;
    let at = now();
    let stamp = format_ts(at);
    let reference = content::battle_plan_ref(caller, at);
    ctx.content.write(&reference, plan.as_bytes())?;
    let superseded = supersede_active(tx, None, &stamp)?;
    tx.execute(
      "INSERT INTO battle_plan (set_by, plan_file, status, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?4)",
      params![caller, reference, PlanStatus::Active, stamp],
    )?;
    Ok(PlanSet {
      status: "set",
      plan_id: tx.last_insert_rowid(),
      plan_file: reference,
      superseded,
    })
  })?;
  info!("battle plan #{} set by {caller}", out.plan_id);
  Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanView {
  #[serde(flatten)]
  pub plan: BattlePlan,
  pub content: Option<String>,
}

/// Plans with `status`, newest first, with their text.
pub fn get_battle_plan(ctx: &AppContext, status: PlanStatus) -> Result<Vec<PlanView>> {
  let plans = ctx.store.read(|tx| {
    let sql = format!(
      "SELECT {PLAN_COLUMNS} FROM battle_plan WHERE status = ?1 ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt.query_map(params![status], BattlePlan::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
  })?;
  Ok(
    plans
      .into_iter()
      .map(|plan| PlanView {
        content: content::read_or_warn(ctx.content.as_ref(), &plan.plan_file),
        plan,
      })
      .collect(),
  )
}

pub(crate) fn active_plan(tx: &Transaction<'_>) -> Result<Option<BattlePlan>> {
  let sql = format!(
    "SELECT {PLAN_COLUMNS} FROM battle_plan WHERE status = ?1 ORDER BY created_at DESC LIMIT 1"
  );
  Ok(
    tx.query_row(&sql, params![PlanStatus::Active], BattlePlan::from_row)
      .optional()?,
  )
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanUpdated {
  pub status: &'static str,
  pub plan_id: i64,
  pub old_status: PlanStatus,
  pub new_status: PlanStatus,
}

/// Move a plan to `status`. Re-activating a plan supersedes the current one.
pub fn update_battle_plan_status(
  ctx: &AppContext,
  caller: &str,
  plan_id: i64,
  status: PlanStatus,
) -> Result<PlanUpdated> {
  let out = ctx.store.write(|tx| {
    auth::authorize(tx, caller, Operation::UpdateBattlePlanStatus)?;
    let sql = format!("SELECT {PLAN_COLUMNS} FROM battle_plan WHERE id = ?1");
    let plan = tx
      .query_row(&sql, params![plan_id], BattlePlan::from_row)
      .optional()?
      .ok_or_else(|| CommsError::NotFound(error_messages::plan_not_found(plan_id)))?;
    let stamp = format_ts(now());
    if status == PlanStatus::Active {
      supersede_active(tx, Some(plan_id), &stamp)?;
    }
    tx.execute(
      "UPDATE battle_plan SET status = ?1, updated_at = ?2 WHERE id = ?3",
      params![status, stamp, plan_id],
    )?;
    Ok(PlanUpdated {
      status: "updated",
      plan_id,
      old_status: plan.status,
      new_status: status,
    })
  })?;
  info!(
    "battle plan #{plan_id}: {} -> {}",
    out.old_status, out.new_status
  );
  Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct RaidLogged {
  pub status: &'static str,
  pub id: i64,
  pub agent: String,
  pub priority: RaidPriority,
}

/// Append an entry to the raid log.
pub fn log_raid(
  ctx: &AppContext,
  agent: &str,
  entry: &str,
  priority: RaidPriority,
) -> Result<RaidLogged> {
  let id = ctx.store.write(|tx| {
    require_agent(tx, agent)?;
    append_raid(tx, ctx.content.as_ref(), agent, entry, priority, now())
  })?;
  Ok(RaidLogged {
    status: "logged",
    id,
    agent: agent.to_string(),
    priority,
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct RaidView {
  #[serde(flatten)]
  pub entry: RaidLogEntry,
  pub content: Option<String>,
}

/// Newest raid-log entries first, optionally filtered.
pub fn get_raid_log(
  ctx: &AppContext,
  priority: Option<RaidPriority>,
  agent: Option<&str>,
  count: usize,
) -> Result<Vec<RaidView>> {
  let limit = i64::try_from(count).unwrap_or(i64::MAX);
  let entries = ctx.store.read(|tx| {
    let mut stmt = tx.prepare(
      "SELECT id, agent_name, entry_file, priority, created_at FROM raid_log
       WHERE (?1 IS NULL OR priority = ?1) AND (?2 IS NULL OR agent_name = ?2)
       ORDER BY created_at DESC, id DESC LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![priority, agent, limit], RaidLogEntry::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
  })?;
  Ok(
    entries
      .into_iter()
      .map(|entry| RaidView {
        content: content::read_or_warn(ctx.content.as_ref(), &entry.entry_file),
        entry,
      })
      .collect(),
  )
}
