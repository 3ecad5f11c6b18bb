//! Session lifecycle: notes left before a context reset, the briefing that
//! picks them back up, and the lead's debrief and session close.

use log::{debug, info};
use rusqlite::{OptionalExtension as _, Transaction, params};
use serde::Serialize;
use serde_json::json;

use crate::auth::{self, Operation};
use crate::claims;
use crate::config::AppContext;
use crate::content;
use crate::error::{CommsError, Result};
use crate::mailbox;
use crate::model::{AgentClass, FenixDownRecord, Flag, FlagKey, PlanStatus, RaidPriority, Task};
use crate::monitoring;
use crate::store::time::{format_ts, now};
use crate::store::{require_agent, set_flag, touch_agent};
use crate::utils::error_messages;
use crate::warroom::{self, PlanView};

#[derive(Debug, Clone, Serialize)]
pub struct FenixDownRecorded {
  pub status: &'static str,
  pub agent: String,
  pub record_id: i64,
  pub files_count: usize,
}

/// Record the files an agent wrote out before its context is lost. The next
/// `cold_start` for that agent hands them back.
pub fn fenix_down(
  ctx: &AppContext,
  agent: &str,
  files: &[String],
  manifest: Option<&str>,
) -> Result<FenixDownRecorded> {
  let files: Vec<&str> = files.iter().map(|f| f.trim()).filter(|f| !f.is_empty()).collect();
  if files.is_empty() {
    return Err(CommsError::Invalid(error_messages::FENIX_DOWN_NO_FILES.to_string()));
  }
  let record_id = ctx.store.write(|tx| {
    require_agent(tx, agent)?;
    let at = now();
    tx.execute(
      "INSERT INTO fenix_down_records (agent_name, files, manifest, consumed, created_at)
       VALUES (?1, ?2, ?3, 0, ?4)",
      params![agent, json!(files).to_string(), manifest.unwrap_or(""), format_ts(at)],
    )?;
    let id = tx.last_insert_rowid();
    touch_agent(tx, agent, at)?;
    Ok(id)
  })?;
  info!("{agent} went fenix down with {} file(s)", files.len());
  Ok(FenixDownRecorded {
    status: "recorded",
    agent: agent.to_string(),
    record_id,
    files_count: files.len(),
  })
}

fn take_fenix_records(tx: &Transaction<'_>, agent: &str) -> Result<Vec<FenixDownRecord>> {
  let sql = format!(
    "SELECT {} FROM fenix_down_records WHERE agent_name = ?1 AND consumed = 0 ORDER BY id",
    FenixDownRecord::COLUMNS
  );
  let records = {
    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt.query_map(params![agent], FenixDownRecord::from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()?
  };
  tx.execute(
    "UPDATE fenix_down_records SET consumed = 1 WHERE agent_name = ?1 AND consumed = 0",
    params![agent],
  )?;
  Ok(records)
}

fn briefing_files(ctx: &AppContext, class: AgentClass) -> Vec<String> {
  let Some(dir) = ctx.paths.docs_dir() else {
    return Vec::new();
  };
  ["protocol-common.md".to_string(), format!("protocol-{class}.md")]
    .iter()
    .map(|file| dir.join(file))
    .filter(|path| path.is_file())
    .map(|path| path.display().to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ColdStart {
  pub agent_name: String,
  pub agent_class: AgentClass,
  pub battle_plan: Option<PlanView>,
  pub fenix_down_records: Vec<FenixDownRecord>,
  pub tasks: Vec<Task>,
  pub claimed_files: Vec<String>,
  pub unread_messages: i64,
  pub flags: Vec<Flag>,
  pub briefing_files: Vec<String>,
}

/// Everything an agent needs to resume after a context reset. Pending
/// fenix-down records are handed out once and then marked consumed.
pub fn cold_start(ctx: &AppContext, agent: &str) -> Result<ColdStart> {
  debug!("cold start for {agent}");
  let (record, plan, fenix, tasks, claimed, unread, flags) = ctx.store.write(|tx| {
    let record = require_agent(tx, agent)?;
    let plan = warroom::active_plan(tx)?;
    let fenix = take_fenix_records(tx, agent)?;
    let tasks = monitoring::active_tasks(tx, Some(agent))?;
    let claimed = claims::list_claims(tx, Some(agent))?;
    let unread = mailbox::unread_count(tx, agent)?;
    let flags = monitoring::set_flags(tx)?;
    touch_agent(tx, agent, now())?;
    Ok((record, plan, fenix, tasks, claimed, unread, flags))
  })?;
  info!("{agent} cold-started with {} fenix record(s)", fenix.len());
  Ok(ColdStart {
    agent_name: record.name,
    agent_class: record.agent_class,
    battle_plan: plan.map(|plan| PlanView {
      content: content::read_or_warn(ctx.content.as_ref(), &plan.plan_file),
      plan,
    }),
    fenix_down_records: fenix,
    tasks,
    claimed_files: claimed.into_iter().map(|c| c.file_path).collect(),
    unread_messages: unread,
    flags,
    briefing_files: briefing_files(ctx, record.agent_class),
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct DebriefFiled {
  pub status: &'static str,
  pub debrief_id: i64,
  pub debrief_file: String,
  pub raid_log_id: i64,
}

/// File the session debrief. The file must already exist.
pub fn debrief(ctx: &AppContext, caller: &str, debrief_file: &str) -> Result<DebriefFiled> {
  let out = ctx.store.write(|tx| {
    auth::authorize(tx, caller, Operation::Debrief)?;
    if !ctx.content.exists(debrief_file) {
      return Err(CommsError::Invalid(error_messages::debrief_missing(debrief_file)));
    }
    let at = now();
    tx.execute(
      "INSERT INTO debriefs (filed_by, debrief_file, filed_at) VALUES (?1, ?2, ?3)",
      params![caller, debrief_file, format_ts(at)],
    )?;
    let debrief_id = tx.last_insert_rowid();
    let raid_log_id = warroom::append_raid(
      tx,
      ctx.content.as_ref(),
      caller,
      &format!("Debrief filed: {debrief_file}"),
      RaidPriority::High,
      at,
    )?;
    touch_agent(tx, caller, at)?;
    Ok(DebriefFiled {
      status: "filed",
      debrief_id,
      debrief_file: debrief_file.to_string(),
      raid_log_id,
    })
  })?;
  info!("{caller} filed debrief #{}", out.debrief_id);
  Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEnded {
  pub status: &'static str,
  pub plan_id: i64,
  pub debrief_file: String,
}

/// Close the session: the active plan completes and every agent is told to
/// stand down. Needs a debrief filed since that plan was set.
pub fn end_session(ctx: &AppContext, caller: &str) -> Result<SessionEnded> {
  let out = ctx.store.write(|tx| {
    auth::authorize(tx, caller, Operation::EndSession)?;
    let plan = warroom::active_plan(tx)?
      .ok_or_else(|| CommsError::Blocked(error_messages::NO_ACTIVE_PLAN.to_string()))?;
    let debrief_file: String = tx
      .query_row(
        "SELECT debrief_file FROM debriefs WHERE filed_at >= ?1 ORDER BY id DESC LIMIT 1",
        params![format_ts(plan.created_at)],
        |row| row.get(0),
      )
      .optional()?
      .ok_or_else(|| CommsError::Blocked(error_messages::DEBRIEF_REQUIRED.to_string()))?;
    let at = now();
    tx.execute(
      "UPDATE battle_plan SET status = ?1, updated_at = ?2 WHERE id = ?3",
      params![PlanStatus::Completed, format_ts(at), plan.id],
    )?;
    set_flag(tx, FlagKey::StandDown, caller, at)?;
    warroom::append_raid(
      tx,
      ctx.content.as_ref(),
      caller,
      &format!("Session ended. Battle plan #{} completed.", plan.id),
      RaidPriority::High,
      at,
    )?;
    touch_agent(tx, caller, at)?;
    Ok(SessionEnded {
      status: "ended",
      plan_id: plan.id,
      debrief_file,
    })
  })?;
  info!("{caller} ended the session (plan #{})", out.plan_id);
  Ok(out)
}
