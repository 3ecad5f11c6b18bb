//! Read-only views over agents, tasks, claims and flags.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::Transaction;
use serde::Serialize;

use crate::auth::{self, Operation};
use crate::claims;
use crate::config::AppContext;
use crate::error::{CommsError, Result};
use crate::mailbox::{self, InboxMessage};
use crate::model::{BattlePlan, FileClaim, Flag, Task, TaskStatus};
use crate::registry::{self, AgentView};
use crate::store::find_agent;
use crate::store::time::{minutes_between, now};
use crate::tasks::{self, DRAGGING_ACTIVITY, TaskFilter};
use crate::utils::error_messages;
use crate::warroom;

const SITREP_MESSAGES: usize = 10;
const ACTIVE_WITHIN_MINS: i64 = 5;
const IDLE_WITHIN_MINS: i64 = 30;

pub(crate) fn active_tasks(tx: &Transaction<'_>, assigned_to: Option<&str>) -> Result<Vec<Task>> {
  tasks::query_tasks(
    tx,
    &TaskFilter {
      assigned_to: assigned_to.map(str::to_string),
      limit: Some(usize::MAX),
      ..TaskFilter::default()
    },
  )
}

pub(crate) fn set_flags(tx: &Transaction<'_>) -> Result<Vec<Flag>> {
  let mut stmt =
    tx.prepare("SELECT key, value, set_by, set_at FROM flags WHERE value = '1' ORDER BY key")?;
  let rows = stmt.query_map([], Flag::from_row)?;
  Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[derive(Debug, Clone, Serialize)]
pub struct PartyMember {
  #[serde(flatten)]
  pub view: AgentView,
  pub claimed_files: Vec<String>,
  pub tasks: Vec<Task>,
}

/// Every agent with its claims and active tasks. Lead only.
pub fn party_status(ctx: &AppContext, caller: &str) -> Result<Vec<PartyMember>> {
  ctx.store.read(|tx| {
    auth::authorize(tx, caller, Operation::PartyStatus)?;
    let at = now();
    registry::list_agents(tx)?
      .into_iter()
      .map(|agent| {
        let claimed_files = claims::list_claims(tx, Some(&agent.name))?
          .into_iter()
          .map(|c| c.file_path)
          .collect();
        let tasks = active_tasks(tx, Some(&agent.name))?;
        Ok(PartyMember {
          view: AgentView::new(agent, at),
          claimed_files,
          tasks,
        })
      })
      .collect()
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct Zone {
  pub zone: String,
  pub agent: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sitrep {
  pub agents: Vec<AgentView>,
  pub active_tasks: Vec<Task>,
  pub zones: Vec<Zone>,
  pub claims: Vec<FileClaim>,
  pub flags: Vec<Flag>,
  pub battle_plan: Option<BattlePlan>,
  pub recent_messages: Vec<InboxMessage>,
}

/// Snapshot of the whole crew.
pub fn sitrep(ctx: &AppContext) -> Result<Sitrep> {
  debug!("sitrep");
  let (agents, active_tasks, claims, flags, battle_plan, messages) = ctx.store.read(|tx| {
    Ok((
      registry::list_agents(tx)?,
      active_tasks(tx, None)?,
      claims::list_claims(tx, None)?,
      set_flags(tx)?,
      warroom::active_plan(tx)?,
      mailbox::recent_messages(tx, SITREP_MESSAGES)?,
    ))
  })?;
  let at = now();
  let mut zones: Vec<Zone> = agents
    .iter()
    .filter_map(|a| {
      a.current_zone.as_ref().map(|zone| Zone {
        zone: zone.clone(),
        agent: a.name.clone(),
      })
    })
    .collect();
  zones.sort_by(|a, b| a.zone.cmp(&b.zone).then_with(|| a.agent.cmp(&b.agent)));

  Ok(Sitrep {
    agents: agents.into_iter().map(|a| AgentView::new(a, at)).collect(),
    active_tasks,
    zones,
    claims,
    flags,
    battle_plan,
    recent_messages: messages
      .into_iter()
      .map(|m| InboxMessage::resolve(ctx, m))
      .collect(),
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
  Active,
  Idle,
  Unresponsive,
}

impl Activity {
  #[must_use]
  pub fn from_minutes(mins: i64) -> Self {
    if mins < ACTIVE_WITHIN_MINS {
      Self::Active
    } else if mins < IDLE_WITHIN_MINS {
      Self::Idle
    } else {
      Self::Unresponsive
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskActivity {
  pub id: i64,
  pub title: String,
  pub status: TaskStatus,
  pub activity_count: i64,
  pub dragging: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityReport {
  pub agent: String,
  pub last_seen_mins_ago: i64,
  pub activity: Activity,
  pub tasks: Vec<TaskActivity>,
  pub claimed_files: Vec<String>,
}

pub fn check_activity(ctx: &AppContext, agent: &str) -> Result<ActivityReport> {
  let (row, tasks, claims) = ctx.store.read(|tx| {
    let row = find_agent(tx, agent)?
      .ok_or_else(|| CommsError::NotFound(error_messages::agent_not_found(agent)))?;
    Ok((
      row,
      active_tasks(tx, Some(agent))?,
      claims::list_claims(tx, Some(agent))?,
    ))
  })?;
  let mins = minutes_between(row.last_seen, now());
  Ok(ActivityReport {
    agent: row.name,
    last_seen_mins_ago: mins,
    activity: Activity::from_minutes(mins),
    tasks: tasks
      .into_iter()
      .map(|t| TaskActivity {
        dragging: t.activity_count >= DRAGGING_ACTIVITY,
        id: t.id,
        title: t.title,
        status: t.status,
        activity_count: t.activity_count,
      })
      .collect(),
    claimed_files: claims.into_iter().map(|c| c.file_path).collect(),
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFreshness {
  pub file: String,
  pub exists: bool,
  /// Modified after the agent last refreshed its context.
  pub stale: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Freshness {
  pub agent: String,
  pub context_updated_at: Option<DateTime<Utc>>,
  pub files: Vec<FileFreshness>,
  pub stale_count: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
  let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
  Some(DateTime::<Utc>::from(modified))
}

/// Compare each file's modification time with `agent`'s last context
/// update. The caller must be a lead.
pub fn check_freshness(
  ctx: &AppContext,
  caller: &str,
  agent: &str,
  files: &[String],
) -> Result<Freshness> {
  let agent = ctx.store.read(|tx| {
    auth::authorize(tx, caller, Operation::CheckFreshness)?;
    find_agent(tx, agent)?
      .ok_or_else(|| CommsError::NotFound(error_messages::agent_not_found(agent)))
  })?;
  let since = agent.context_updated_at;

  let files: Vec<FileFreshness> = files
    .iter()
    .map(|file| {
      let modified = modified_at(Path::new(file));
      let stale = match (since, modified) {
        (None, _) => true,
        (Some(since), Some(m)) => m > since,
        (Some(_), None) => false,
      };
      FileFreshness {
        file: file.clone(),
        exists: modified.is_some(),
        stale,
        modified_at: modified,
      }
    })
    .collect();

  Ok(Freshness {
    agent: agent.name,
    context_updated_at: since,
    stale_count: files.iter().filter(|f| f.stale).count(),
    note: since.is_none().then(|| "No context set yet; every file counts as stale.".to_string()),
    files,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn activity_thresholds() {
    assert_eq!(Activity::from_minutes(0), Activity::Active);
    assert_eq!(Activity::from_minutes(4), Activity::Active);
    assert_eq!(Activity::from_minutes(5), Activity::Idle);
    assert_eq!(Activity::from_minutes(29), Activity::Idle);
    assert_eq!(Activity::from_minutes(30), Activity::Unresponsive);
  }
}
