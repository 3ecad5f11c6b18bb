//! Task workflow: creation, assignment, progress, review pipeline and
//! result-gated closure.

pub mod flow;

use log::{debug, info};
use rusqlite::{Transaction, params};
use serde::Serialize;

use crate::auth::{self, Operation};
use crate::config::AppContext;
use crate::content;
use crate::error::{CommsError, Result};
use crate::model::{AgentClass, FlagKey, Task, TaskStatus, encode_ids};
use crate::registry::staleness_message;
use crate::store::time::{format_ts, now};
use crate::store::{active_plan_count, find_agent, find_task, flag, require_agent, touch_agent};
use crate::utils::error_messages;

/// Activity count at which an update warns that the task may be stuck.
pub const DRAGGING_ACTIVITY: i64 = 4;

const DEFAULT_TASK_LIMIT: usize = 50;

fn ensure_no_moon_crash(tx: &Transaction<'_>) -> Result<()> {
  if let Some(mc) = flag(tx, FlagKey::MoonCrash)? {
    return Err(CommsError::Blocked(error_messages::moon_crash_active(
      mc.set_by,
      format_ts(mc.set_at),
    )));
  }
  Ok(())
}

/// Input for [`create_task`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
  pub title: String,
  /// Reference to the spec content; must exist.
  pub spec_ref: String,
  pub project: Option<String>,
  pub zone: Option<String>,
  pub blocked_by: Vec<i64>,
  pub class_required: Option<AgentClass>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskCreated {
  pub status: &'static str,
  pub task_id: i64,
  pub title: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub blocked_by: Vec<i64>,
}

pub fn create_task(ctx: &AppContext, creator: &str, new: &NewTask) -> Result<TaskCreated> {
  debug!("create task '{}' by {creator}", new.title);
  let task_id = ctx.store.write(|tx| {
    auth::authorize(tx, creator, Operation::CreateTask)?;
    if active_plan_count(tx)? != 1 {
      return Err(CommsError::Blocked(error_messages::NO_ACTIVE_PLAN.to_string()));
    }
    if !ctx.content.exists(&new.spec_ref) {
      return Err(CommsError::Invalid(error_messages::spec_missing(&new.spec_ref)));
    }
    for &id in &new.blocked_by {
      match find_task(tx, id) {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
          return Err(CommsError::NotFound(error_messages::blocker_missing(id)));
        }
        Err(e) => return Err(e),
      }
    }
    let stamp = format_ts(now());
    tx.execute(
      "INSERT INTO tasks
         (title, task_file, project, zone, status, blocked_by, created_by, class_required,
          activity_count, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
      params![
        new.title,
        new.spec_ref,
        new.project,
        new.zone,
        TaskStatus::Open,
        encode_ids(&new.blocked_by),
        creator,
        new.class_required,
        stamp
      ],
    )?;
    Ok(tx.last_insert_rowid())
  })?;
  info!("task #{task_id} '{}' created by {creator}", new.title);
  Ok(TaskCreated {
    status: "created",
    task_id,
    title: new.title.clone(),
    blocked_by: new.blocked_by.clone(),
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskAssigned {
  pub status: &'static str,
  pub task_id: i64,
  pub assigned_to: String,
}

/// Hand a task to `assignee`. Reopens dead-end tasks; blockers are not checked.
pub fn assign_task(ctx: &AppContext, caller: &str, task_id: i64, assignee: &str) -> Result<TaskAssigned> {
  ctx.store.write(|tx| {
    ensure_no_moon_crash(tx)?;
    auth::authorize(tx, caller, Operation::AssignTask)?;
    if find_agent(tx, assignee)?.is_none() {
      return Err(CommsError::NotFound(error_messages::agent_not_found(assignee)));
    }
    let task = find_task(tx, task_id)?;
    if flow::is_terminal(task.status) {
      return Err(CommsError::Blocked(error_messages::task_closed(task_id)));
    }
    tx.execute(
      "UPDATE tasks SET assigned_to = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
      params![assignee, TaskStatus::Assigned, format_ts(now()), task_id],
    )?;
    Ok(())
  })?;
  info!("task #{task_id} assigned to {assignee} by {caller}");
  Ok(TaskAssigned {
    status: "assigned",
    task_id,
    assigned_to: assignee.to_string(),
  })
}

/// Fields to change in [`update_task`]. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
  pub status: Option<TaskStatus>,
  pub progress: Option<String>,
  pub files: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskUpdated {
  pub status: &'static str,
  pub task_id: i64,
  pub activity_count: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub new_status: Option<TaskStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub warning: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub staleness_warning: Option<String>,
}

/// Record progress. Every call bumps the activity counter.
pub fn update_task(
  ctx: &AppContext,
  caller: &str,
  task_id: i64,
  update: &TaskUpdate,
) -> Result<TaskUpdated> {
  if update.status == Some(TaskStatus::Closed) {
    return Err(CommsError::Blocked(error_messages::CLOSE_VIA_UPDATE.to_string()));
  }
  ctx.store.write(|tx| {
    let agent = require_agent(tx, caller)?;
    let task = find_task(tx, task_id)?;
    if flow::is_terminal(task.status) {
      return Err(CommsError::Blocked(error_messages::task_closed(task_id)));
    }
    if flow::is_dead_end(task.status)
      && let Some(status) = update.status
      && status != task.status
    {
      return Err(CommsError::Blocked(error_messages::task_dead_end(task_id, task.status)));
    }

    let at = now();
    tx.execute(
      "UPDATE tasks SET
         activity_count = activity_count + 1,
         updated_at = ?1,
         status = COALESCE(?2, status),
         progress = COALESCE(?3, progress),
         files = COALESCE(?4, files)
       WHERE id = ?5",
      params![
        format_ts(at),
        update.status,
        update.progress,
        update.files,
        task_id
      ],
    )?;
    touch_agent(tx, caller, at)?;
    let activity_count = find_task(tx, task_id)?.activity_count;

    Ok(TaskUpdated {
      status: "updated",
      task_id,
      activity_count,
      new_status: update.status,
      warning: (activity_count >= DRAGGING_ACTIVITY)
        .then(|| error_messages::activity_dragging(activity_count)),
      staleness_warning: staleness_message(&agent, at),
    })
  })
}

/// Filters for [`get_tasks`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
  /// Without a status only open, assigned and in-progress tasks are listed.
  pub status: Option<TaskStatus>,
  pub project: Option<String>,
  pub zone: Option<String>,
  pub assigned_to: Option<String>,
  pub class_required: Option<AgentClass>,
  pub limit: Option<usize>,
}

pub(crate) fn query_tasks(tx: &Transaction<'_>, filter: &TaskFilter) -> Result<Vec<Task>> {
  let limit = i64::try_from(filter.limit.unwrap_or(DEFAULT_TASK_LIMIT)).unwrap_or(i64::MAX);
  let sql = format!(
    "SELECT {} FROM tasks
     WHERE (?1 IS NULL AND status IN ('open', 'assigned', 'in_progress') OR status = ?1)
       AND (?2 IS NULL OR project = ?2)
       AND (?3 IS NULL OR zone = ?3)
       AND (?4 IS NULL OR assigned_to = ?4)
       AND (?5 IS NULL OR class_required = ?5)
     ORDER BY created_at DESC, id DESC LIMIT ?6",
    Task::COLUMNS
  );
  let mut stmt = tx.prepare(&sql)?;
  let rows = stmt.query_map(
    params![
      filter.status,
      filter.project,
      filter.zone,
      filter.assigned_to,
      filter.class_required,
      limit
    ],
    Task::from_row,
  )?;
  Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Tasks matching `filter`, newest first.
pub fn get_tasks(ctx: &AppContext, filter: &TaskFilter) -> Result<Vec<Task>> {
  ctx.store.read(|tx| query_tasks(tx, filter))
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
  #[serde(flatten)]
  pub task: Task,
  pub transitions: Vec<TaskStatus>,
  pub eligible_classes: Option<Vec<AgentClass>>,
}

pub fn get_task(ctx: &AppContext, task_id: i64) -> Result<TaskDetail> {
  let task = ctx.store.read(|tx| find_task(tx, task_id))?;
  Ok(TaskDetail {
    transitions: flow::valid_transitions(task.status),
    eligible_classes: flow::eligible_classes(task.status, task.class_required),
    task,
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultSubmitted {
  pub status: &'static str,
  pub task_id: i64,
  pub result_file: String,
}

/// Attach a result artifact. It must exist in the content store.
pub fn submit_result(
  ctx: &AppContext,
  agent: &str,
  task_id: i64,
  result_ref: &str,
) -> Result<ResultSubmitted> {
  ctx.store.write(|tx| {
    require_agent(tx, agent)?;
    let task = find_task(tx, task_id)?;
    if flow::is_terminal(task.status) {
      return Err(CommsError::Blocked(error_messages::task_closed(task_id)));
    }
    if !ctx.content.exists(result_ref) {
      return Err(CommsError::Invalid(error_messages::result_missing(result_ref)));
    }
    let at = now();
    tx.execute(
      "UPDATE tasks SET result_file = ?1, updated_at = ?2 WHERE id = ?3",
      params![result_ref, format_ts(at), task_id],
    )?;
    touch_agent(tx, agent, at)
  })?;
  info!("{agent} submitted result for task #{task_id}");
  Ok(ResultSubmitted {
    status: "submitted",
    task_id,
    result_file: result_ref.to_string(),
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskClosed {
  pub status: &'static str,
  pub task_id: i64,
  pub title: String,
}

fn ensure_closable(task: &Task) -> Result<()> {
  if flow::is_terminal(task.status) {
    return Err(CommsError::Blocked(error_messages::task_already_closed(task.id)));
  }
  if task.result_file.is_none() {
    return Err(CommsError::Blocked(error_messages::no_result_file(task.id)));
  }
  Ok(())
}

/// Close a task that has a result. Nothing about it changes afterwards.
pub fn close_task(ctx: &AppContext, caller: &str, task_id: i64) -> Result<TaskClosed> {
  let title = ctx.store.write(|tx| {
    auth::authorize(tx, caller, Operation::CloseTask)?;
    let task = find_task(tx, task_id)?;
    ensure_closable(&task)?;
    tx.execute(
      "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
      params![TaskStatus::Closed, format_ts(now()), task_id],
    )?;
    Ok(task.title)
  })?;
  info!("task #{task_id} closed by {caller}");
  Ok(TaskClosed {
    status: "closed",
    task_id,
    title,
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskPulled {
  pub status: &'static str,
  pub task_id: i64,
  pub title: String,
  pub task_status: TaskStatus,
  pub task_file: String,
  pub task_content: Option<String>,
}

/// Take a task for the current stage of the pipeline.
///
/// Every blocker must be closed, the caller's class must be eligible for the
/// stage, and nobody else may hold the task.
pub fn pull_task(ctx: &AppContext, agent: &str, task_id: i64) -> Result<TaskPulled> {
  debug!("pull task #{task_id} by {agent}");
  let task = ctx.store.write(|tx| {
    let caller = require_agent(tx, agent)?;
    ensure_no_moon_crash(tx)?;
    let task = find_task(tx, task_id)?;
    if !flow::is_live(task.status) {
      return Err(CommsError::Blocked(error_messages::task_terminal(task_id, task.status)));
    }

    let mut unresolved = Vec::new();
    for &blocker in &task.blocked_by {
      match find_task(tx, blocker) {
        Ok(b) if flow::is_terminal(b.status) => {}
        Ok(_) => unresolved.push(blocker),
        Err(e) if e.is_not_found() => unresolved.push(blocker),
        Err(e) => return Err(e),
      }
    }
    if !unresolved.is_empty() {
      return Err(CommsError::Blocked(error_messages::blockers_unresolved(&unresolved)));
    }

    match flow::eligible_classes(task.status, task.class_required) {
      Some(classes) if !classes.contains(&caller.agent_class) => {
        let names: Vec<&str> = classes.iter().map(|c| c.as_str()).collect();
        return Err(CommsError::Blocked(error_messages::not_eligible(
          caller.agent_class,
          task.status,
          &names.join(", "),
        )));
      }
      None if task.assigned_to.is_none() => {
        return Err(CommsError::Blocked(error_messages::not_eligible(
          caller.agent_class,
          task.status,
          "current assignee",
        )));
      }
      _ => {}
    }
    if let Some(holder) = &task.assigned_to
      && holder != agent
    {
      return Err(CommsError::Blocked(error_messages::task_taken(task_id, holder)));
    }

    let status = if task.status == TaskStatus::Open {
      TaskStatus::Assigned
    } else {
      task.status
    };
    let at = now();
    tx.execute(
      "UPDATE tasks SET assigned_to = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
      params![agent, status, format_ts(at), task_id],
    )?;
    touch_agent(tx, agent, at)?;
    find_task(tx, task_id)
  })?;
  info!("{agent} pulled task #{task_id} ({})", task.status);
  Ok(TaskPulled {
    status: "claimed",
    task_id,
    task_content: content::read_or_warn(ctx.content.as_ref(), &task.task_file),
    title: task.title,
    task_status: task.status,
    task_file: task.task_file,
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskCompleted {
  pub status: &'static str,
  pub task_id: i64,
  pub from_status: TaskStatus,
  pub to_status: TaskStatus,
  pub activity_count: i64,
  /// Classes that can pull the task next; `None` keeps the current assignee.
  pub eligible_classes: Option<Vec<AgentClass>>,
}

/// Advance a task one stage, or route it back on a failed review.
///
/// Entering a review stage or failing one clears the assignee so the next
/// eligible worker can pull. Advancing into `closed` needs a lead and a result.
pub fn complete_task(ctx: &AppContext, agent: &str, task_id: i64, passed: bool) -> Result<TaskCompleted> {
  debug!("complete task #{task_id} by {agent} (passed: {passed})");
  let out = ctx.store.write(|tx| {
    let caller = require_agent(tx, agent)?;
    let task = find_task(tx, task_id)?;
    if !flow::is_live(task.status) {
      return Err(CommsError::Blocked(error_messages::task_terminal(task_id, task.status)));
    }
    let to = flow::next_status(task.status, passed).ok_or_else(|| {
      CommsError::Invalid(error_messages::no_failure_route(task_id, task.status))
    })?;
    if to == TaskStatus::Closed {
      auth::check_class(agent, caller.agent_class, Operation::CloseTask)?;
      ensure_closable(&task)?;
    }

    let clear_assignee = !passed || flow::is_review(to);
    let at = now();
    tx.execute(
      "UPDATE tasks SET
         status = ?1,
         assigned_to = CASE WHEN ?2 THEN NULL ELSE assigned_to END,
         activity_count = activity_count + 1,
         updated_at = ?3
       WHERE id = ?4",
      params![to, clear_assignee, format_ts(at), task_id],
    )?;
    touch_agent(tx, agent, at)?;
    let updated = find_task(tx, task_id)?;
    Ok(TaskCompleted {
      status: "completed",
      task_id,
      from_status: task.status,
      to_status: to,
      activity_count: updated.activity_count,
      eligible_classes: flow::eligible_classes(to, task.class_required),
    })
  })?;
  info!(
    "task #{task_id}: {} -> {} by {agent}",
    out.from_status, out.to_status
  );
  Ok(out)
}
