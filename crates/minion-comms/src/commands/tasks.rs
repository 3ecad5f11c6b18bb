use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::commands::{Output, absolutize};
use crate::config::AppContext;
use crate::model::{AgentClass, Task, TaskStatus};
use crate::tasks::{self, NewTask, TaskFilter, TaskUpdate};
use crate::utils::log::t;
use crate::utils::term::print_table;
use crate::{log_info, log_success, log_warn};

#[derive(Debug, Args)]
pub struct CreateArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub title: String,
  /// File describing the task
  #[arg(long)]
  pub task_file: String,
  #[arg(long)]
  pub project: Option<String>,
  #[arg(long)]
  pub zone: Option<String>,
  /// Ids of tasks that must close first, comma-separated
  #[arg(long, value_delimiter = ',')]
  pub blocked_by: Vec<i64>,
  #[arg(long = "class-required")]
  pub class_required: Option<AgentClass>,
}

pub fn create_task(ctx: &AppContext, cwd: &Path, out: Output, args: &CreateArgs) -> Result<()> {
  let new = NewTask {
    title: args.title.clone(),
    spec_ref: absolutize(cwd, &args.task_file),
    project: args.project.clone(),
    zone: args.zone.clone(),
    blocked_by: args.blocked_by.clone(),
    class_required: args.class_required,
  };
  let res = tasks::create_task(ctx, &args.agent, &new)?;
  out.emit(&res, |r| {
    log_success!("Created task #{}: {}", r.task_id, r.title);
  })
}

#[derive(Debug, Args)]
pub struct AssignArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub task_id: i64,
  #[arg(long)]
  pub to: String,
}

pub fn assign_task(ctx: &AppContext, out: Output, args: &AssignArgs) -> Result<()> {
  let res = tasks::assign_task(ctx, &args.agent, args.task_id, &args.to)?;
  out.emit(&res, |r| {
    log_success!("Task #{} assigned to {}", r.task_id, r.assigned_to);
  })
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub task_id: i64,
  #[arg(long)]
  pub status: Option<TaskStatus>,
  #[arg(long)]
  pub progress: Option<String>,
  #[arg(long)]
  pub files: Option<String>,
}

pub fn update_task(ctx: &AppContext, out: Output, args: &UpdateArgs) -> Result<()> {
  let update = TaskUpdate {
    status: args.status,
    progress: args.progress.clone(),
    files: args.files.clone(),
  };
  let res = tasks::update_task(ctx, &args.agent, args.task_id, &update)?;
  out.emit(&res, |r| {
    log_success!("Task #{} updated (activity {})", r.task_id, r.activity_count);
    if let Some(w) = &r.warning {
      log_warn!("{}", w);
    }
    if let Some(w) = &r.staleness_warning {
      log_warn!("{}", w);
    }
  })
}

#[derive(Debug, Args)]
pub struct ListArgs {
  #[arg(long)]
  pub status: Option<TaskStatus>,
  #[arg(long)]
  pub project: Option<String>,
  #[arg(long)]
  pub zone: Option<String>,
  #[arg(long)]
  pub assigned_to: Option<String>,
  #[arg(long = "class-required")]
  pub class_required: Option<AgentClass>,
  #[arg(long)]
  pub count: Option<usize>,
}

fn task_rows(list: &[Task]) -> Vec<Vec<String>> {
  list
    .iter()
    .map(|task| {
      vec![
        t::id(task.id),
        task.title.clone(),
        task.status.to_string(),
        task.assigned_to.as_deref().map(t::name).unwrap_or_default(),
        task.zone.clone().unwrap_or_default(),
        task.activity_count.to_string(),
      ]
    })
    .collect()
}

pub fn get_tasks(ctx: &AppContext, out: Output, args: &ListArgs) -> Result<()> {
  let filter = TaskFilter {
    status: args.status,
    project: args.project.clone(),
    zone: args.zone.clone(),
    assigned_to: args.assigned_to.clone(),
    class_required: args.class_required,
    limit: args.count,
  };
  let list = tasks::get_tasks(ctx, &filter)?;
  out.emit(&list, |list| {
    if list.is_empty() {
      log_info!("No tasks.");
      return;
    }
    print_table(
      &["ID", "TITLE", "STATUS", "ASSIGNEE", "ZONE", "ACTIVITY"],
      &task_rows(list),
    );
  })
}

#[derive(Debug, Args)]
pub struct TaskIdArg {
  #[arg(long)]
  pub task_id: i64,
}

pub fn get_task(ctx: &AppContext, out: Output, args: &TaskIdArg) -> Result<()> {
  let detail = tasks::get_task(ctx, args.task_id)?;
  out.emit(&detail, |d| {
    let task = &d.task;
    log_info!("{} {} [{}]", t::id(format!("#{}", task.id)), task.title, task.status);
    log_info!("  spec: {}", t::path(&task.task_file));
    if let Some(who) = &task.assigned_to {
      log_info!("  assignee: {}", t::name(who));
    }
    if !task.blocked_by.is_empty() {
      let ids: Vec<String> = task.blocked_by.iter().map(|id| format!("#{id}")).collect();
      log_info!("  blocked by: {}", ids.join(", "));
    }
    if let Some(progress) = &task.progress {
      log_info!("  progress: {}", progress);
    }
    if let Some(result) = &task.result_file {
      log_info!("  result: {}", t::path(result));
    }
    let next: Vec<&str> = d.transitions.iter().map(|s| s.as_str()).collect();
    log_info!("  next: {}", next.join(", "));
  })
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub task_id: i64,
  #[arg(long)]
  pub result_file: String,
}

pub fn submit_result(ctx: &AppContext, cwd: &Path, out: Output, args: &SubmitArgs) -> Result<()> {
  let reference = absolutize(cwd, &args.result_file);
  let res = tasks::submit_result(ctx, &args.agent, args.task_id, &reference)?;
  out.emit(&res, |r| {
    log_success!("Result recorded for task #{}", r.task_id);
  })
}

#[derive(Debug, Args)]
pub struct AgentTaskArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub task_id: i64,
}

pub fn close_task(ctx: &AppContext, out: Output, args: &AgentTaskArgs) -> Result<()> {
  let res = tasks::close_task(ctx, &args.agent, args.task_id)?;
  out.emit(&res, |r| {
    log_success!("Closed task #{}: {}", r.task_id, r.title);
  })
}

pub fn pull_task(ctx: &AppContext, out: Output, args: &AgentTaskArgs) -> Result<()> {
  let res = tasks::pull_task(ctx, &args.agent, args.task_id)?;
  out.emit(&res, |r| {
    log_success!("Pulled task #{} ({}): {}", r.task_id, r.task_status, r.title);
    match &r.task_content {
      Some(text) => log_info!("{}", text),
      None => log_warn!("(spec missing: {})", r.task_file),
    }
  })
}

#[derive(Debug, Args)]
pub struct CompleteArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub task_id: i64,
  /// Review failed: route the task back for rework
  #[arg(long)]
  pub failed: bool,
}

pub fn complete_task(ctx: &AppContext, out: Output, args: &CompleteArgs) -> Result<()> {
  let res = tasks::complete_task(ctx, &args.agent, args.task_id, !args.failed)?;
  out.emit(&res, |r| {
    log_success!("Task #{}: {} -> {}", r.task_id, r.from_status, r.to_status);
    match &r.eligible_classes {
      Some(classes) if !classes.is_empty() => {
        let names: Vec<&str> = classes.iter().map(|c| c.as_str()).collect();
        log_info!("  next up: {}", names.join(", "));
      }
      Some(_) => {}
      None => log_info!("  next up: current assignee"),
    }
  })
}
