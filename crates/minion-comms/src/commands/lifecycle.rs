use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::commands::agents::AgentArg;
use crate::commands::{Output, absolutize};
use crate::config::AppContext;
use crate::lifecycle;
use crate::utils::log::t;
use crate::{log_info, log_success, log_warn};

#[derive(Debug, Args)]
pub struct FenixDownArgs {
  #[arg(long)]
  pub agent: String,
  /// Files written before the reset, comma-separated
  #[arg(long, value_delimiter = ',', required = true)]
  pub files: Vec<String>,
  #[arg(long)]
  pub manifest: Option<String>,
}

pub fn fenix_down(ctx: &AppContext, out: Output, args: &FenixDownArgs) -> Result<()> {
  let res = lifecycle::fenix_down(ctx, &args.agent, &args.files, args.manifest.as_deref())?;
  out.emit(&res, |r| {
    log_success!("Recorded {} file(s) for {}", r.files_count, t::name(&r.agent));
  })
}

pub fn cold_start(ctx: &AppContext, out: Output, args: &AgentArg) -> Result<()> {
  let brief = lifecycle::cold_start(ctx, &args.agent)?;
  out.emit(&brief, |b| {
    log_info!("{} ({})", t::name(&b.agent_name), b.agent_class);
    match &b.battle_plan {
      Some(view) => log_info!(
        "Battle plan #{}: {}",
        view.plan.id,
        view.content.as_deref().unwrap_or("")
      ),
      None => log_warn!("No active battle plan"),
    }
    for record in &b.fenix_down_records {
      log_info!("Notes from {}:", record.created_at.format("%Y-%m-%d %H:%M"));
      for file in &record.files {
        log_info!("  {}", t::path(file));
      }
    }
    for task in &b.tasks {
      log_info!("Task #{} {} [{}]", task.id, task.title, task.status);
    }
    for file in &b.claimed_files {
      log_info!("Claimed {}", t::path(file));
    }
    if b.unread_messages > 0 {
      log_warn!("{} unread message(s)", b.unread_messages);
    }
    for flag in &b.flags {
      log_warn!("Flag {} set by {}", flag.key, flag.set_by);
    }
    for file in &b.briefing_files {
      log_info!("Read {}", t::path(file));
    }
  })
}

#[derive(Debug, Args)]
pub struct DebriefArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub debrief_file: String,
}

pub fn debrief(ctx: &AppContext, cwd: &Path, out: Output, args: &DebriefArgs) -> Result<()> {
  let reference = absolutize(cwd, &args.debrief_file);
  let res = lifecycle::debrief(ctx, &args.agent, &reference)?;
  out.emit(&res, |r| {
    log_success!("Debrief #{} filed", r.debrief_id);
  })
}

pub fn end_session(ctx: &AppContext, out: Output, args: &AgentArg) -> Result<()> {
  let res = lifecycle::end_session(ctx, &args.agent)?;
  out.emit(&res, |r| {
    log_success!("Session ended, battle plan #{} completed", r.plan_id);
  })
}
