use anyhow::Result;
use clap::Args;

use crate::commands::Output;
use crate::config::AppContext;
use crate::model::{PlanStatus, RaidPriority};
use crate::utils::log::t;
use crate::warroom::{self, DEFAULT_RAID_LOG_COUNT};
use crate::{log_info, log_success, log_warn};

#[derive(Debug, Args)]
pub struct SetPlanArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub plan: String,
}

pub fn set_battle_plan(ctx: &AppContext, out: Output, args: &SetPlanArgs) -> Result<()> {
  let res = warroom::set_battle_plan(ctx, &args.agent, &args.plan)?;
  out.emit(&res, |r| {
    log_success!("Battle plan #{} is active", r.plan_id);
    if r.superseded > 0 {
      log_info!("  superseded {} plan(s)", r.superseded);
    }
  })
}

#[derive(Debug, Args)]
pub struct GetPlanArgs {
  #[arg(long, default_value = "active")]
  pub status: PlanStatus,
}

pub fn get_battle_plan(ctx: &AppContext, out: Output, args: &GetPlanArgs) -> Result<()> {
  let plans = warroom::get_battle_plan(ctx, args.status)?;
  out.emit(&plans, |list| {
    if list.is_empty() {
      log_info!("No {} battle plan.", args.status);
    }
    for view in list {
      log_info!(
        "{} by {} ({})",
        t::id(format!("#{}", view.plan.id)),
        t::name(&view.plan.set_by),
        view.plan.status
      );
      match &view.content {
        Some(text) => log_info!("{}", text),
        None => log_warn!("(content missing: {})", view.plan.plan_file),
      }
    }
  })
}

#[derive(Debug, Args)]
pub struct UpdatePlanArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub plan_id: i64,
  #[arg(long)]
  pub status: PlanStatus,
}

pub fn update_battle_plan_status(ctx: &AppContext, out: Output, args: &UpdatePlanArgs) -> Result<()> {
  let res = warroom::update_battle_plan_status(ctx, &args.agent, args.plan_id, args.status)?;
  out.emit(&res, |r| {
    log_success!(
      "Battle plan #{}: {} -> {}",
      r.plan_id,
      r.old_status,
      r.new_status
    );
  })
}

#[derive(Debug, Args)]
pub struct LogRaidArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub entry: String,
  #[arg(long, default_value = "normal")]
  pub priority: RaidPriority,
}

pub fn log_raid(ctx: &AppContext, out: Output, args: &LogRaidArgs) -> Result<()> {
  let res = warroom::log_raid(ctx, &args.agent, &args.entry, args.priority)?;
  out.emit(&res, |r| {
    log_success!("Raid log #{} ({})", r.id, r.priority);
  })
}

#[derive(Debug, Args)]
pub struct GetRaidLogArgs {
  #[arg(long)]
  pub priority: Option<RaidPriority>,
  #[arg(long)]
  pub agent: Option<String>,
  #[arg(long, default_value_t = DEFAULT_RAID_LOG_COUNT)]
  pub count: usize,
}

pub fn get_raid_log(ctx: &AppContext, out: Output, args: &GetRaidLogArgs) -> Result<()> {
  let entries = warroom::get_raid_log(ctx, args.priority, args.agent.as_deref(), args.count)?;
  out.emit(&entries, |list| {
    for view in list {
      log_info!(
        "{} [{}] {}: {}",
        view.entry.created_at.format("%Y-%m-%d %H:%M"),
        view.entry.priority,
        t::name(&view.entry.agent_name),
        view.content.as_deref().unwrap_or("(content missing)")
      );
    }
  })
}
