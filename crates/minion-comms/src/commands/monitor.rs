use anyhow::Result;
use clap::Args;

use crate::commands::Output;
use crate::commands::agents::AgentArg;
use crate::config::AppContext;
use crate::monitoring::{self, Activity};
use crate::utils::log::t;
use crate::utils::term::print_table;
use crate::{log_info, log_warn};

pub fn party_status(ctx: &AppContext, out: Output, args: &AgentArg) -> Result<()> {
  let members = monitoring::party_status(ctx, &args.agent)?;
  out.emit(&members, |list| {
    let rows: Vec<Vec<String>> = list
      .iter()
      .map(|m| {
        let tasks: Vec<String> = m.tasks.iter().map(|task| format!("#{}", task.id)).collect();
        vec![
          t::name(&m.view.agent.name),
          m.view.agent.agent_class.to_string(),
          m.view.hp.clone(),
          m.claimed_files.len().to_string(),
          tasks.join(","),
          format!("{}m", m.view.last_seen_mins_ago),
        ]
      })
      .collect();
    print_table(&["NAME", "CLASS", "HP", "CLAIMS", "TASKS", "SEEN"], &rows);
  })
}

pub fn sitrep(ctx: &AppContext, out: Output) -> Result<()> {
  let report = monitoring::sitrep(ctx)?;
  out.emit(&report, |r| {
    match &r.battle_plan {
      Some(plan) => log_info!("Battle plan #{} by {}", plan.id, t::name(&plan.set_by)),
      None => log_warn!("No active battle plan"),
    }
    for flag in &r.flags {
      log_warn!("Flag {} set by {}", flag.key, flag.set_by);
    }
    log_info!(
      "{} agent(s), {} active task(s), {} claim(s)",
      r.agents.len(),
      r.active_tasks.len(),
      r.claims.len()
    );
    for zone in &r.zones {
      log_info!("  zone {}: {}", zone.zone, t::name(&zone.agent));
    }
    for m in &r.recent_messages {
      log_info!(
        "  {} -> {}: {}",
        m.message.from_agent,
        m.message.to_agent,
        m.content.as_deref().unwrap_or("")
      );
    }
  })
}

pub fn check_activity(ctx: &AppContext, out: Output, args: &AgentArg) -> Result<()> {
  let report = monitoring::check_activity(ctx, &args.agent)?;
  out.emit(&report, |r| {
    let label = match r.activity {
      Activity::Active => t::ok("active"),
      Activity::Idle => t::warn("idle"),
      Activity::Unresponsive => t::err("unresponsive"),
    };
    log_info!("{}: {} (seen {}m ago)", t::name(&r.agent), label, r.last_seen_mins_ago);
    for task in &r.tasks {
      log_info!("  #{} {} [{}] activity {}", task.id, task.title, task.status, task.activity_count);
      if task.dragging {
        log_warn!("  task #{} may be stuck", task.id);
      }
    }
  })
}

#[derive(Debug, Args)]
pub struct FreshnessArgs {
  /// Lead running the check
  #[arg(long)]
  pub agent: String,
  /// Agent whose context is measured; defaults to `--agent`
  #[arg(long)]
  pub target: Option<String>,
  /// Files to check, comma-separated
  #[arg(long, value_delimiter = ',', required = true)]
  pub files: Vec<String>,
}

pub fn check_freshness(ctx: &AppContext, out: Output, args: &FreshnessArgs) -> Result<()> {
  let target = args.target.as_deref().unwrap_or(&args.agent);
  let report = monitoring::check_freshness(ctx, &args.agent, target, &args.files)?;
  out.emit(&report, |r| {
    if let Some(note) = &r.note {
      log_warn!("{}", note);
    }
    for f in &r.files {
      let state = match (f.exists, f.stale) {
        (false, _) => t::err("missing"),
        (true, true) => t::warn("changed"),
        (true, false) => t::ok("fresh"),
      };
      log_info!("{} {}", t::path(&f.file), state);
    }
  })
}
