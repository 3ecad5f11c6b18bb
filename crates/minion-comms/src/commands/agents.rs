use anyhow::Result;
use clap::Args;

use crate::commands::Output;
use crate::config::AppContext;
use crate::model::{AgentClass, Transport};
use crate::registry::{self, HpReading};
use crate::utils::log::t;
use crate::utils::term::print_table;
use crate::{log_info, log_success, log_warn};

#[derive(Debug, Args)]
pub struct RegisterArgs {
  #[arg(long)]
  pub name: String,
  #[arg(long = "class", default_value = "coder")]
  pub class: AgentClass,
  #[arg(long)]
  pub model: Option<String>,
  #[arg(long)]
  pub description: Option<String>,
  #[arg(long, default_value = "terminal")]
  pub transport: Transport,
}

pub fn register(ctx: &AppContext, out: Output, args: &RegisterArgs) -> Result<()> {
  let res = registry::register(
    ctx,
    &args.name,
    args.class,
    args.model.as_deref(),
    args.description.as_deref(),
    args.transport,
  )?;
  out.emit(&res, |r| {
    log_success!("Registered {} as {}", r.agent, r.class);
    if let Some(text) = &r.onboarding {
      log_info!("{}", text);
    }
    for step in &r.playbook {
      log_info!("  - {}", step);
    }
  })
}

#[derive(Debug, Args)]
pub struct AgentArg {
  /// Agent name
  #[arg(long)]
  pub agent: String,
}

pub fn deregister(ctx: &AppContext, out: Output, args: &AgentArg) -> Result<()> {
  let res = registry::deregister(ctx, &args.agent)?;
  out.emit(&res, |r| {
    log_success!(
      "Deregistered {} ({} claim(s) released)",
      r.agent,
      r.released_claims
    );
    for note in &r.waitlist_notify {
      log_info!("  {}", note);
    }
  })
}

#[derive(Debug, Args)]
pub struct RenameArgs {
  /// Lead performing the rename
  #[arg(long)]
  pub agent: String,
  pub old: String,
  pub new: String,
}

pub fn rename(ctx: &AppContext, out: Output, args: &RenameArgs) -> Result<()> {
  let res = registry::rename(ctx, &args.agent, &args.old, &args.new)?;
  out.emit(&res, |r| {
    log_success!("Renamed {} -> {}", r.old, r.new);
  })
}

#[derive(Debug, Args)]
pub struct SetStatusArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub status: String,
}

pub fn set_status(ctx: &AppContext, out: Output, args: &SetStatusArgs) -> Result<()> {
  let res = registry::set_status(ctx, &args.agent, &args.status)?;
  out.emit(&res, |r| {
    log_info!("{}: {}", t::name(&r.agent), r.new_status);
  })
}

#[derive(Debug, Args)]
pub struct SetContextArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub context: String,
  #[arg(long)]
  pub tokens_used: Option<i64>,
  #[arg(long)]
  pub tokens_limit: Option<i64>,
}

pub fn set_context(ctx: &AppContext, out: Output, args: &SetContextArgs) -> Result<()> {
  let res = registry::set_context(
    ctx,
    &args.agent,
    &args.context,
    args.tokens_used,
    args.tokens_limit,
  )?;
  out.emit(&res, |r| {
    log_success!("Context updated for {}", r.agent);
    if let Some(hp) = &r.hp {
      log_info!("{}", hp);
    }
  })
}

pub fn who(ctx: &AppContext, out: Output) -> Result<()> {
  let agents = registry::who(ctx)?;
  out.emit(&agents, |list| {
    if list.is_empty() {
      log_info!("No agents registered.");
      return;
    }
    let rows: Vec<Vec<String>> = list
      .iter()
      .map(|v| {
        let stale = if v.context_stale {
          t::warn("stale")
        } else {
          t::ok("fresh")
        };
        vec![
          t::name(&v.agent.name),
          v.agent.agent_class.to_string(),
          v.agent.status.clone().unwrap_or_default(),
          v.agent.current_zone.clone().unwrap_or_default(),
          v.hp.clone(),
          stale,
          format!("{}m", v.last_seen_mins_ago),
        ]
      })
      .collect();
    print_table(
      &["NAME", "CLASS", "STATUS", "ZONE", "HP", "CONTEXT", "SEEN"],
      &rows,
    );
  })
}

#[derive(Debug, Args)]
pub struct UpdateHpArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub input_tokens: i64,
  #[arg(long)]
  pub output_tokens: i64,
  #[arg(long)]
  pub limit: i64,
  #[arg(long)]
  pub turn_input: Option<i64>,
  #[arg(long)]
  pub turn_output: Option<i64>,
}

pub fn update_hp(ctx: &AppContext, out: Output, args: &UpdateHpArgs) -> Result<()> {
  let reading = HpReading {
    input_tokens: args.input_tokens,
    output_tokens: args.output_tokens,
    limit: args.limit,
    turn_input: args.turn_input,
    turn_output: args.turn_output,
  };
  let res = registry::update_hp(ctx, &args.agent, reading)?;
  out.emit(&res, |r| {
    log_info!("{}: {}", t::name(&r.agent), r.hp);
    for alert in &r.alerts {
      log_warn!("HP dropped below {}%", alert);
    }
  })
}

#[derive(Debug, Args)]
pub struct HandOffZoneArgs {
  #[arg(long)]
  pub agent: String,
  /// Receiving agents, comma-separated
  #[arg(long, value_delimiter = ',', required = true)]
  pub to: Vec<String>,
  #[arg(long)]
  pub zone: String,
}

pub fn hand_off_zone(ctx: &AppContext, out: Output, args: &HandOffZoneArgs) -> Result<()> {
  let res = registry::hand_off_zone(ctx, &args.agent, &args.to, &args.zone)?;
  out.emit(&res, |r| {
    log_success!("Zone {} handed to {}", r.zone, r.to.join(", "));
  })
}

#[derive(Debug, Args)]
pub struct RetireArgs {
  /// Lead issuing the retirement
  #[arg(long)]
  pub agent: String,
  pub target: String,
}

pub fn retire_agent(ctx: &AppContext, out: Output, args: &RetireArgs) -> Result<()> {
  let res = registry::retire_agent(ctx, &args.agent, &args.target)?;
  out.emit(&res, |r| {
    log_success!("Retired {}", r.agent);
  })
}

pub fn pending_signal(ctx: &AppContext, out: Output, args: &AgentArg) -> Result<()> {
  let res = registry::pending_signal(ctx, &args.agent)?;
  out.emit(&res, |r| match r.signal {
    Some(signal) => log_warn!("{}: {:?}", r.agent, signal),
    None => log_info!("{}: no signal", r.agent),
  })
}
