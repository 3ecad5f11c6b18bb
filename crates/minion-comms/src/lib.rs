//! Coordination core for a crew of cooperating agents.
//!
//! Every operation is a free function taking an [`config::AppContext`] and
//! running as one store transaction. The `minion` binary is a thin clap
//! front-end over them.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

pub mod auth;
pub mod claims;
mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod hp;
pub mod lifecycle;
pub mod mailbox;
pub mod model;
pub mod monitoring;
pub mod registry;
pub mod store;
pub mod tasks;
pub mod triggers;
pub mod utils;
pub mod warroom;

use crate::auth::Operation;
use crate::commands::Output;
use crate::commands::agents::{
  AgentArg, HandOffZoneArgs, RegisterArgs, RenameArgs, RetireArgs, SetContextArgs, SetStatusArgs,
  UpdateHpArgs,
};
use crate::commands::claims::{ClaimArgs, GetClaimsArgs, ReleaseArgs};
use crate::commands::lifecycle::{DebriefArgs, FenixDownArgs};
use crate::commands::mail::{ClearFlagArgs, HistoryArgs, PurgeArgs, SendArgs};
use crate::commands::monitor::FreshnessArgs;
use crate::commands::tasks::{
  AgentTaskArgs, AssignArgs, CompleteArgs, CreateArgs, ListArgs, SubmitArgs, TaskIdArg, UpdateArgs,
};
use crate::commands::tools::ToolsArgs;
use crate::commands::war_room::{GetPlanArgs, GetRaidLogArgs, LogRaidArgs, SetPlanArgs, UpdatePlanArgs};
use crate::config::{AppContext, ENV_CLASS};
use crate::model::AgentClass;

/// Minion - coordinate a crew of agents through one shared store.
#[derive(Debug, Parser)]
#[command(name = "minion", author, version, about, long_about = None)]
pub struct Cli {
  /// Render results for people instead of as JSON
  #[arg(long, global = true)]
  pub human: bool,
  /// Debug logging on stderr
  #[arg(short, long, global = true)]
  pub verbose: bool,
  #[command(subcommand)]
  command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
  /// Register or refresh an agent
  Register(RegisterArgs),
  /// Remove an agent and release its claims
  Deregister(AgentArg),
  /// Rename an agent (lead)
  Rename(RenameArgs),
  /// Set an agent's free-text status
  SetStatus(SetStatusArgs),
  /// Refresh an agent's context summary
  SetContext(SetContextArgs),
  /// List agents
  Who,
  /// Record token telemetry
  UpdateHp(UpdateHpArgs),
  /// Hand a zone to other agents
  HandOffZone(HandOffZoneArgs),
  /// Retire an agent (lead)
  RetireAgent(RetireArgs),
  /// Show the signal waiting for an agent
  PendingSignal(AgentArg),
  /// Send a message
  Send(SendArgs),
  /// Read and drain an inbox
  CheckInbox(AgentArg),
  /// Recent messages across the crew
  GetHistory(HistoryArgs),
  /// Delete old inbox messages
  PurgeInbox(PurgeArgs),
  /// Show the trigger-word codebook
  GetTriggers,
  /// Clear a process-wide flag (lead)
  ClearFlag(ClearFlagArgs),
  /// Order every agent to stop (lead)
  StandDown(AgentArg),
  /// Claim a file for editing
  ClaimFile(ClaimArgs),
  /// Release a file claim
  ReleaseFile(ReleaseArgs),
  /// List file claims
  GetClaims(GetClaimsArgs),
  /// Set the battle plan (lead)
  SetBattlePlan(SetPlanArgs),
  /// Show battle plans
  GetBattlePlan(GetPlanArgs),
  /// Change a battle plan's status (lead)
  UpdateBattlePlanStatus(UpdatePlanArgs),
  /// Append to the raid log
  LogRaid(LogRaidArgs),
  /// Show the raid log
  GetRaidLog(GetRaidLogArgs),
  /// Create a task (lead)
  CreateTask(CreateArgs),
  /// Assign a task (lead)
  AssignTask(AssignArgs),
  /// Record task progress
  UpdateTask(UpdateArgs),
  /// List tasks
  GetTasks(ListArgs),
  /// Show one task
  GetTask(TaskIdArg),
  /// Attach a result file to a task
  SubmitResult(SubmitArgs),
  /// Close a task (lead)
  CloseTask(AgentTaskArgs),
  /// Take a task for the current stage
  PullTask(AgentTaskArgs),
  /// Advance a task to the next stage
  CompleteTask(CompleteArgs),
  /// Agents with claims and tasks (lead)
  PartyStatus(AgentArg),
  /// Crew-wide situation report
  Sitrep,
  /// How recently an agent did anything
  CheckActivity(AgentArg),
  /// Files changed since an agent's last context update (lead)
  CheckFreshness(FreshnessArgs),
  /// Record notes written before a context reset
  FenixDown(FenixDownArgs),
  /// Briefing to resume after a context reset
  ColdStart(AgentArg),
  /// File the session debrief (lead)
  Debrief(DebriefArgs),
  /// Complete the battle plan and stand everyone down (lead)
  EndSession(AgentArg),
  /// Operations available per class
  Tools(ToolsArgs),
}

impl Commands {
  fn operation(&self) -> Operation {
    match self {
      Commands::Register(_) => Operation::Register,
      Commands::Deregister(_) => Operation::Deregister,
      Commands::Rename(_) => Operation::Rename,
      Commands::SetStatus(_) => Operation::SetStatus,
      Commands::SetContext(_) => Operation::SetContext,
      Commands::Who => Operation::Who,
      Commands::UpdateHp(_) => Operation::UpdateHp,
      Commands::HandOffZone(_) => Operation::HandOffZone,
      Commands::RetireAgent(_) => Operation::RetireAgent,
      Commands::PendingSignal(_) => Operation::PendingSignal,
      Commands::Send(_) => Operation::Send,
      Commands::CheckInbox(_) => Operation::CheckInbox,
      Commands::GetHistory(_) => Operation::GetHistory,
      Commands::PurgeInbox(_) => Operation::PurgeInbox,
      Commands::GetTriggers => Operation::GetTriggers,
      Commands::ClearFlag(_) => Operation::ClearFlag,
      Commands::StandDown(_) => Operation::StandDown,
      Commands::ClaimFile(_) => Operation::ClaimFile,
      Commands::ReleaseFile(a) if a.force => Operation::ForceRelease,
      Commands::ReleaseFile(_) => Operation::ReleaseFile,
      Commands::GetClaims(_) => Operation::GetClaims,
      Commands::SetBattlePlan(_) => Operation::SetBattlePlan,
      Commands::GetBattlePlan(_) => Operation::GetBattlePlan,
      Commands::UpdateBattlePlanStatus(_) => Operation::UpdateBattlePlanStatus,
      Commands::LogRaid(_) => Operation::LogRaid,
      Commands::GetRaidLog(_) => Operation::GetRaidLog,
      Commands::CreateTask(_) => Operation::CreateTask,
      Commands::AssignTask(_) => Operation::AssignTask,
      Commands::UpdateTask(_) => Operation::UpdateTask,
      Commands::GetTasks(_) => Operation::GetTasks,
      Commands::GetTask(_) => Operation::GetTask,
      Commands::SubmitResult(_) => Operation::SubmitResult,
      Commands::CloseTask(_) => Operation::CloseTask,
      Commands::PullTask(_) => Operation::PullTask,
      Commands::CompleteTask(_) => Operation::CompleteTask,
      Commands::PartyStatus(_) => Operation::PartyStatus,
      Commands::Sitrep => Operation::Sitrep,
      Commands::CheckActivity(_) => Operation::CheckActivity,
      Commands::CheckFreshness(_) => Operation::CheckFreshness,
      Commands::FenixDown(_) => Operation::FenixDown,
      Commands::ColdStart(_) => Operation::ColdStart,
      Commands::Debrief(_) => Operation::Debrief,
      Commands::EndSession(_) => Operation::EndSession,
      Commands::Tools(_) => Operation::Tools,
    }
  }
}

#[must_use]
pub fn parse() -> Cli {
  Cli::parse()
}

/// Class from `MINION_CLASS`, if the front-end was launched with one.
fn session_class() -> Result<Option<AgentClass>> {
  match std::env::var(ENV_CLASS) {
    Ok(raw) if !raw.trim().is_empty() => Ok(Some(
      raw
        .trim()
        .parse()
        .with_context(|| format!("invalid {ENV_CLASS}"))?,
    )),
    _ => Ok(None),
  }
}

pub fn run(cli: Cli) -> Result<()> {
  let out = Output { human: cli.human };
  let class = session_class()?;
  let op = cli.command.operation();
  if let Some(class) = class {
    auth::check_class(&format!("{class} session"), class, op)?;
  }
  log::debug!("dispatching {op}");

  // Static listings need no store.
  match &cli.command {
    Commands::Tools(args) => return commands::tools::run(out, args.class.or(class)),
    Commands::GetTriggers => return commands::mail::get_triggers(out),
    _ => {}
  }

  let cwd = std::env::current_dir()?;
  let ctx = AppContext::from_cwd(&cwd)?;
  dispatch(&ctx, &cwd, out, &cli.command)
}

fn dispatch(ctx: &AppContext, cwd: &std::path::Path, out: Output, command: &Commands) -> Result<()> {
  use crate::commands::{agents, claims, lifecycle, mail, monitor, tasks, war_room};

  match command {
    Commands::Register(a) => agents::register(ctx, out, a),
    Commands::Deregister(a) => agents::deregister(ctx, out, a),
    Commands::Rename(a) => agents::rename(ctx, out, a),
    Commands::SetStatus(a) => agents::set_status(ctx, out, a),
    Commands::SetContext(a) => agents::set_context(ctx, out, a),
    Commands::Who => agents::who(ctx, out),
    Commands::UpdateHp(a) => agents::update_hp(ctx, out, a),
    Commands::HandOffZone(a) => agents::hand_off_zone(ctx, out, a),
    Commands::RetireAgent(a) => agents::retire_agent(ctx, out, a),
    Commands::PendingSignal(a) => agents::pending_signal(ctx, out, a),
    Commands::Send(a) => mail::send(ctx, out, a),
    Commands::CheckInbox(a) => mail::check_inbox(ctx, out, a),
    Commands::GetHistory(a) => mail::get_history(ctx, out, a),
    Commands::PurgeInbox(a) => mail::purge_inbox(ctx, out, a),
    Commands::GetTriggers => mail::get_triggers(out),
    Commands::ClearFlag(a) => mail::clear_flag(ctx, out, a),
    Commands::StandDown(a) => mail::stand_down(ctx, out, a),
    Commands::ClaimFile(a) => claims::claim_file(ctx, out, a),
    Commands::ReleaseFile(a) => claims::release_file(ctx, out, a),
    Commands::GetClaims(a) => claims::get_claims(ctx, out, a),
    Commands::SetBattlePlan(a) => war_room::set_battle_plan(ctx, out, a),
    Commands::GetBattlePlan(a) => war_room::get_battle_plan(ctx, out, a),
    Commands::UpdateBattlePlanStatus(a) => war_room::update_battle_plan_status(ctx, out, a),
    Commands::LogRaid(a) => war_room::log_raid(ctx, out, a),
    Commands::GetRaidLog(a) => war_room::get_raid_log(ctx, out, a),
    Commands::CreateTask(a) => tasks::create_task(ctx, cwd, out, a),
    Commands::AssignTask(a) => tasks::assign_task(ctx, out, a),
    Commands::UpdateTask(a) => tasks::update_task(ctx, out, a),
    Commands::GetTasks(a) => tasks::get_tasks(ctx, out, a),
    Commands::GetTask(a) => tasks::get_task(ctx, out, a),
    Commands::SubmitResult(a) => tasks::submit_result(ctx, cwd, out, a),
    Commands::CloseTask(a) => tasks::close_task(ctx, out, a),
    Commands::PullTask(a) => tasks::pull_task(ctx, out, a),
    Commands::CompleteTask(a) => tasks::complete_task(ctx, out, a),
    Commands::PartyStatus(a) => monitor::party_status(ctx, out, a),
    Commands::Sitrep => monitor::sitrep(ctx, out),
    Commands::CheckActivity(a) => monitor::check_activity(ctx, out, a),
    Commands::CheckFreshness(a) => monitor::check_freshness(ctx, out, a),
    Commands::FenixDown(a) => lifecycle::fenix_down(ctx, out, a),
    Commands::ColdStart(a) => lifecycle::cold_start(ctx, out, a),
    Commands::Debrief(a) => lifecycle::debrief(ctx, cwd, out, a),
    Commands::EndSession(a) => lifecycle::end_session(ctx, out, a),
    Commands::Tools(a) => commands::tools::run(out, a.class),
  }
}
