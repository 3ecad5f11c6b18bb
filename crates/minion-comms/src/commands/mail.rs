use anyhow::Result;
use clap::Args;

use crate::commands::Output;
use crate::commands::agents::AgentArg;
use crate::config::AppContext;
use crate::mailbox::{self, InboxMessage};
use crate::model::FlagKey;
use crate::utils::log::t;
use crate::{log_info, log_success, log_warn};

#[derive(Debug, Args)]
pub struct SendArgs {
  #[arg(long = "from")]
  pub from: String,
  /// Recipient, or `all` to broadcast
  #[arg(long)]
  pub to: String,
  #[arg(long)]
  pub message: String,
  /// Extra recipients, comma-separated
  #[arg(long, value_delimiter = ',')]
  pub cc: Vec<String>,
}

pub fn send(ctx: &AppContext, out: Output, args: &SendArgs) -> Result<()> {
  let res = mailbox::send(ctx, &args.from, &args.to, &args.message, &args.cc)?;
  out.emit(&res, |r| {
    log_success!("Sent #{} {} -> {}", r.id, r.from, r.to);
    if !r.cc.is_empty() {
      log_info!("  cc: {}", r.cc.join(", "));
    }
    if !r.triggers.is_empty() {
      log_warn!("Trigger words: {}", r.triggers.join(", "));
    }
    if let Some(reminder) = r.reminder {
      log_info!("{}", reminder);
    }
  })
}

fn render_message(m: &InboxMessage) {
  log_info!(
    "{} {} -> {} at {}",
    t::id(format!("#{}", m.message.id)),
    t::name(&m.message.from_agent),
    m.message.to_agent,
    m.message.timestamp.format("%Y-%m-%d %H:%M:%S")
  );
  if let Some(note) = &m.cc_note {
    log_info!("  {}", note);
  }
  match &m.content {
    Some(body) => log_info!("{}", body),
    None => log_warn!("(content missing: {})", m.message.content_file),
  }
}

pub fn check_inbox(ctx: &AppContext, out: Output, args: &AgentArg) -> Result<()> {
  let inbox = mailbox::check_inbox(ctx, &args.agent)?;
  out.emit(&inbox, |i| {
    if i.messages.is_empty() {
      log_info!("No new messages.");
    }
    for m in &i.messages {
      render_message(m);
    }
    if let Some(warning) = &i.warning {
      log_warn!("{}", warning);
    }
  })
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
  /// Number of messages (defaults to `[history] default_count`)
  #[arg(long)]
  pub count: Option<usize>,
}

pub fn get_history(ctx: &AppContext, out: Output, args: &HistoryArgs) -> Result<()> {
  let count = args.count.unwrap_or_else(|| ctx.config.history_count());
  let messages = mailbox::get_history(ctx, count)?;
  out.emit(&messages, |list| {
    for m in list {
      render_message(m);
    }
  })
}

#[derive(Debug, Args)]
pub struct PurgeArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long, default_value_t = 2)]
  pub older_than_hours: i64,
}

pub fn purge_inbox(ctx: &AppContext, out: Output, args: &PurgeArgs) -> Result<()> {
  let res = mailbox::purge_inbox(ctx, &args.agent, args.older_than_hours)?;
  out.emit(&res, |r| {
    log_success!(
      "Purged {} message(s), dismissed {} broadcast(s)",
      r.deleted_direct,
      r.dismissed_broadcasts
    );
  })
}

pub fn get_triggers(out: Output) -> Result<()> {
  out.emit(&mailbox::get_triggers(), |words| {
    for w in *words {
      log_info!("{}  {}", t::id(w.word), w.meaning);
    }
  })
}

#[derive(Debug, Args)]
pub struct ClearFlagArgs {
  #[arg(long)]
  pub agent: String,
  pub flag: FlagKey,
}

pub fn clear_flag(ctx: &AppContext, out: Output, args: &ClearFlagArgs) -> Result<()> {
  let res = mailbox::clear_flag(ctx, &args.agent, args.flag)?;
  out.emit(&res, |r| {
    log_info!("{}: {:?}", r.flag, r.status);
  })
}

pub fn stand_down(ctx: &AppContext, out: Output, args: &AgentArg) -> Result<()> {
  let res = mailbox::stand_down(ctx, &args.agent)?;
  out.emit(&res, |r| {
    log_warn!("{} set by {}", r.flag, r.by);
  })
}
