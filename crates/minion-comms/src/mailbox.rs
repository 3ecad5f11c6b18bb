//! Message delivery: send-time gates, inbox draining, broadcast receipts and
//! trigger-word flags.

use chrono::TimeDelta;
use log::{debug, info};
use rusqlite::{Transaction, params};
use serde::Serialize;

use crate::auth::{self, Operation};
use crate::config::AppContext;
use crate::content;
use crate::error::{CommsError, Result};
use crate::model::{AgentClass, BROADCAST, FlagKey, Message, Transport};
use crate::registry::{staleness_message, validate_name};
use crate::store::time::{format_ts, now};
use crate::store::{active_plan_count, find_agent, flag, lead_name, set_flag, touch_agent};
use crate::triggers::{self, TRIGGER_WORDS, TriggerWord};
use crate::utils::error_messages;

const TERMINAL_REMINDER: &str = "Poll check-inbox regularly so you don't miss replies.";

pub(crate) fn unread_count(tx: &Transaction<'_>, agent: &str) -> Result<i64> {
  let direct: i64 = tx.query_row(
    "SELECT COUNT(*) FROM messages WHERE to_agent = ?1 AND read_flag = 0",
    params![agent],
    |row| row.get(0),
  )?;
  let broadcast: i64 = tx.query_row(
    "SELECT COUNT(*) FROM messages
     WHERE to_agent = ?1 AND from_agent != ?2
       AND id NOT IN (SELECT message_id FROM broadcast_reads WHERE agent_name = ?2)",
    params![BROADCAST, agent],
    |row| row.get(0),
  )?;
  Ok(direct + broadcast)
}

fn insert_message(
  tx: &Transaction<'_>,
  from: &str,
  to: &str,
  reference: &str,
  stamp: &str,
  cc_original_to: Option<&str>,
) -> Result<i64> {
  tx.execute(
    "INSERT INTO messages (from_agent, to_agent, content_file, timestamp, read_flag, is_cc, cc_original_to)
     VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
    params![from, to, reference, stamp, cc_original_to.is_some(), cc_original_to],
  )?;
  Ok(tx.last_insert_rowid())
}

#[derive(Debug, Clone, Serialize)]
pub struct Sent {
  pub status: &'static str,
  pub id: i64,
  pub from: String,
  pub to: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub cc: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub triggers: Vec<&'static str>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub flags_set: Vec<FlagKey>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reminder: Option<&'static str>,
}

/// Send `body` from `from` to `to` (an agent or `all`), copying `cc`.
///
/// Gates, in order: the sender has no unread mail, a battle plan is active,
/// the sender's context is fresh. Unknown senders are registered as coders.
pub fn send(ctx: &AppContext, from: &str, to: &str, body: &str, cc: &[String]) -> Result<Sent> {
  debug!("send {from} -> {to}");
  validate_name(from)?;
  if to != BROADCAST {
    validate_name(to)?;
  }
  let mut cc_list: Vec<String> = Vec::new();
  for name in cc.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
    validate_name(name)?;
    if !cc_list.iter().any(|c| c == name) {
      cc_list.push(name.to_string());
    }
  }

  let sent = ctx.store.write(|tx| {
    let unread = unread_count(tx, from)?;
    if unread > 0 {
      return Err(CommsError::Blocked(error_messages::unread_messages(unread)));
    }
    if active_plan_count(tx)? != 1 {
      return Err(CommsError::Blocked(error_messages::NO_ACTIVE_PLAN.to_string()));
    }

    let at = now();
    let stamp = format_ts(at);
    let sender = find_agent(tx, from)?;
    if let Some(agent) = &sender
      && let Some(msg) = staleness_message(agent, at)
    {
      return Err(CommsError::Blocked(msg));
    }
    if sender.is_none() {
      tx.execute(
        "INSERT OR IGNORE INTO agents (name, agent_class, transport, registered_at, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![from, AgentClass::Coder, Transport::Terminal, stamp],
      )?;
      info!("auto-registered sender {from} as coder");
    }

    let reference = content::inbox_ref(to, from, false, at);
    ctx.content.write(&reference, body.as_bytes())?;
    let id = insert_message(tx, from, to, &reference, &stamp, None)?;

    if to != BROADCAST
      && let Some(lead) = lead_name(tx)?
      && lead != from
      && lead != to
      && !cc_list.contains(&lead)
    {
      cc_list.push(lead);
    }
    let mut delivered = Vec::new();
    for name in cc_list.iter().filter(|c| c.as_str() != to) {
      let cc_ref = content::inbox_ref(name, from, true, at);
      ctx.content.write(&cc_ref, body.as_bytes())?;
      insert_message(tx, from, name, &cc_ref, &stamp, Some(to))?;
      delivered.push(name.clone());
    }

    touch_agent(tx, from, at)?;

    let found = triggers::scan(body);
    let mut flags_set = Vec::new();
    for key in found.iter().filter_map(|word| triggers::flag_for(word)) {
      set_flag(tx, key, from, at)?;
      flags_set.push(key);
    }

    let transport = match &sender {
      Some(agent) => agent.transport,
      None => Transport::Terminal,
    };
    Ok(Sent {
      status: "sent",
      id,
      from: from.to_string(),
      to: to.to_string(),
      cc: delivered,
      triggers: found,
      flags_set,
      reminder: (transport == Transport::Terminal).then_some(TERMINAL_REMINDER),
    })
  })?;
  for key in &sent.flags_set {
    info!("{from} raised flag {key}");
  }
  Ok(sent)
}

/// A message with its body resolved from the content store.
#[derive(Debug, Clone, Serialize)]
pub struct InboxMessage {
  #[serde(flatten)]
  pub message: Message,
  pub content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cc_note: Option<String>,
}

impl InboxMessage {
  pub(crate) fn resolve(ctx: &AppContext, message: Message) -> Self {
    let cc_note = message.is_cc.then(|| {
      format!(
        "[CC] originally to: {}",
        message.cc_original_to.as_deref().unwrap_or("unknown")
      )
    });
    Self {
      content: content::read_or_warn(ctx.content.as_ref(), &message.content_file),
      cc_note,
      message,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Inbox {
  pub messages: Vec<InboxMessage>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub warning: Option<String>,
}

fn query_messages(
  tx: &Transaction<'_>,
  sql_where: &str,
  args: impl rusqlite::Params,
) -> Result<Vec<Message>> {
  let sql = format!("SELECT {} FROM messages WHERE {sql_where}", Message::COLUMNS);
  let mut stmt = tx.prepare(&sql)?;
  let rows = stmt.query_map(args, Message::from_row)?;
  Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Drain the agent's unread direct mail and unseen broadcasts, oldest first.
pub fn check_inbox(ctx: &AppContext, agent: &str) -> Result<Inbox> {
  debug!("check inbox for {agent}");
  let (mut messages, warning) = ctx.store.write(|tx| {
    let at = now();
    let stamp = format_ts(at);
    tx.execute(
      "UPDATE agents SET last_seen = ?1, last_inbox_check = ?1 WHERE name = ?2",
      params![stamp, agent],
    )?;

    let mut messages = query_messages(tx, "to_agent = ?1 AND read_flag = 0", params![agent])?;
    tx.execute(
      "UPDATE messages SET read_flag = 1 WHERE to_agent = ?1 AND read_flag = 0",
      params![agent],
    )?;

    let broadcasts = query_messages(
      tx,
      "to_agent = ?1 AND id NOT IN (SELECT message_id FROM broadcast_reads WHERE agent_name = ?2)",
      params![BROADCAST, agent],
    )?;
    for message in &broadcasts {
      tx.execute(
        "INSERT OR IGNORE INTO broadcast_reads (agent_name, message_id) VALUES (?1, ?2)",
        params![agent, message.id],
      )?;
    }
    messages.extend(broadcasts);

    let warning = find_agent(tx, agent)?.and_then(|a| staleness_message(&a, at));
    Ok((messages, warning))
  })?;
  messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

  Ok(Inbox {
    messages: messages
      .into_iter()
      .map(|m| InboxMessage::resolve(ctx, m))
      .collect(),
    warning,
  })
}

pub(crate) fn recent_messages(tx: &Transaction<'_>, count: usize) -> Result<Vec<Message>> {
  let limit = i64::try_from(count).unwrap_or(i64::MAX);
  let mut messages =
    query_messages(tx, "1 = 1 ORDER BY timestamp DESC, id DESC LIMIT ?1", params![limit])?;
  messages.reverse();
  Ok(messages)
}

/// The most recent `count` messages system-wide, in chronological order.
pub fn get_history(ctx: &AppContext, count: usize) -> Result<Vec<InboxMessage>> {
  let messages = ctx.store.read(|tx| recent_messages(tx, count))?;
  Ok(
    messages
      .into_iter()
      .map(|m| InboxMessage::resolve(ctx, m))
      .collect(),
  )
}

#[derive(Debug, Clone, Serialize)]
pub struct Purged {
  pub status: &'static str,
  pub agent: String,
  pub deleted_direct: usize,
  pub dismissed_broadcasts: usize,
  pub older_than_hours: i64,
}

/// Delete the agent's direct mail older than the cutoff and dismiss old
/// broadcasts. Message bodies stay in the content store.
pub fn purge_inbox(ctx: &AppContext, agent: &str, older_than_hours: i64) -> Result<Purged> {
  let cutoff = (older_than_hours >= 0)
    .then(|| TimeDelta::try_hours(older_than_hours))
    .flatten()
    .and_then(|window| now().checked_sub_signed(window))
    .map(format_ts)
    .ok_or_else(|| CommsError::Invalid(error_messages::purge_window_invalid(older_than_hours)))?;
  let (deleted_direct, dismissed_broadcasts) = ctx.store.write(|tx| {
    let deleted = tx.execute(
      "DELETE FROM messages WHERE to_agent = ?1 AND timestamp < ?2",
      params![agent, cutoff],
    )?;
    let dismissed = tx.execute(
      "INSERT OR IGNORE INTO broadcast_reads (agent_name, message_id)
       SELECT ?1, id FROM messages WHERE to_agent = ?2 AND timestamp < ?3",
      params![agent, BROADCAST, cutoff],
    )?;
    tx.execute(
      "DELETE FROM broadcast_reads WHERE message_id NOT IN (SELECT id FROM messages)",
      [],
    )?;
    Ok((deleted, dismissed))
  })?;
  info!("purged {deleted_direct} message(s) for {agent}");
  Ok(Purged {
    status: "purged",
    agent: agent.to_string(),
    deleted_direct,
    dismissed_broadcasts,
    older_than_hours,
  })
}

/// The trigger-word codebook.
#[must_use]
pub fn get_triggers() -> &'static [TriggerWord] {
  TRIGGER_WORDS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagChange {
  Set,
  Cleared,
  Noop,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlagUpdated {
  pub status: FlagChange,
  pub flag: FlagKey,
  pub by: String,
}

/// Clear a process-wide flag.
pub fn clear_flag(ctx: &AppContext, caller: &str, key: FlagKey) -> Result<FlagUpdated> {
  let status = ctx.store.write(|tx| {
    auth::authorize(tx, caller, Operation::ClearFlag)?;
    if flag(tx, key)?.is_none() {
      return Ok(FlagChange::Noop);
    }
    tx.execute("DELETE FROM flags WHERE key = ?1", params![key])?;
    Ok(FlagChange::Cleared)
  })?;
  if status == FlagChange::Cleared {
    info!("{caller} cleared flag {key}");
  }
  Ok(FlagUpdated {
    status,
    flag: key,
    by: caller.to_string(),
  })
}

/// Tell every agent to stop work.
pub fn stand_down(ctx: &AppContext, caller: &str) -> Result<FlagUpdated> {
  ctx.store.write(|tx| {
    auth::authorize(tx, caller, Operation::StandDown)?;
    set_flag(tx, FlagKey::StandDown, caller, now())
  })?;
  info!("{caller} ordered stand_down");
  Ok(FlagUpdated {
    status: FlagChange::Set,
    flag: FlagKey::StandDown,
    by: caller.to_string(),
  })
}
