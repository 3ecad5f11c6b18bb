//! Agent lifecycle and liveness bookkeeping.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use regex::Regex;
use rusqlite::{Transaction, params};
use serde::Serialize;

use crate::auth::{self, Operation};
use crate::config::AppContext;
use crate::error::{CommsError, Result};
use crate::hp;
use crate::model::{Agent, AgentClass, BROADCAST, FlagKey, RaidPriority, Transport, encode_alerts};
use crate::store::time::{format_ts, minutes_between, now};
use crate::store::{find_agent, flag, require_agent, retire_flag_exists};
use crate::triggers::{TRIGGER_WORDS, TriggerWord};
use crate::utils::error_messages;
use crate::warroom;

/// Broadcasts older than this are marked read when an agent (re-)registers.
const BROADCAST_GRACE_HOURS: i64 = 1;

const DEFAULT_STATUS: &str = "waiting for work";

static NAME_RE: OnceLock<Regex> = OnceLock::new();

pub(crate) fn validate_name(name: &str) -> Result<()> {
  let re = NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid regex"));
  if name == BROADCAST || !re.is_match(name) {
    return Err(CommsError::Invalid(error_messages::invalid_agent_name(name)));
  }
  Ok(())
}

/// Context freshness judged against the class threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Staleness {
  Fresh,
  NeverSet,
  Stale { age_mins: i64 },
}

pub(crate) fn staleness(agent: &Agent, now: DateTime<Utc>) -> Staleness {
  let threshold = auth::staleness_threshold_mins(agent.agent_class);
  match agent.context_updated_at {
    None => Staleness::NeverSet,
    Some(updated) if (now - updated).num_seconds() > threshold * 60 => Staleness::Stale {
      age_mins: minutes_between(updated, now),
    },
    Some(_) => Staleness::Fresh,
  }
}

/// Message explaining why the agent's context is stale, if it is.
pub(crate) fn staleness_message(agent: &Agent, now: DateTime<Utc>) -> Option<String> {
  let threshold = auth::staleness_threshold_mins(agent.agent_class);
  match staleness(agent, now) {
    Staleness::Fresh => None,
    Staleness::NeverSet => Some(error_messages::context_never_set(
      agent.agent_class,
      threshold,
    )),
    Staleness::Stale { age_mins } => Some(error_messages::context_stale(
      age_mins,
      threshold,
      agent.agent_class,
    )),
  }
}

/// Agent row plus derived liveness fields.
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
  #[serde(flatten)]
  pub agent: Agent,
  pub hp: String,
  pub context_stale: bool,
  pub last_seen_mins_ago: i64,
}

impl AgentView {
  pub(crate) fn new(agent: Agent, now: DateTime<Utc>) -> Self {
    Self {
      hp: hp::agent_summary(&agent),
      context_stale: staleness(&agent, now) != Staleness::Fresh,
      last_seen_mins_ago: minutes_between(agent.last_seen, now),
      agent,
    }
  }
}

pub(crate) fn list_agents(tx: &Transaction<'_>) -> Result<Vec<Agent>> {
  let sql = format!(
    "SELECT {} FROM agents ORDER BY last_seen DESC, name ASC",
    Agent::COLUMNS
  );
  let mut stmt = tx.prepare(&sql)?;
  let rows = stmt.query_map([], Agent::from_row)?;
  Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[derive(Debug, Clone, Serialize)]
pub struct Registered {
  pub status: &'static str,
  pub agent: String,
  pub class: AgentClass,
  pub transport: Transport,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub model: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub onboarding: Option<String>,
  pub tools: Vec<Operation>,
  pub triggers: &'static [TriggerWord],
  pub playbook: Vec<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
  value.filter(|v| !v.trim().is_empty())
}

/// Create or refresh an agent.
///
/// Re-registering keeps identity and zone, resets status, and only replaces
/// model or description when a new non-empty value is given.
pub fn register(
  ctx: &AppContext,
  name: &str,
  class: AgentClass,
  model: Option<&str>,
  description: Option<&str>,
  transport: Transport,
) -> Result<Registered> {
  debug!("register {name} as {class}");
  validate_name(name)?;
  let model = non_empty(model);
  let description = non_empty(description);
  auth::check_model(class, model)?;

  let stored = ctx.store.write(|tx| {
    let at = now();
    let stamp = format_ts(at);
    tx.execute(
      "INSERT INTO agents
         (name, agent_class, model, description, transport, status, registered_at, last_seen)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
       ON CONFLICT(name) DO UPDATE SET
         last_seen   = excluded.last_seen,
         agent_class = excluded.agent_class,
         model       = COALESCE(excluded.model, agents.model),
         description = COALESCE(excluded.description, agents.description),
         transport   = excluded.transport,
         status      = excluded.status",
      params![name, class, model, description, transport, DEFAULT_STATUS, stamp],
    )?;

    let cutoff = format_ts(at - Duration::hours(BROADCAST_GRACE_HOURS));
    tx.execute(
      "INSERT OR IGNORE INTO broadcast_reads (agent_name, message_id)
       SELECT ?1, id FROM messages WHERE to_agent = ?2 AND timestamp < ?3",
      params![name, BROADCAST, cutoff],
    )?;
    tx.execute("DELETE FROM agent_retire WHERE agent_name = ?1", params![name])?;
    require_agent(tx, name)
  })?;
  info!("registered {name} ({class})");

  Ok(Registered {
    status: "registered",
    agent: stored.name,
    class,
    transport,
    model: stored.model,
    description: stored.description,
    onboarding: load_onboarding(ctx, class),
    tools: auth::tools_for_class(class),
    triggers: TRIGGER_WORDS,
    playbook: playbook(name, transport),
  })
}

/// Common protocol plus class protocol from the docs directory, if present.
fn load_onboarding(ctx: &AppContext, class: AgentClass) -> Option<String> {
  let dir = ctx.paths.docs_dir()?;
  let parts: Vec<String> = ["protocol-common.md".to_string(), format!("protocol-{class}.md")]
    .iter()
    .filter_map(|file| std::fs::read_to_string(dir.join(file)).ok())
    .collect();
  if parts.is_empty() {
    None
  } else {
    Some(parts.join("\n\n---\n\n"))
  }
}

fn playbook(name: &str, transport: Transport) -> Vec<String> {
  match transport {
    Transport::Terminal => vec![
      format!("Poll your inbox regularly: minion check-inbox --agent {name}"),
      format!("Set your context: minion set-context --agent {name} --context 'loaded'"),
      "Read before you write: send is blocked while you have unread mail".to_string(),
    ],
    Transport::Daemon => vec![
      "The watcher manages your context and re-injects state after compaction".to_string(),
      format!("Just check inbox and work: minion check-inbox --agent {name}"),
    ],
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Deregistered {
  pub status: &'static str,
  pub agent: String,
  pub released_claims: usize,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub waitlist_notify: Vec<String>,
}

pub(crate) fn deregister_in(tx: &Transaction<'_>, name: &str) -> Result<Deregistered> {
  if find_agent(tx, name)?.is_none() {
    return Err(CommsError::NotFound(error_messages::agent_not_found(name)));
  }

  let claimed: Vec<String> = {
    let mut stmt = tx.prepare("SELECT file_path FROM file_claims WHERE agent_name = ?1")?;
    let rows = stmt.query_map(params![name], |row| row.get(0))?;
    rows.collect::<rusqlite::Result<_>>()?
  };
  let mut notes = Vec::new();
  for path in &claimed {
    tx.execute("DELETE FROM file_claims WHERE file_path = ?1", params![path])?;
    if let Some(waiter) = crate::claims::next_waiter(tx, path, name)? {
      notes.push(format!("{path} -> {waiter} waiting"));
    }
  }
  tx.execute("DELETE FROM file_waitlist WHERE agent_name = ?1", params![name])?;
  tx.execute("DELETE FROM agents WHERE name = ?1", params![name])?;

  Ok(Deregistered {
    status: "deregistered",
    agent: name.to_string(),
    released_claims: claimed.len(),
    waitlist_notify: notes,
  })
}

/// Remove an agent, releasing its claims and leaving every waitlist.
pub fn deregister(ctx: &AppContext, name: &str) -> Result<Deregistered> {
  debug!("deregister {name}");
  let out = ctx.store.write(|tx| deregister_in(tx, name))?;
  info!(
    "deregistered {name}, released {} claim(s)",
    out.released_claims
  );
  Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct Renamed {
  pub status: &'static str,
  pub old: String,
  pub new: String,
}

/// Rename an agent and repoint its mail, broadcast receipts, claims,
/// waitlist places, assigned tasks and unread fenix_down records.
pub fn rename(ctx: &AppContext, caller: &str, old: &str, new: &str) -> Result<Renamed> {
  debug!("rename {old} -> {new} by {caller}");
  validate_name(new)?;
  ctx.store.write(|tx| {
    auth::authorize(tx, caller, Operation::Rename)?;
    if find_agent(tx, old)?.is_none() {
      return Err(CommsError::NotFound(error_messages::agent_not_found(old)));
    }
    if find_agent(tx, new)?.is_some() {
      return Err(CommsError::Blocked(error_messages::agent_exists(new)));
    }
    tx.execute("UPDATE agents SET name = ?1 WHERE name = ?2", params![new, old])?;
    for sql in [
      "UPDATE messages SET from_agent = ?1 WHERE from_agent = ?2",
      "UPDATE messages SET to_agent = ?1 WHERE to_agent = ?2",
      "UPDATE messages SET cc_original_to = ?1 WHERE cc_original_to = ?2",
      "UPDATE broadcast_reads SET agent_name = ?1 WHERE agent_name = ?2",
      "UPDATE file_claims SET agent_name = ?1 WHERE agent_name = ?2",
      "UPDATE file_waitlist SET agent_name = ?1 WHERE agent_name = ?2",
      "UPDATE tasks SET assigned_to = ?1 WHERE assigned_to = ?2",
      "UPDATE fenix_down_records SET agent_name = ?1 WHERE agent_name = ?2",
    ] {
      tx.execute(sql, params![new, old])?;
    }
    Ok(())
  })?;
  info!("renamed {old} -> {new}");
  Ok(Renamed {
    status: "renamed",
    old: old.to_string(),
    new: new.to_string(),
  })
}

fn require_existing(tx: &Transaction<'_>, name: &str) -> Result<Agent> {
  find_agent(tx, name)?.ok_or_else(|| CommsError::NotFound(error_messages::agent_not_found(name)))
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSet {
  pub status: &'static str,
  pub agent: String,
  pub new_status: String,
}

pub fn set_status(ctx: &AppContext, agent: &str, status: &str) -> Result<StatusSet> {
  ctx.store.write(|tx| {
    require_existing(tx, agent)?;
    tx.execute(
      "UPDATE agents SET status = ?1, last_seen = ?2 WHERE name = ?3",
      params![status, format_ts(now()), agent],
    )?;
    Ok(())
  })?;
  Ok(StatusSet {
    status: "ok",
    agent: agent.to_string(),
    new_status: status.to_string(),
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextSet {
  pub status: &'static str,
  pub agent: String,
  pub context: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hp: Option<String>,
}

/// Refresh the context summary. This is what keeps an agent's sends unblocked.
pub fn set_context(
  ctx: &AppContext,
  agent: &str,
  summary: &str,
  tokens_used: Option<i64>,
  tokens_limit: Option<i64>,
) -> Result<ContextSet> {
  ctx.store.write(|tx| {
    require_existing(tx, agent)?;
    let stamp = format_ts(now());
    tx.execute(
      "UPDATE agents SET context_summary = ?1, context_updated_at = ?2, last_seen = ?2
       WHERE name = ?3",
      params![summary, stamp, agent],
    )?;
    Ok(())
  })?;
  let hp = match (tokens_used, tokens_limit) {
    (Some(used), Some(limit)) if used > 0 && limit > 0 => Some(hp::summary(used, Some(limit))),
    _ => None,
  };
  Ok(ContextSet {
    status: "ok",
    agent: agent.to_string(),
    context: summary.to_string(),
    hp,
  })
}

/// All agents, most recently seen first.
pub fn who(ctx: &AppContext) -> Result<Vec<AgentView>> {
  let agents = ctx.store.read(list_agents)?;
  let at = now();
  Ok(
    agents
      .into_iter()
      .map(|agent| AgentView::new(agent, at))
      .collect(),
  )
}

/// Token telemetry as observed by the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HpReading {
  pub input_tokens: i64,
  pub output_tokens: i64,
  pub limit: i64,
  pub turn_input: Option<i64>,
  pub turn_output: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HpUpdated {
  pub status: &'static str,
  pub agent: String,
  pub hp: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub alerts: Vec<u8>,
}

impl HpReading {
  fn validate(&self) -> Result<()> {
    let fields = [
      ("input_tokens", Some(self.input_tokens)),
      ("output_tokens", Some(self.output_tokens)),
      ("limit", Some(self.limit)),
      ("turn_input", self.turn_input),
      ("turn_output", self.turn_output),
    ];
    for (field, value) in fields {
      if let Some(value) = value
        && value < 0
      {
        return Err(CommsError::Invalid(error_messages::hp_reading_invalid(field, value)));
      }
    }
    Ok(())
  }
}

pub fn update_hp(ctx: &AppContext, agent: &str, reading: HpReading) -> Result<HpUpdated> {
  reading.validate()?;
  let fresh = ctx.store.write(|tx| {
    let current = require_existing(tx, agent)?;
    let used = hp::tokens_used(
      Some(reading.input_tokens),
      Some(reading.output_tokens),
      reading.turn_input,
      reading.turn_output,
    );
    let (fired, fresh) =
      hp::evaluate_alerts(hp::percent(used, Some(reading.limit)), &current.hp_alerts_fired);
    tx.execute(
      "UPDATE agents SET hp_input_tokens = ?1, hp_output_tokens = ?2, hp_tokens_limit = ?3,
         hp_turn_input = ?4, hp_turn_output = ?5, hp_updated_at = ?6, hp_alerts_fired = ?7
       WHERE name = ?8",
      params![
        reading.input_tokens,
        reading.output_tokens,
        reading.limit,
        reading.turn_input,
        reading.turn_output,
        format_ts(now()),
        encode_alerts(&fired),
        agent
      ],
    )?;
    Ok((used, fresh))
  });
  let (used, alerts) = fresh?;
  for threshold in &alerts {
    info!("{agent} dropped below {threshold}% HP");
  }
  Ok(HpUpdated {
    status: "ok",
    agent: agent.to_string(),
    hp: hp::summary(used, Some(reading.limit)),
    alerts,
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneHandedOff {
  pub status: &'static str,
  pub zone: String,
  pub from: String,
  pub to: Vec<String>,
  pub raid_log_id: i64,
}

/// Move a zone from one agent to one or more others and log it.
pub fn hand_off_zone(ctx: &AppContext, from: &str, to: &[String], zone: &str) -> Result<ZoneHandedOff> {
  if to.is_empty() {
    return Err(CommsError::Invalid(error_messages::EMPTY_HAND_OFF.to_string()));
  }
  let raid_log_id = ctx.store.write(|tx| {
    require_agent(tx, from)?;
    let mut missing = Vec::new();
    for target in to {
      if find_agent(tx, target)?.is_none() {
        missing.push(target.clone());
      }
    }
    if !missing.is_empty() {
      return Err(CommsError::NotFound(error_messages::agents_missing(&missing)));
    }
    for target in to {
      tx.execute(
        "UPDATE agents SET current_zone = ?1 WHERE name = ?2",
        params![zone, target],
      )?;
    }
    let at = now();
    tx.execute(
      "UPDATE agents SET current_zone = NULL, last_seen = ?1 WHERE name = ?2",
      params![format_ts(at), from],
    )?;
    let entry = format!("Zone '{zone}' handed off from {from} to {}.", to.join(", "));
    warroom::append_raid(tx, ctx.content.as_ref(), from, &entry, RaidPriority::High, at)
  })?;
  info!("zone {zone} handed off from {from} to {}", to.join(", "));
  Ok(ZoneHandedOff {
    status: "handed_off",
    zone: zone.to_string(),
    from: from.to_string(),
    to: to.to_vec(),
    raid_log_id,
  })
}

#[derive(Debug, Clone, Serialize)]
pub struct Retired {
  pub status: &'static str,
  pub agent: String,
  pub released_claims: usize,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub waitlist_notify: Vec<String>,
}

/// Flag an agent for retirement and deregister it in one step.
pub fn retire_agent(ctx: &AppContext, caller: &str, agent: &str) -> Result<Retired> {
  let out = ctx.store.write(|tx| {
    auth::authorize(tx, caller, Operation::RetireAgent)?;
    tx.execute(
      "INSERT OR REPLACE INTO agent_retire (agent_name, set_at, set_by) VALUES (?1, ?2, ?3)",
      params![agent, format_ts(now()), caller],
    )?;
    deregister_in(tx, agent)
  })?;
  info!("{caller} retired {agent}");
  Ok(Retired {
    status: "retired",
    agent: out.agent,
    released_claims: out.released_claims,
    waitlist_notify: out.waitlist_notify,
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
  StandDown,
  Retire,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingSignal {
  pub agent: String,
  pub signal: Option<Signal>,
}

/// What the launcher should tell a running agent, if anything.
pub fn pending_signal(ctx: &AppContext, agent: &str) -> Result<PendingSignal> {
  let signal = ctx.store.read(|tx| {
    if flag(tx, FlagKey::StandDown)?.is_some() {
      return Ok(Some(Signal::StandDown));
    }
    if retire_flag_exists(tx, agent)? {
      return Ok(Some(Signal::Retire));
    }
    Ok(None)
  })?;
  Ok(PendingSignal {
    agent: agent.to_string(),
    signal,
  })
}
