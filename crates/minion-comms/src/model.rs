use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

use crate::error::CommsError;
use crate::store::time::{parse_ts, parse_ts_opt};

/// Literal recipient that addresses every agent.
pub const BROADCAST: &str = "all";

/// Text-backed enum with a fixed vocabulary: `as_str`, `Display`, `FromStr`
/// (failing with `CommsError::Invalid`) and SQLite conversions.
macro_rules! text_enum {
  (
    $(#[$meta:meta])*
    $name:ident, $label:literal {
      $( $variant:ident => $text:literal ),+ $(,)?
    }
  ) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
    #[serde(rename_all = "snake_case")]
    pub enum $name {
      $( $variant ),+
    }

    impl $name {
      pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

      #[must_use]
      pub fn as_str(self) -> &'static str {
        match self {
          $( $name::$variant => $text ),+
        }
      }

      /// Comma-separated list of accepted values, sorted.
      #[must_use]
      pub fn valid_values() -> String {
        let mut values: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
        values.sort_unstable();
        values.join(", ")
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl FromStr for $name {
      type Err = CommsError;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
          $( $text => Ok($name::$variant), )+
          other => Err(CommsError::Invalid(format!(
            "Invalid {} '{}'. Valid: {}",
            $label,
            other,
            Self::valid_values()
          ))),
        }
      }
    }

    impl ToSql for $name {
      fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
      }
    }

    impl FromSql for $name {
      fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text
          .parse()
          .map_err(|err: CommsError| FromSqlError::Other(Box::new(err)))
      }
    }
  };
}

text_enum! {
  /// Role category of an agent; drives permissions and staleness.
  AgentClass, "class" {
    Lead => "lead",
    Coder => "coder",
    Builder => "builder",
    Oracle => "oracle",
    Recon => "recon",
  }
}

text_enum! {
  /// How an agent receives its mail.
  Transport, "transport" {
    Terminal => "terminal",
    Daemon => "daemon",
  }
}

text_enum! {
  TaskStatus, "status" {
    Open => "open",
    Assigned => "assigned",
    InProgress => "in_progress",
    Fixed => "fixed",
    Verified => "verified",
    Closed => "closed",
    Abandoned => "abandoned",
    Stale => "stale",
    Obsolete => "obsolete",
  }
}

text_enum! {
  PlanStatus, "battle plan status" {
    Active => "active",
    Superseded => "superseded",
    Completed => "completed",
    Abandoned => "abandoned",
    Obsolete => "obsolete",
  }
}

text_enum! {
  RaidPriority, "priority" {
    Low => "low",
    Normal => "normal",
    High => "high",
    Critical => "critical",
  }
}

text_enum! {
  /// Process-wide switches stored in the `flags` table.
  FlagKey, "flag" {
    MoonCrash => "moon_crash",
    StandDown => "stand_down",
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Agent {
  pub name: String,
  pub agent_class: AgentClass,
  pub model: Option<String>,
  pub description: Option<String>,
  pub transport: Transport,
  pub status: Option<String>,
  pub context_summary: Option<String>,
  pub context_updated_at: Option<DateTime<Utc>>,
  pub current_zone: Option<String>,
  pub hp_input_tokens: Option<i64>,
  pub hp_output_tokens: Option<i64>,
  pub hp_turn_input: Option<i64>,
  pub hp_turn_output: Option<i64>,
  pub hp_tokens_limit: Option<i64>,
  pub hp_updated_at: Option<DateTime<Utc>>,
  pub hp_alerts_fired: Vec<u8>,
  pub registered_at: DateTime<Utc>,
  pub last_seen: DateTime<Utc>,
  pub last_inbox_check: Option<DateTime<Utc>>,
}

impl Agent {
  pub(crate) const COLUMNS: &'static str = "name, agent_class, model, description, transport, \
     status, context_summary, context_updated_at, current_zone, hp_input_tokens, \
     hp_output_tokens, hp_turn_input, hp_turn_output, hp_tokens_limit, hp_updated_at, \
     hp_alerts_fired, registered_at, last_seen, last_inbox_check";

  pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    let alerts: Option<String> = row.get("hp_alerts_fired")?;
    Ok(Self {
      name: row.get("name")?,
      agent_class: row.get("agent_class")?,
      model: row.get("model")?,
      description: row.get("description")?,
      transport: row.get("transport")?,
      status: row.get("status")?,
      context_summary: row.get("context_summary")?,
      context_updated_at: parse_ts_opt(row.get("context_updated_at")?),
      current_zone: row.get("current_zone")?,
      hp_input_tokens: row.get("hp_input_tokens")?,
      hp_output_tokens: row.get("hp_output_tokens")?,
      hp_turn_input: row.get("hp_turn_input")?,
      hp_turn_output: row.get("hp_turn_output")?,
      hp_tokens_limit: row.get("hp_tokens_limit")?,
      hp_updated_at: parse_ts_opt(row.get("hp_updated_at")?),
      hp_alerts_fired: decode_alerts(alerts.as_deref()),
      registered_at: parse_ts(&row.get::<_, String>("registered_at")?),
      last_seen: parse_ts(&row.get::<_, String>("last_seen")?),
      last_inbox_check: parse_ts_opt(row.get("last_inbox_check")?),
    })
  }
}

pub(crate) fn decode_alerts(raw: Option<&str>) -> Vec<u8> {
  raw
    .map(|s| s.split(',').filter_map(|p| p.trim().parse().ok()).collect())
    .unwrap_or_default()
}

pub(crate) fn encode_alerts(alerts: &[u8]) -> Option<String> {
  if alerts.is_empty() {
    return None;
  }
  Some(
    alerts
      .iter()
      .map(u8::to_string)
      .collect::<Vec<_>>()
      .join(","),
  )
}

/// Message row. The body lives in the content store under `content_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
  pub id: i64,
  pub from_agent: String,
  pub to_agent: String,
  pub content_file: String,
  pub timestamp: DateTime<Utc>,
  pub read_flag: bool,
  pub is_cc: bool,
  pub cc_original_to: Option<String>,
}

impl Message {
  pub(crate) const COLUMNS: &'static str =
    "id, from_agent, to_agent, content_file, timestamp, read_flag, is_cc, cc_original_to";

  pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id: row.get("id")?,
      from_agent: row.get("from_agent")?,
      to_agent: row.get("to_agent")?,
      content_file: row.get("content_file")?,
      timestamp: parse_ts(&row.get::<_, String>("timestamp")?),
      read_flag: row.get("read_flag")?,
      is_cc: row.get("is_cc")?,
      cc_original_to: row.get("cc_original_to")?,
    })
  }

  #[must_use]
  pub fn is_broadcast(&self) -> bool {
    self.to_agent == BROADCAST
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
  pub id: i64,
  pub title: String,
  pub task_file: String,
  pub project: Option<String>,
  pub zone: Option<String>,
  pub status: TaskStatus,
  pub blocked_by: Vec<i64>,
  pub assigned_to: Option<String>,
  pub created_by: String,
  pub class_required: Option<AgentClass>,
  pub files: Option<String>,
  pub progress: Option<String>,
  pub activity_count: i64,
  pub result_file: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Task {
  pub(crate) const COLUMNS: &'static str = "id, title, task_file, project, zone, status, \
     blocked_by, assigned_to, created_by, class_required, files, progress, activity_count, \
     result_file, created_at, updated_at";

  pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    let blocked: Option<String> = row.get("blocked_by")?;
    Ok(Self {
      id: row.get("id")?,
      title: row.get("title")?,
      task_file: row.get("task_file")?,
      project: row.get("project")?,
      zone: row.get("zone")?,
      status: row.get("status")?,
      blocked_by: decode_ids(blocked.as_deref()),
      assigned_to: row.get("assigned_to")?,
      created_by: row.get("created_by")?,
      class_required: row.get("class_required")?,
      files: row.get("files")?,
      progress: row.get("progress")?,
      activity_count: row.get("activity_count")?,
      result_file: row.get("result_file")?,
      created_at: parse_ts(&row.get::<_, String>("created_at")?),
      updated_at: parse_ts(&row.get::<_, String>("updated_at")?),
    })
  }
}

pub(crate) fn decode_ids(raw: Option<&str>) -> Vec<i64> {
  raw
    .map(|s| s.split(',').filter_map(|p| p.trim().parse().ok()).collect())
    .unwrap_or_default()
}

pub(crate) fn encode_ids(ids: &[i64]) -> Option<String> {
  if ids.is_empty() {
    return None;
  }
  Some(
    ids
      .iter()
      .map(i64::to_string)
      .collect::<Vec<_>>()
      .join(","),
  )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileClaim {
  pub file_path: String,
  pub agent_name: String,
  pub claimed_at: DateTime<Utc>,
}

impl FileClaim {
  pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      file_path: row.get("file_path")?,
      agent_name: row.get("agent_name")?,
      claimed_at: parse_ts(&row.get::<_, String>("claimed_at")?),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitlistEntry {
  pub file_path: String,
  pub agent_name: String,
  pub added_at: DateTime<Utc>,
}

impl WaitlistEntry {
  pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      file_path: row.get("file_path")?,
      agent_name: row.get("agent_name")?,
      added_at: parse_ts(&row.get::<_, String>("added_at")?),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattlePlan {
  pub id: i64,
  pub set_by: String,
  pub plan_file: String,
  pub status: PlanStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl BattlePlan {
  pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id: row.get("id")?,
      set_by: row.get("set_by")?,
      plan_file: row.get("plan_file")?,
      status: row.get("status")?,
      created_at: parse_ts(&row.get::<_, String>("created_at")?),
      updated_at: parse_ts(&row.get::<_, String>("updated_at")?),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaidLogEntry {
  pub id: i64,
  pub agent_name: String,
  pub entry_file: String,
  pub priority: RaidPriority,
  pub created_at: DateTime<Utc>,
}

impl RaidLogEntry {
  pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id: row.get("id")?,
      agent_name: row.get("agent_name")?,
      entry_file: row.get("entry_file")?,
      priority: row.get("priority")?,
      created_at: parse_ts(&row.get::<_, String>("created_at")?),
    })
  }
}

/// Notes an agent left on disk before its context ran out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FenixDownRecord {
  pub id: i64,
  pub agent_name: String,
  pub files: Vec<String>,
  pub manifest: String,
  pub consumed: bool,
  pub created_at: DateTime<Utc>,
}

impl FenixDownRecord {
  pub(crate) const COLUMNS: &'static str = "id, agent_name, files, manifest, consumed, created_at";

  pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    let files: String = row.get("files")?;
    Ok(Self {
      id: row.get("id")?,
      agent_name: row.get("agent_name")?,
      files: serde_json::from_str(&files).unwrap_or_default(),
      manifest: row.get::<_, Option<String>>("manifest")?.unwrap_or_default(),
      consumed: row.get("consumed")?,
      created_at: parse_ts(&row.get::<_, String>("created_at")?),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flag {
  pub key: String,
  pub value: String,
  pub set_by: String,
  pub set_at: DateTime<Utc>,
}

impl Flag {
  pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      key: row.get("key")?,
      value: row.get("value")?,
      set_by: row.get("set_by")?,
      set_at: parse_ts(&row.get::<_, String>("set_at")?),
    })
  }

  #[must_use]
  pub fn is_set(&self) -> bool {
    self.value == "1"
  }
}
