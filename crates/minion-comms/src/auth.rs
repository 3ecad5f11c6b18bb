//! Class-based authorization.
//!
//! Permissions are one static table from operation to permitted classes.
//! The front-end consults it with the class it was given; core operations
//! consult it again with the class recorded in the registry.

use std::fmt;

use rusqlite::Transaction;
use serde::Serialize;

use crate::error::{CommsError, Result};
use crate::model::{Agent, AgentClass};
use crate::store::require_agent;
use crate::utils::error_messages;

use crate::model::AgentClass::{Builder, Coder, Lead, Oracle, Recon};

const EVERYONE: &[AgentClass] = &[Lead, Coder, Builder, Oracle, Recon];
const LEAD_ONLY: &[AgentClass] = &[Lead];
const EDITORS: &[AgentClass] = &[Lead, Coder, Builder];

const STRICT_MODELS: &[&str] = &[
  "claude-opus-4-6",
  "claude-opus-4-5",
  "claude-sonnet-4-6",
  "claude-sonnet-4-5",
  "gemini-pro",
  "gemini-1.5-pro",
  "gemini-2.0-pro",
];

macro_rules! operations {
  ( $( $variant:ident => $name:literal : $classes:expr ),+ $(,)? ) => {
    /// Every operation a caller can invoke, named as on the command line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum Operation {
      $( $variant ),+
    }

    impl Operation {
      pub const ALL: &'static [Operation] = &[$( Operation::$variant ),+];

      #[must_use]
      pub fn as_str(self) -> &'static str {
        match self {
          $( Operation::$variant => $name ),+
        }
      }

      /// Classes allowed to invoke this operation.
      #[must_use]
      pub fn permitted(self) -> &'static [AgentClass] {
        match self {
          $( Operation::$variant => $classes ),+
        }
      }
    }
  };
}

operations! {
  Register => "register": EVERYONE,
  Deregister => "deregister": EVERYONE,
  Rename => "rename": LEAD_ONLY,
  SetStatus => "set-status": EVERYONE,
  SetContext => "set-context": EVERYONE,
  Who => "who": EVERYONE,
  UpdateHp => "update-hp": EVERYONE,
  HandOffZone => "hand-off-zone": EVERYONE,
  RetireAgent => "retire-agent": LEAD_ONLY,
  PendingSignal => "pending-signal": EVERYONE,
  Send => "send": EVERYONE,
  CheckInbox => "check-inbox": EVERYONE,
  GetHistory => "get-history": EVERYONE,
  PurgeInbox => "purge-inbox": EVERYONE,
  GetTriggers => "get-triggers": EVERYONE,
  ClearFlag => "clear-flag": LEAD_ONLY,
  StandDown => "stand-down": LEAD_ONLY,
  ClaimFile => "claim-file": EDITORS,
  ReleaseFile => "release-file": EDITORS,
  ForceRelease => "force-release": LEAD_ONLY,
  GetClaims => "get-claims": EVERYONE,
  SetBattlePlan => "set-battle-plan": LEAD_ONLY,
  GetBattlePlan => "get-battle-plan": EVERYONE,
  UpdateBattlePlanStatus => "update-battle-plan-status": LEAD_ONLY,
  LogRaid => "log-raid": EVERYONE,
  GetRaidLog => "get-raid-log": EVERYONE,
  CreateTask => "create-task": LEAD_ONLY,
  AssignTask => "assign-task": LEAD_ONLY,
  UpdateTask => "update-task": EVERYONE,
  GetTasks => "get-tasks": EVERYONE,
  GetTask => "get-task": EVERYONE,
  SubmitResult => "submit-result": EVERYONE,
  CloseTask => "close-task": LEAD_ONLY,
  PullTask => "pull-task": EVERYONE,
  CompleteTask => "complete-task": EVERYONE,
  PartyStatus => "party-status": LEAD_ONLY,
  Sitrep => "sitrep": EVERYONE,
  CheckActivity => "check-activity": EVERYONE,
  CheckFreshness => "check-freshness": LEAD_ONLY,
  FenixDown => "fenix-down": EVERYONE,
  ColdStart => "cold-start": EVERYONE,
  Debrief => "debrief": LEAD_ONLY,
  EndSession => "end-session": LEAD_ONLY,
  Tools => "tools": EVERYONE,
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Operation {
  #[must_use]
  pub fn allows(self, class: AgentClass) -> bool {
    self.permitted().contains(&class)
  }
}

fn class_list(classes: &[AgentClass]) -> String {
  classes
    .iter()
    .map(|c| c.as_str())
    .collect::<Vec<_>>()
    .join("/")
}

/// Pure class check, used by the front-end gate.
///
/// # Errors
/// `Blocked` when `class` may not invoke `op`.
pub fn check_class(who: &str, class: AgentClass, op: Operation) -> Result<()> {
  if op.allows(class) {
    return Ok(());
  }
  Err(CommsError::Blocked(error_messages::class_forbidden(
    who,
    class,
    op,
    class_list(op.permitted()),
  )))
}

/// Look the caller up in the registry and check its recorded class.
pub(crate) fn authorize(tx: &Transaction<'_>, caller: &str, op: Operation) -> Result<Agent> {
  let agent = require_agent(tx, caller)?;
  check_class(&agent.name, agent.agent_class, op)?;
  Ok(agent)
}

/// Models a class may run on. Empty means unrestricted.
#[must_use]
pub fn allowed_models(class: AgentClass) -> &'static [&'static str] {
  match class {
    Lead | Coder => STRICT_MODELS,
    Builder | Oracle | Recon => &[],
  }
}

pub(crate) fn check_model(class: AgentClass, model: Option<&str>) -> Result<()> {
  let allowed = allowed_models(class);
  match model {
    Some(m) if !m.is_empty() && !allowed.is_empty() && !allowed.contains(&m) => Err(
      CommsError::Invalid(error_messages::model_not_allowed(m, class, allowed)),
    ),
    _ => Ok(()),
  }
}

/// Minutes after which an agent's context counts as stale.
#[must_use]
pub fn staleness_threshold_mins(class: AgentClass) -> i64 {
  match class {
    Coder | Builder | Recon => 5,
    Lead => 15,
    Oracle => 30,
  }
}

/// Operations available to `class`, in table order.
#[must_use]
pub fn tools_for_class(class: AgentClass) -> Vec<Operation> {
  Operation::ALL
    .iter()
    .copied()
    .filter(|op| op.allows(class))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lead_only_operations() {
    let lead_only: Vec<&str> = Operation::ALL
      .iter()
      .filter(|op| op.permitted() == LEAD_ONLY)
      .map(|op| op.as_str())
      .collect();
    assert_eq!(
      lead_only,
      vec![
        "rename",
        "retire-agent",
        "clear-flag",
        "stand-down",
        "force-release",
        "set-battle-plan",
        "update-battle-plan-status",
        "create-task",
        "assign-task",
        "close-task",
        "party-status",
        "check-freshness",
        "debrief",
        "end-session",
      ]
    );
  }

  #[test]
  fn claims_are_for_editors() {
    assert!(Operation::ClaimFile.allows(Builder));
    assert!(!Operation::ClaimFile.allows(Oracle));
    assert!(!Operation::ReleaseFile.allows(Recon));
  }

  #[test]
  fn forbidden_class_is_blocked() {
    let err = check_class("cod1", Coder, Operation::CreateTask).unwrap_err();
    assert!(err.is_blocked());
    assert!(err.to_string().contains("Only lead agents can create-task"));
    assert!(check_class("cap", Lead, Operation::CreateTask).is_ok());
  }

  #[test]
  fn model_allow_list() {
    assert!(check_model(Coder, Some("claude-opus-4-6")).is_ok());
    assert!(check_model(Coder, Some("gpt-2")).unwrap_err().is_invalid());
    assert!(check_model(Recon, Some("anything")).is_ok());
    assert!(check_model(Lead, None).is_ok());
    assert!(check_model(Lead, Some("")).is_ok());
  }

  #[test]
  fn staleness_by_class() {
    assert_eq!(staleness_threshold_mins(Coder), 5);
    assert_eq!(staleness_threshold_mins(Lead), 15);
    assert_eq!(staleness_threshold_mins(Oracle), 30);
  }

  #[test]
  fn oracle_tools_exclude_lead_operations() {
    let tools = tools_for_class(Oracle);
    assert!(tools.contains(&Operation::Send));
    assert!(!tools.contains(&Operation::CreateTask));
    assert!(!tools.contains(&Operation::ClaimFile));
    assert_eq!(tools_for_class(Lead).len(), Operation::ALL.len());
  }
}
