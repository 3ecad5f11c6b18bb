//! Task status flow.
//!
//! Linear path `open -> assigned -> in_progress -> fixed -> verified -> closed`.
//! A failed review sends `fixed` or `verified` back to `assigned`.
//! `abandoned`, `stale` and `obsolete` are dead ends reachable from any live
//! state; `closed` is terminal.

use crate::model::AgentClass;
use crate::model::TaskStatus::{self, *};

const DEAD_ENDS: &[TaskStatus] = &[Abandoned, Stale, Obsolete];

#[must_use]
pub fn is_terminal(status: TaskStatus) -> bool {
  status == Closed
}

#[must_use]
pub fn is_dead_end(status: TaskStatus) -> bool {
  DEAD_ENDS.contains(&status)
}

/// Neither closed nor parked in a dead end.
#[must_use]
pub fn is_live(status: TaskStatus) -> bool {
  !is_terminal(status) && !is_dead_end(status)
}

/// Review stages hand the task to a different worker.
#[must_use]
pub fn is_review(status: TaskStatus) -> bool {
  matches!(status, Fixed | Verified)
}

/// Next status along the flow, or the failure route when `passed` is false.
/// `None` when there is nowhere to go.
#[must_use]
pub fn next_status(status: TaskStatus, passed: bool) -> Option<TaskStatus> {
  if !passed {
    return is_review(status).then_some(Assigned);
  }
  match status {
    Open => Some(Assigned),
    Assigned => Some(InProgress),
    InProgress => Some(Fixed),
    Fixed => Some(Verified),
    Verified => Some(Closed),
    Closed | Abandoned | Stale | Obsolete => None,
  }
}

/// Every status reachable from `status` in one step. Empty for closed and
/// dead-end tasks.
#[must_use]
pub fn valid_transitions(status: TaskStatus) -> Vec<TaskStatus> {
  if !is_live(status) {
    return Vec::new();
  }
  let mut out: Vec<TaskStatus> = next_status(status, true).into_iter().collect();
  if let Some(back) = next_status(status, false) {
    out.push(back);
  }
  out.extend_from_slice(DEAD_ENDS);
  out
}

/// Classes that may pick up a task in `status`.
///
/// `None` means the current assignee carries on (work in progress).
#[must_use]
pub fn eligible_classes(
  status: TaskStatus,
  class_required: Option<AgentClass>,
) -> Option<Vec<AgentClass>> {
  match status {
    Open | Assigned => Some(match class_required {
      Some(class) => vec![class],
      None => vec![AgentClass::Coder, AgentClass::Builder],
    }),
    InProgress => None,
    Fixed => Some(vec![AgentClass::Oracle, AgentClass::Recon]),
    Verified => Some(vec![AgentClass::Lead]),
    Closed | Abandoned | Stale | Obsolete => Some(Vec::new()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn linear_path() {
    assert_eq!(next_status(Open, true), Some(Assigned));
    assert_eq!(next_status(Assigned, true), Some(InProgress));
    assert_eq!(next_status(InProgress, true), Some(Fixed));
    assert_eq!(next_status(Fixed, true), Some(Verified));
    assert_eq!(next_status(Verified, true), Some(Closed));
    assert_eq!(next_status(Closed, true), None);
  }

  #[test]
  fn failed_review_routes_back() {
    assert_eq!(next_status(Fixed, false), Some(Assigned));
    assert_eq!(next_status(Verified, false), Some(Assigned));
    assert_eq!(next_status(InProgress, false), None);
  }

  #[test]
  fn terminal_and_dead_ends() {
    assert!(is_terminal(Closed));
    assert!(!is_terminal(Open));
    for status in [Abandoned, Stale, Obsolete] {
      assert!(is_dead_end(status));
      assert!(valid_transitions(status).is_empty());
    }
    assert!(!is_dead_end(Open));
    assert!(valid_transitions(Closed).is_empty());
  }

  #[test]
  fn transitions_from_open_include_dead_ends() {
    let t = valid_transitions(Open);
    assert_eq!(t[0], Assigned);
    assert!(t.contains(&Abandoned));
    assert!(!t.contains(&Closed));
    assert!(valid_transitions(Fixed).contains(&Assigned));
  }

  #[test]
  fn workers_per_stage() {
    assert_eq!(
      eligible_classes(Fixed, Some(AgentClass::Coder)),
      Some(vec![AgentClass::Oracle, AgentClass::Recon])
    );
    assert_eq!(eligible_classes(InProgress, Some(AgentClass::Coder)), None);
    assert_eq!(
      eligible_classes(Open, Some(AgentClass::Builder)),
      Some(vec![AgentClass::Builder])
    );
    assert_eq!(eligible_classes(Closed, None), Some(vec![]));
  }
}
