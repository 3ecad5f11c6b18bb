//! Common error messages used across the codebase.
//! Centralizes error message strings to ensure consistency and simplify maintenance.

use std::fmt::Display;

// Registry
pub(crate) fn not_registered(name: impl Display) -> String {
  format!("Agent '{name}' not registered.")
}

pub(crate) fn agent_not_found(name: impl Display) -> String {
  format!("Agent '{name}' not found.")
}

pub(crate) fn agent_exists(name: impl Display) -> String {
  format!("Agent '{name}' already exists.")
}

pub(crate) fn invalid_agent_name(name: impl Display) -> String {
  format!(
    "Invalid agent name '{name}'. Use letters, digits, '.', '_' or '-', starting with a letter or digit (and not 'all')."
  )
}

pub(crate) fn model_not_allowed(model: impl Display, class: impl Display, allowed: &[&str]) -> String {
  format!(
    "Model '{model}' not allowed for class '{class}'. Allowed: {}",
    allowed.join(", ")
  )
}

pub(crate) fn class_forbidden(
  agent: impl Display,
  class: impl Display,
  action: impl Display,
  allowed: impl Display,
) -> String {
  format!("Only {allowed} agents can {action}. '{agent}' is '{class}'.")
}

// Mailbox gates
pub(crate) fn unread_messages(count: i64) -> String {
  format!("unread messages: you have {count} unread message(s). Call check-inbox first.")
}

pub(crate) const NO_ACTIVE_PLAN: &str =
  "no active battle plan. Lead must call set-battle-plan first.";

pub(crate) fn context_never_set(class: impl Display, threshold_mins: i64) -> String {
  format!(
    "context stale: context not set. Call set-context before sending. ({class} threshold: {threshold_mins} min)"
  )
}

pub(crate) fn context_stale(age_mins: i64, threshold_mins: i64, class: impl Display) -> String {
  format!(
    "context stale ({age_mins}m old, threshold {threshold_mins}m for {class}). Call set-context to update your metrics before sending."
  )
}

pub(crate) fn moon_crash_active(set_by: impl Display, set_at: impl Display) -> String {
  format!("moon_crash active, no new assignments. (set by {set_by} at {set_at})")
}

pub(crate) fn purge_window_invalid(hours: i64) -> String {
  format!("older_than_hours {hours} is out of range. Use a non-negative number of hours.")
}

pub(crate) fn hp_reading_invalid(field: &str, value: i64) -> String {
  format!("{field} must not be negative (got {value}).")
}

// Tasks
pub(crate) fn task_not_found(id: i64) -> String {
  format!("Task #{id} not found.")
}

pub(crate) fn task_closed(id: i64) -> String {
  format!("Task #{id} is closed.")
}

pub(crate) fn task_already_closed(id: i64) -> String {
  format!("Task #{id} is already closed.")
}

pub(crate) fn task_dead_end(id: i64, status: impl Display) -> String {
  format!("Task #{id} is {status}, a terminal state. Reassign it to reopen.")
}

pub(crate) fn task_terminal(id: i64, status: impl Display) -> String {
  format!("Task #{id} is {status} (terminal). Nothing left to pick up.")
}

pub(crate) fn no_failure_route(id: i64, status: impl Display) -> String {
  format!("Task #{id} is {status}; only fixed or verified tasks can fail review.")
}

pub(crate) fn activity_dragging(count: i64) -> String {
  format!("Activity count at {count}. This fight is dragging, consider reassessing.")
}

pub(crate) const CLOSE_VIA_UPDATE: &str =
  "Cannot set status to 'closed' via update-task. Use close-task.";

pub(crate) fn no_result_file(id: i64) -> String {
  format!("no result file for task #{id}. Agent must call submit-result first.")
}

pub(crate) fn spec_missing(reference: impl Display) -> String {
  format!("Task file does not exist: {reference}")
}

pub(crate) fn result_missing(reference: impl Display) -> String {
  format!("Result file does not exist: {reference}")
}

pub(crate) fn blocker_missing(id: i64) -> String {
  format!("blocked_by task #{id} does not exist.")
}

pub(crate) fn blockers_unresolved(ids: &[i64]) -> String {
  let list: Vec<String> = ids.iter().map(|id| format!("#{id}")).collect();
  format!("unresolved blocker(s): {}", list.join(", "))
}

pub(crate) fn task_taken(id: i64, holder: impl Display) -> String {
  format!("Task #{id} already claimed by {holder}. Race lost.")
}

pub(crate) fn not_eligible(class: impl Display, status: impl Display, eligible: &str) -> String {
  format!("Class '{class}' cannot pick up a '{status}' task. Eligible: {eligible}")
}

// File claims
pub(crate) fn file_claimed_by(path: impl Display, holder: impl Display, position: i64) -> String {
  format!("{path} is claimed by {holder}. You are #{position} on the waitlist.")
}

pub(crate) fn claim_not_found(path: impl Display) -> String {
  format!("No claim on {path}.")
}

pub(crate) fn release_not_owner(path: impl Display, holder: impl Display) -> String {
  format!("{path} is claimed by {holder}, not you. Only lead can force-release.")
}

// War room
pub(crate) fn plan_not_found(id: i64) -> String {
  format!("Battle plan #{id} not found.")
}

pub(crate) const EMPTY_HAND_OFF: &str = "No target agents specified.";

pub(crate) fn agents_missing(names: &[String]) -> String {
  format!("Agents not registered: {}", names.join(", "))
}

// Lifecycle
pub(crate) const FENIX_DOWN_NO_FILES: &str =
  "fenix_down needs at least one file. List the notes you wrote to disk.";

pub(crate) fn debrief_missing(reference: impl Display) -> String {
  format!("Debrief file does not exist: {reference}")
}

pub(crate) const DEBRIEF_REQUIRED: &str =
  "no debrief filed for this session. Lead must call debrief before end-session.";
