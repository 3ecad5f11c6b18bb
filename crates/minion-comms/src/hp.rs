//! HP: remaining context budget as a percentage of the token limit.

use crate::model::Agent;

/// HP levels at which an alert fires, highest first.
pub const ALERT_THRESHOLDS: &[u8] = &[50, 25, 10];

/// Token usage to judge HP by: per-turn values when reported, else cumulative.
#[must_use]
pub fn tokens_used(
  input: Option<i64>,
  output: Option<i64>,
  turn_input: Option<i64>,
  turn_output: Option<i64>,
) -> i64 {
  if turn_input.is_some() || turn_output.is_some() {
    turn_input.unwrap_or(0).saturating_add(turn_output.unwrap_or(0))
  } else {
    input.unwrap_or(0).saturating_add(output.unwrap_or(0))
  }
}

/// Remaining HP in percent, floored at zero. `None` without a limit or usage.
#[must_use]
pub fn percent(used: i64, limit: Option<i64>) -> Option<f64> {
  let limit = limit.filter(|l| *l > 0)?;
  if used <= 0 {
    return None;
  }
  #[allow(clippy::cast_precision_loss)]
  let pct_used = used as f64 / limit as f64 * 100.0;
  Some((100.0 - pct_used).max(0.0))
}

/// `"<hp>% HP [<used>k/<limit>k] - Healthy|Wounded|CRITICAL"` or `"HP unknown"`.
#[must_use]
pub fn summary(used: i64, limit: Option<i64>) -> String {
  let (Some(hp), Some(limit)) = (percent(used, limit), limit) else {
    return "HP unknown".to_string();
  };
  let status = if hp > 50.0 {
    "Healthy"
  } else if hp > 25.0 {
    "Wounded"
  } else {
    "CRITICAL"
  };
  format!(
    "{hp:.0}% HP [{}k/{}k] - {status}",
    used / 1000,
    limit / 1000
  )
}

/// HP display for an agent row.
#[must_use]
pub fn agent_summary(agent: &Agent) -> String {
  let used = tokens_used(
    agent.hp_input_tokens,
    agent.hp_output_tokens,
    agent.hp_turn_input,
    agent.hp_turn_output,
  );
  summary(used, agent.hp_tokens_limit)
}

/// Apply a new HP reading to the set of fired alerts.
///
/// Returns the updated set and the thresholds that fired just now. A
/// threshold the agent has recovered above is dropped so it can fire again.
#[must_use]
pub fn evaluate_alerts(hp: Option<f64>, fired: &[u8]) -> (Vec<u8>, Vec<u8>) {
  let Some(hp) = hp else {
    return (fired.to_vec(), Vec::new());
  };
  let mut next = Vec::new();
  let mut fresh = Vec::new();
  for &threshold in ALERT_THRESHOLDS {
    if hp <= f64::from(threshold) {
      next.push(threshold);
      if !fired.contains(&threshold) {
        fresh.push(threshold);
      }
    }
  }
  (next, fresh)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn summary_formats_levels() {
    assert_eq!(summary(20_000, Some(200_000)), "90% HP [20k/200k] - Healthy");
    assert_eq!(summary(120_000, Some(200_000)), "40% HP [120k/200k] - Wounded");
    assert_eq!(summary(190_000, Some(200_000)), "5% HP [190k/200k] - CRITICAL");
    assert_eq!(summary(400_000, Some(200_000)), "0% HP [400k/200k] - CRITICAL");
  }

  #[test]
  fn summary_unknown_without_data() {
    assert_eq!(summary(0, Some(200_000)), "HP unknown");
    assert_eq!(summary(5_000, None), "HP unknown");
    assert_eq!(summary(5_000, Some(0)), "HP unknown");
  }

  #[test]
  fn per_turn_values_override_cumulative() {
    assert_eq!(tokens_used(Some(900), Some(100), Some(40), None), 40);
    assert_eq!(tokens_used(Some(900), Some(100), None, None), 1000);
  }

  #[test]
  fn huge_readings_saturate() {
    assert_eq!(tokens_used(Some(i64::MAX), Some(1), None, None), i64::MAX);
    assert_eq!(tokens_used(None, None, Some(i64::MAX), Some(i64::MAX)), i64::MAX);
    assert_eq!(summary(i64::MAX, Some(200_000)).split(' ').next(), Some("0%"));
  }

  #[test]
  fn alerts_fire_once_and_reset_on_recovery() {
    let (fired, fresh) = evaluate_alerts(Some(20.0), &[]);
    assert_eq!(fired, vec![50, 25]);
    assert_eq!(fresh, vec![50, 25]);

    let (fired, fresh) = evaluate_alerts(Some(18.0), &fired);
    assert_eq!(fired, vec![50, 25]);
    assert!(fresh.is_empty());

    let (fired, fresh) = evaluate_alerts(Some(40.0), &fired);
    assert_eq!(fired, vec![50]);
    assert!(fresh.is_empty());

    let (_, fresh) = evaluate_alerts(Some(5.0), &fired);
    assert_eq!(fresh, vec![25, 10]);
  }
}
