use chrono::{DateTime, SecondsFormat, Utc};

/// Current instant, truncated to the precision stored in the database.
#[must_use]
pub fn now() -> DateTime<Utc> {
  let now = Utc::now();
  parse_ts(&format_ts(now))
}

/// Fixed-width RFC 3339 so that string comparison in SQL follows time order.
#[must_use]
pub fn format_ts(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[must_use]
pub fn parse_ts(raw: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_default()
}

#[must_use]
pub fn parse_ts_opt(raw: Option<String>) -> Option<DateTime<Utc>> {
  raw.map(|v| parse_ts(&v))
}

/// Compact stamp used in generated content references.
#[must_use]
pub fn file_stamp(ts: DateTime<Utc>) -> String {
  ts.format("%Y%m%dT%H%M%S%.6fZ").to_string().replace('.', "")
}

/// Whole minutes elapsed between `from` and `to`, floored at zero.
#[must_use]
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
  (to - from).num_minutes().max(0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn formatted_stamps_sort_chronologically() {
    let a = now();
    let b = a + Duration::milliseconds(5);
    let c = a + Duration::hours(30);
    assert!(format_ts(a) < format_ts(b));
    assert!(format_ts(b) < format_ts(c));
    assert_eq!(parse_ts(&format_ts(a)), a);
  }

  #[test]
  fn unparsable_timestamp_falls_back_to_epoch() {
    assert_eq!(parse_ts("yesterday"), DateTime::<Utc>::default());
  }

  #[test]
  fn file_stamp_has_no_separators() {
    let stamp = file_stamp(parse_ts("2026-01-02T03:04:05.123456Z"));
    assert_eq!(stamp, "20260102T030405123456Z");
  }
}
