//! Trigger words: brevity codes recognised in message text.

use serde::Serialize;

use crate::model::FlagKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriggerWord {
  pub word: &'static str,
  pub meaning: &'static str,
}

pub const TRIGGER_WORDS: &[TriggerWord] = &[
  TriggerWord {
    word: "fenix_down",
    meaning: "Dump all knowledge to disk before context death. Revival protocol.",
  },
  TriggerWord {
    word: "moon_crash",
    meaning: "Emergency shutdown. Everyone fenix_down NOW. No new task assignments.",
  },
  TriggerWord {
    word: "sitrep",
    meaning: "Request status report from target agent.",
  },
  TriggerWord {
    word: "rally",
    meaning: "All agents focus on the specified target/zone.",
  },
  TriggerWord {
    word: "retreat",
    meaning: "Pull back from current approach, reassess.",
  },
  TriggerWord {
    word: "hot_zone",
    meaning: "Area is dangerous/complex, proceed with caution.",
  },
  TriggerWord {
    word: "stand_down",
    meaning: "Stop work, prepare to deregister.",
  },
  TriggerWord {
    word: "recon",
    meaning: "Investigate before acting. Gather intel first.",
  },
];

/// Trigger words present in `text`, in codebook order, each at most once.
///
/// Matching is case-insensitive on substrings, so `moon_crashing` still
/// counts as `moon_crash`.
#[must_use]
pub fn scan(text: &str) -> Vec<&'static str> {
  let lower = text.to_lowercase();
  TRIGGER_WORDS
    .iter()
    .map(|t| t.word)
    .filter(|word| lower.contains(word))
    .collect()
}

/// Flag a trigger word raises, if any.
#[must_use]
pub fn flag_for(word: &str) -> Option<FlagKey> {
  match word {
    "moon_crash" => Some(FlagKey::MoonCrash),
    "stand_down" => Some(FlagKey::StandDown),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn matches_substrings_case_insensitively() {
    assert_eq!(scan("MOON_CRASH now, then Sitrep"), vec!["moon_crash", "sitrep"]);
    assert_eq!(scan("moon_crashing!"), vec!["moon_crash"]);
    assert_eq!(scan("reconnaissance and rallying"), vec!["rally", "recon"]);
    assert_eq!(scan("recon, recon, recon"), vec!["recon"]);
    assert!(scan("all quiet").is_empty());
  }

  #[test]
  fn only_emergency_words_raise_flags() {
    assert_eq!(flag_for("moon_crash"), Some(FlagKey::MoonCrash));
    assert_eq!(flag_for("stand_down"), Some(FlagKey::StandDown));
    assert_eq!(flag_for("rally"), None);
  }
}
