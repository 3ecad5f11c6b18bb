pub mod agents;
pub mod claims;
pub mod lifecycle;
pub mod mail;
pub mod monitor;
pub mod tasks;
pub mod tools;
pub mod war_room;

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

/// Where command results go: pretty JSON on stdout, or styled lines.
#[derive(Debug, Clone, Copy)]
pub struct Output {
  pub human: bool,
}

impl Output {
  pub fn emit<T: Serialize>(self, value: &T, render: impl FnOnce(&T)) -> Result<()> {
    if self.human {
      render(value);
    } else {
      println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
  }
}

/// Content references given on the command line are relative to the caller's
/// working directory, not the content root.
pub(crate) fn absolutize(cwd: &Path, reference: &str) -> String {
  let path = Path::new(reference);
  if path.is_absolute() {
    reference.to_string()
  } else {
    cwd.join(path).display().to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn absolutize_keeps_absolute_paths() {
    let cwd = Path::new("/work/project");
    assert_eq!(absolutize(cwd, "/tmp/spec.md"), "/tmp/spec.md");
    assert_eq!(absolutize(cwd, "specs/a.md"), "/work/project/specs/a.md");
  }
}
