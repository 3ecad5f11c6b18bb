//! External content store for message, plan, raid-log and task bodies.
//!
//! Rows only hold opaque references. Writes go through a temp file in the
//! destination directory that is synced and then renamed over the target,
//! so a reader sees either the old bytes or the new bytes, never a prefix.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::error::{CommsError, Result};
use crate::model::RaidPriority;
use crate::store::time::file_stamp;

pub trait ContentStore: Send + Sync {
  /// Atomically replace the bytes behind `reference`.
  fn write(&self, reference: &str, bytes: &[u8]) -> Result<()>;

  fn read(&self, reference: &str) -> Result<Vec<u8>>;

  fn exists(&self, reference: &str) -> bool;

  /// Read and decode as UTF-8, replacing invalid sequences.
  fn read_text(&self, reference: &str) -> Result<String> {
    let bytes = self.read(reference)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
  }
}

/// Filesystem-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsContentStore {
  root: PathBuf,
}

impl FsContentStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  #[must_use]
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Relative references live under the root; absolute ones are taken as-is.
  #[must_use]
  pub fn resolve(&self, reference: &str) -> PathBuf {
    let path = Path::new(reference);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.root.join(path)
    }
  }
}

impl ContentStore for FsContentStore {
  fn write(&self, reference: &str, bytes: &[u8]) -> Result<()> {
    let target = self.resolve(reference);
    let dir = target
      .parent()
      .map_or_else(|| self.root.clone(), Path::to_path_buf);
    fs::create_dir_all(&dir).map_err(|err| CommsError::content(reference, err))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|err| CommsError::content(reference, err))?;
    tmp
      .write_all(bytes)
      .and_then(|()| tmp.as_file().sync_all())
      .map_err(|err| CommsError::content(reference, err))?;
    tmp
      .persist(&target)
      .map_err(|err| CommsError::content(reference, err.error))?;
    debug!("wrote content {}", target.display());
    Ok(())
  }

  fn read(&self, reference: &str) -> Result<Vec<u8>> {
    fs::read(self.resolve(reference)).map_err(|err| CommsError::content(reference, err))
  }

  fn exists(&self, reference: &str) -> bool {
    self.resolve(reference).is_file()
  }
}

/// Body behind `reference`, or `None` (with a warning) if it cannot be read.
pub(crate) fn read_or_warn(store: &dyn ContentStore, reference: &str) -> Option<String> {
  match store.read_text(reference) {
    Ok(text) => Some(text),
    Err(err) => {
      warn!("missing content: {err}");
      None
    }
  }
}

fn unique_stamp(now: DateTime<Utc>) -> String {
  let id = uuid::Uuid::new_v4().simple().to_string();
  format!("{}-{}", file_stamp(now), &id[..8])
}

/// `inbox/<to>/<stamp>-from-<from>[-cc].md`
#[must_use]
pub fn inbox_ref(to: &str, from: &str, is_cc: bool, now: DateTime<Utc>) -> String {
  let suffix = if is_cc { "-cc" } else { "" };
  format!("inbox/{to}/{}-from-{from}{suffix}.md", unique_stamp(now))
}

/// `battle-plans/<stamp>-<author>.md`
#[must_use]
pub fn battle_plan_ref(author: &str, now: DateTime<Utc>) -> String {
  format!("battle-plans/{}-{author}.md", unique_stamp(now))
}

/// `raid-log/<stamp>-<agent>-<priority>.md`
#[must_use]
pub fn raid_log_ref(agent: &str, priority: RaidPriority, now: DateTime<Utc>) -> String {
  format!("raid-log/{}-{agent}-{priority}.md", unique_stamp(now))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::time::now;

  #[test]
  fn write_then_read_replaces_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsContentStore::new(dir.path());
    store.write("inbox/bob/a.md", b"first").unwrap();
    store.write("inbox/bob/a.md", b"second").unwrap();
    assert_eq!(store.read_text("inbox/bob/a.md").unwrap(), "second");
    // No stray temp files left next to the target.
    let entries = fs::read_dir(dir.path().join("inbox/bob")).unwrap().count();
    assert_eq!(entries, 1);
  }

  #[test]
  fn absolute_references_bypass_root() {
    let root = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let spec = other.path().join("spec.md");
    fs::write(&spec, "do it").unwrap();
    let store = FsContentStore::new(root.path());
    let reference = spec.display().to_string();
    assert!(store.exists(&reference));
    assert!(!store.exists("missing.md"));
  }

  #[test]
  fn missing_content_is_a_content_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsContentStore::new(dir.path());
    let err = store.read("nope.md").unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Content);
  }

  #[test]
  fn generated_references_are_unique() {
    let at = now();
    let a = inbox_ref("bob", "cap", false, at);
    let b = inbox_ref("bob", "cap", true, at);
    assert!(a.starts_with("inbox/bob/"));
    assert!(a.ends_with("-from-cap.md"));
    assert!(b.ends_with("-from-cap-cc.md"));
    assert_ne!(inbox_ref("bob", "cap", false, at), a);
    assert!(raid_log_ref("cod", RaidPriority::High, at).ends_with("-cod-high.md"));
  }
}
