use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use owo_colors::OwoColorize as _;
use serde::Deserialize;
use toml::Value as TomlValue;

use crate::content::{ContentStore, FsContentStore};
use crate::store::{Store, StoreOptions};

const XDG_PREFIX: &str = "minion-comms";
const CONFIG_FILE: &str = "minion.toml";
const PROJECT_DIR: &str = ".minion-comms";

/// Database file override.
pub const ENV_DB_PATH: &str = "MINION_COMMS_DB_PATH";
/// Project name used in the default data path.
pub const ENV_PROJECT: &str = "MINION_PROJECT";
pub const ENV_DOCS_DIR: &str = "MINION_DOCS_DIR";
/// Caller class for the front-end gate.
pub const ENV_CLASS: &str = "MINION_CLASS";

/// Known top-level config keys.
const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["store", "content", "docs", "history"];

/// Known keys within `[store]` section.
const KNOWN_STORE_KEYS: &[&str] = &["path", "busy_timeout_ms", "max_busy_retries"];

/// Known keys within `[content]` section.
const KNOWN_CONTENT_KEYS: &[&str] = &["root"];

/// Known keys within `[docs]` section.
const KNOWN_DOCS_KEYS: &[&str] = &["dir"];

/// Known keys within `[history]` section.
const KNOWN_HISTORY_KEYS: &[&str] = &["default_count"];

// Embed repository defaults
const DEFAULT_TOML: &str =
  include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/defaults/minion.toml"));

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  #[serde(default)]
  pub path: Option<String>,
  #[serde(default)]
  pub busy_timeout_ms: Option<u64>,
  #[serde(default)]
  pub max_busy_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentConfig {
  #[serde(default)]
  pub root: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocsConfig {
  #[serde(default)]
  pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryConfig {
  /// Messages returned by `get-history` when no count is given.
  #[serde(default)]
  pub default_count: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MinionConfig {
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub content: ContentConfig,
  #[serde(default)]
  pub docs: DocsConfig,
  #[serde(default)]
  pub history: HistoryConfig,
}

impl MinionConfig {
  #[must_use]
  pub fn store_options(&self) -> StoreOptions {
    let defaults = StoreOptions::default();
    StoreOptions {
      busy_timeout_ms: self.store.busy_timeout_ms.unwrap_or(defaults.busy_timeout_ms),
      max_busy_retries: self
        .store
        .max_busy_retries
        .unwrap_or(defaults.max_busy_retries),
    }
  }

  #[must_use]
  pub fn history_count(&self) -> usize {
    self.history.default_count.unwrap_or(20)
  }
}

#[derive(Debug, Clone)]
pub struct MinionPaths {
  db_path: PathBuf,
  content_root: PathBuf,
  docs_dir: Option<PathBuf>,
}

impl MinionPaths {
  pub fn new(db_path: impl Into<PathBuf>, content_root: impl Into<PathBuf>) -> Self {
    Self {
      db_path: db_path.into(),
      content_root: content_root.into(),
      docs_dir: None,
    }
  }

  #[must_use]
  pub fn with_docs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.docs_dir = Some(dir.into());
    self
  }

  /// Resolve paths with precedence: environment -> config -> XDG data home.
  /// Relative config paths are taken relative to `cwd`.
  ///
  /// # Errors
  /// Returns an error if no explicit path is set and the XDG data home cannot be resolved.
  pub fn resolve(cfg: &MinionConfig, cwd: &Path) -> Result<Self> {
    let db_path = if let Some(raw) = env_nonempty(ENV_DB_PATH) {
      PathBuf::from(raw)
    } else if let Some(raw) = &cfg.store.path {
      cwd.join(raw)
    } else {
      let xdg = xdg::BaseDirectories::with_prefix(XDG_PREFIX);
      let data_home = xdg
        .get_data_home()
        .ok_or_else(|| anyhow::anyhow!("unable to resolve XDG data home"))?;
      data_home.join(project_name(cwd)).join("minion.db")
    };

    let content_root = match &cfg.content.root {
      Some(raw) => cwd.join(raw),
      None => db_path
        .parent()
        .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf),
    };

    let docs_dir = env_nonempty(ENV_DOCS_DIR)
      .map(PathBuf::from)
      .or_else(|| cfg.docs.dir.as_ref().map(|raw| cwd.join(raw)));

    Ok(Self {
      db_path,
      content_root,
      docs_dir,
    })
  }

  #[must_use]
  pub fn db_path(&self) -> &Path {
    &self.db_path
  }

  #[must_use]
  pub fn content_root(&self) -> &Path {
    &self.content_root
  }

  #[must_use]
  pub fn docs_dir(&self) -> Option<&Path> {
    self.docs_dir.as_deref()
  }
}

/// Project name from `MINION_PROJECT`, else the directory name of `cwd`.
fn project_name(cwd: &Path) -> String {
  env_nonempty(ENV_PROJECT)
    .or_else(|| {
      cwd
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
    })
    .unwrap_or_else(|| "default".to_string())
}

fn env_nonempty(key: &str) -> Option<String> {
  std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Everything a core operation needs: the shared store and the content store.
pub struct AppContext {
  pub paths: MinionPaths,
  pub config: MinionConfig,
  pub store: Store,
  pub content: Box<dyn ContentStore>,
}

impl AppContext {
  /// Open the store and filesystem content store described by `paths`.
  ///
  /// # Errors
  /// Returns an error if the database cannot be opened or migrated.
  pub fn open(paths: MinionPaths, config: MinionConfig) -> Result<Self> {
    let store = Store::open(paths.db_path(), config.store_options())
      .with_context(|| format!("failed to open store at {}", paths.db_path().display()))?;
    let content = Box::new(FsContentStore::new(paths.content_root()));
    Ok(Self {
      paths,
      config,
      store,
      content,
    })
  }

  /// Load config for `cwd`, resolve paths and open everything.
  ///
  /// # Errors
  /// Returns an error if config loading, path resolution or opening the store fails.
  pub fn from_cwd(cwd: &Path) -> Result<Self> {
    let config = load_config(cwd)?;
    let paths = MinionPaths::resolve(&config, cwd)?;
    Self::open(paths, config)
  }
}

fn merge_values(base: &mut TomlValue, overlay: TomlValue) {
  match (base, overlay) {
    (TomlValue::Table(base_tbl), TomlValue::Table(overlay_tbl)) => {
      for (k, v) in overlay_tbl {
        match base_tbl.get_mut(&k) {
          Some(existing) => merge_values(existing, v),
          None => {
            base_tbl.insert(k, v);
          }
        }
      }
    }
    // Scalars: replace last-wins
    (base_slot, new_v) => *base_slot = new_v,
  }
}

fn section_keys(table: &toml::Table, section: &str, known: &[&str], file_path: &Path) {
  let Some(TomlValue::Table(inner)) = table.get(section) else {
    return;
  };
  for key in inner.keys() {
    if !known.contains(&key.as_str()) {
      eprintln!(
        "{}: unknown config key '{}.{}' in {} (known keys: {})",
        "warning".yellow(),
        section,
        key,
        file_path.display(),
        known.join(", ")
      );
    }
  }
}

/// Warn about unknown keys in a parsed TOML config file.
fn warn_unknown_keys(val: &TomlValue, file_path: &Path) {
  let TomlValue::Table(table) = val else {
    return;
  };

  for key in table.keys() {
    if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
      eprintln!(
        "{}: unknown config key '{}' in {} (did you mean one of: {}?)",
        "warning".yellow(),
        key,
        file_path.display(),
        KNOWN_TOP_LEVEL_KEYS.join(", ")
      );
    }
  }

  section_keys(table, "store", KNOWN_STORE_KEYS, file_path);
  section_keys(table, "content", KNOWN_CONTENT_KEYS, file_path);
  section_keys(table, "docs", KNOWN_DOCS_KEYS, file_path);
  section_keys(table, "history", KNOWN_HISTORY_KEYS, file_path);
}

fn merge_file(merged: &mut TomlValue, path: &Path) -> Result<()> {
  let data =
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let val: TomlValue =
    toml::from_str(&data).with_context(|| format!("invalid TOML in {}", path.display()))?;
  warn_unknown_keys(&val, path);
  merge_values(merged, val);
  Ok(())
}

/// Load and merge configuration from defaults, global, and project files.
///
/// # Errors
/// Returns an error if any of the config files cannot be read or parsed
/// as valid TOML.
pub fn load_config(cwd: &Path) -> Result<MinionConfig> {
  let mut merged: TomlValue =
    toml::from_str(DEFAULT_TOML).context("invalid embedded default config")?;

  let xdg = xdg::BaseDirectories::with_prefix(XDG_PREFIX);
  if let Some(global_path) = xdg.find_config_file(CONFIG_FILE) {
    merge_file(&mut merged, &global_path)?;
  }

  let project_cfg = cwd.join(PROJECT_DIR).join(CONFIG_FILE);
  if project_cfg.exists() {
    merge_file(&mut merged, &project_cfg)?;
  }

  let merged_str = toml::to_string(&merged).context("failed to serialize merged config")?;
  let cfg: MinionConfig = toml::from_str(&merged_str).context("failed to parse merged config")?;
  Ok(cfg)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use temp_env::with_vars;

  #[test]
  #[serial]
  fn defaults_fill_store_options() {
    let dir = tempfile::tempdir().expect("temp dir");
    let xdg = tempfile::tempdir().expect("temp dir xdg");
    with_vars(
      [("XDG_CONFIG_HOME", Some(xdg.path().display().to_string()))],
      || {
        let cfg = load_config(dir.path()).expect("load");
        assert_eq!(cfg.store_options(), StoreOptions::default());
        assert_eq!(cfg.history_count(), 20);
        assert!(cfg.store.path.is_none());
      },
    );
  }

  #[test]
  #[serial]
  fn env_db_path_wins_over_config() {
    let dir = tempfile::tempdir().expect("temp dir");
    let env_db = dir.path().join("env").join("comms.db");
    with_vars(
      [
        (ENV_DB_PATH, Some(env_db.display().to_string())),
        (ENV_DOCS_DIR, None),
      ],
      || {
        let cfg = MinionConfig {
          store: StoreConfig {
            path: Some("cfg.db".to_string()),
            ..Default::default()
          },
          ..Default::default()
        };
        let paths = MinionPaths::resolve(&cfg, dir.path()).expect("resolve");
        assert_eq!(paths.db_path(), env_db.as_path());
        assert_eq!(paths.content_root(), dir.path().join("env").as_path());
        assert!(paths.docs_dir().is_none());
      },
    );
  }

  #[test]
  #[serial]
  fn default_db_path_uses_project_under_xdg_data() {
    let dir = tempfile::tempdir().expect("temp dir");
    let data = tempfile::tempdir().expect("temp dir data");
    with_vars(
      [
        (ENV_DB_PATH, None),
        (ENV_PROJECT, Some("raid".to_string())),
        ("XDG_DATA_HOME", Some(data.path().display().to_string())),
      ],
      || {
        let paths = MinionPaths::resolve(&MinionConfig::default(), dir.path()).expect("resolve");
        assert_eq!(
          paths.db_path(),
          data.path().join("minion-comms/raid/minion.db").as_path()
        );
        assert_eq!(paths.content_root(), data.path().join("minion-comms/raid").as_path());
      },
    );
  }
}
