#![allow(dead_code)]
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use assert_cmd::Command;
use tempfile::{Builder, TempDir};

use minion_comms::config::{AppContext, ENV_CLASS, ENV_DB_PATH, MinionConfig, MinionPaths};
use minion_comms::model::{AgentClass, Transport};
use minion_comms::store::time::{format_ts, now};
use minion_comms::{registry, warroom};

/// Isolated database and content root in a temp directory.
pub struct TestEnv {
  temp: TempDir,
  pub ctx: AppContext,
}

impl TestEnv {
  pub fn new() -> Result<Self> {
    let temp = Builder::new().prefix("minion-test-").tempdir()?;
    let ctx = Self::open_ctx(temp.path())?;
    Ok(Self { temp, ctx })
  }

  fn open_ctx(root: &Path) -> Result<AppContext> {
    let paths = MinionPaths::new(root.join("minion.db"), root.join("content"));
    AppContext::open(paths, MinionConfig::default())
  }

  /// A second, independent connection to the same database.
  pub fn reopen(&self) -> Result<AppContext> {
    Self::open_ctx(self.temp.path())
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn db_path(&self) -> PathBuf {
    self.temp.path().join("minion.db")
  }

  /// Register `name` with a fresh context so send gates pass.
  pub fn agent(&self, name: &str, class: AgentClass) -> Result<()> {
    registry::register(&self.ctx, name, class, None, None, Transport::Terminal)?;
    registry::set_context(&self.ctx, name, "loaded", None, None)?;
    Ok(())
  }

  /// Lead `cap` with an active battle plan.
  pub fn with_lead(&self) -> Result<()> {
    self.agent("cap", AgentClass::Lead)?;
    warroom::set_battle_plan(&self.ctx, "cap", "Ship the parser")?;
    Ok(())
  }

  /// Write a file under the temp dir and return its absolute path.
  pub fn write_file(&self, rel: &str, body: &str) -> Result<String> {
    let path = self.temp.path().join(rel);
    if let Some(dir) = path.parent() {
      std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(path.display().to_string())
  }

  /// Move every message sent so far `hours` into the past.
  pub fn age_messages(&self, hours: i64) -> Result<()> {
    let stamp = format_ts(now() - chrono::TimeDelta::hours(hours));
    self
      .ctx
      .store
      .connection()
      .execute("UPDATE messages SET timestamp = ?1", [stamp])?;
    Ok(())
  }

  /// Row count of `table`.
  pub fn count(&self, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    Ok(self.ctx.store.connection().query_row(&sql, [], |row| row.get(0))?)
  }

  /// `minion` pointed at this environment's database.
  pub fn bin_cmd(&self) -> Result<Command> {
    let mut cmd = Command::cargo_bin("minion")?;
    cmd
      .current_dir(self.temp.path())
      .env(ENV_DB_PATH, self.db_path())
      .env_remove(ENV_CLASS)
      .env("XDG_CONFIG_HOME", self.temp.path().join("xdg-config"));
    Ok(cmd)
  }
}
