//! Exclusive per-path file claims with a FIFO waitlist.
//!
//! The waitlist is a hint only: releasing a claim never hands it to the next
//! waiter. Waiters claim explicitly once they hear the path is free.

use log::{debug, info};
use rusqlite::{OptionalExtension as _, Transaction, params};
use serde::Serialize;

use crate::auth::{self, Operation};
use crate::config::AppContext;
use crate::error::{CommsError, Result};
use crate::model::{FileClaim, RaidPriority, WaitlistEntry};
use crate::store::require_agent;
use crate::store::time::{format_ts, now};
use crate::utils::error_messages;
use crate::warroom;

fn find_claim(tx: &Transaction<'_>, path: &str) -> Result<Option<FileClaim>> {
  Ok(
    tx.query_row(
      "SELECT file_path, agent_name, claimed_at FROM file_claims WHERE file_path = ?1",
      params![path],
      FileClaim::from_row,
    )
    .optional()?,
  )
}

/// Earliest waiter on `path` other than `except`.
pub(crate) fn next_waiter(tx: &Transaction<'_>, path: &str, except: &str) -> Result<Option<String>> {
  Ok(
    tx.query_row(
      "SELECT agent_name FROM file_waitlist
       WHERE file_path = ?1 AND agent_name != ?2
       ORDER BY added_at ASC, id ASC LIMIT 1",
      params![path, except],
      |row| row.get(0),
    )
    .optional()?,
  )
}

fn waitlist(tx: &Transaction<'_>, path: &str) -> Result<Vec<WaitlistEntry>> {
  let mut stmt = tx.prepare(
    "SELECT file_path, agent_name, added_at FROM file_waitlist
     WHERE file_path = ?1 ORDER BY added_at ASC, id ASC",
  )?;
  let rows = stmt.query_map(params![path], WaitlistEntry::from_row)?;
  Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
  Claimed,
  AlreadyClaimed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Claimed {
  pub status: ClaimStatus,
  pub file: String,
  pub agent: String,
}

enum ClaimOutcome {
  Granted(ClaimStatus),
  Held { holder: String, position: i64 },
}

/// Take the exclusive claim on `path`.
///
/// When another agent holds it the caller joins the waitlist (that part is
/// kept) and the call fails with `Blocked` naming the holder.
pub fn claim_file(ctx: &AppContext, agent: &str, path: &str) -> Result<Claimed> {
  debug!("claim {path} for {agent}");
  let outcome = ctx.store.write(|tx| {
    auth::authorize(tx, agent, Operation::ClaimFile)?;
    let stamp = format_ts(now());
    if let Some(claim) = find_claim(tx, path)? {
      if claim.agent_name == agent {
        return Ok(ClaimOutcome::Granted(ClaimStatus::AlreadyClaimed));
      }
      tx.execute(
        "INSERT OR IGNORE INTO file_waitlist (file_path, agent_name, added_at) VALUES (?1, ?2, ?3)",
        params![path, agent, stamp],
      )?;
      let position: i64 = tx.query_row(
        "SELECT COUNT(*) FROM file_waitlist
         WHERE file_path = ?1
           AND id <= (SELECT id FROM file_waitlist WHERE file_path = ?1 AND agent_name = ?2)",
        params![path, agent],
        |row| row.get(0),
      )?;
      return Ok(ClaimOutcome::Held {
        holder: claim.agent_name,
        position,
      });
    }
    tx.execute(
      "INSERT INTO file_claims (file_path, agent_name, claimed_at) VALUES (?1, ?2, ?3)",
      params![path, agent, stamp],
    )?;
    tx.execute(
      "DELETE FROM file_waitlist WHERE file_path = ?1 AND agent_name = ?2",
      params![path, agent],
    )?;
    Ok(ClaimOutcome::Granted(ClaimStatus::Claimed))
  })?;

  match outcome {
    ClaimOutcome::Granted(status) => {
      if status == ClaimStatus::Claimed {
        info!("{agent} claimed {path}");
      }
      Ok(Claimed {
        status,
        file: path.to_string(),
        agent: agent.to_string(),
      })
    }
    ClaimOutcome::Held { holder, position } => Err(CommsError::Blocked(
      error_messages::file_claimed_by(path, holder, position),
    )),
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Released {
  pub status: &'static str,
  pub file: String,
  /// Agent that held the claim.
  pub holder: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub force_released_by: Option<String>,
  /// First agent on the waitlist, for the caller to notify.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub next_waiting: Option<String>,
}

/// Drop the claim on `path`. Only the holder may release unless a lead forces it.
pub fn release_file(ctx: &AppContext, agent: &str, path: &str, force: bool) -> Result<Released> {
  debug!("release {path} by {agent} (force: {force})");
  let out = ctx.store.write(|tx| {
    let caller = require_agent(tx, agent)?;
    let claim = find_claim(tx, path)?
      .ok_or_else(|| CommsError::NotFound(error_messages::claim_not_found(path)))?;

    let forced = claim.agent_name != agent;
    if forced {
      if !force {
        return Err(CommsError::Blocked(error_messages::release_not_owner(
          path,
          &claim.agent_name,
        )));
      }
      auth::check_class(agent, caller.agent_class, Operation::ForceRelease)?;
    } else {
      auth::check_class(agent, caller.agent_class, Operation::ReleaseFile)?;
    }

    tx.execute("DELETE FROM file_claims WHERE file_path = ?1", params![path])?;
    if forced {
      let at = now();
      let entry = format!("Force-released {path} from {}.", claim.agent_name);
      warroom::append_raid(tx, ctx.content.as_ref(), agent, &entry, RaidPriority::Normal, at)?;
    }
    Ok(Released {
      status: "released",
      file: path.to_string(),
      next_waiting: next_waiter(tx, path, &claim.agent_name)?,
      force_released_by: forced.then(|| agent.to_string()),
      holder: claim.agent_name,
    })
  })?;
  match &out.force_released_by {
    Some(by) => info!("{by} force-released {path} from {}", out.holder),
    None => info!("{} released {path}", out.holder),
  }
  Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimView {
  #[serde(flatten)]
  pub claim: FileClaim,
  pub waitlist: Vec<String>,
}

/// Current claims, optionally for one agent, ordered by path.
pub fn get_claims(ctx: &AppContext, agent: Option<&str>) -> Result<Vec<ClaimView>> {
  ctx.store.read(|tx| {
    let claims = list_claims(tx, agent)?;
    claims
      .into_iter()
      .map(|claim| {
        let waitlist = waitlist(tx, &claim.file_path)?
          .into_iter()
          .map(|w| w.agent_name)
          .collect();
        Ok(ClaimView { claim, waitlist })
      })
      .collect()
  })
}

pub(crate) fn list_claims(tx: &Transaction<'_>, agent: Option<&str>) -> Result<Vec<FileClaim>> {
  let mut stmt = tx.prepare(
    "SELECT file_path, agent_name, claimed_at FROM file_claims
     WHERE ?1 IS NULL OR agent_name = ?1 ORDER BY file_path ASC",
  )?;
  let rows = stmt.query_map(params![agent], FileClaim::from_row)?;
  Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
