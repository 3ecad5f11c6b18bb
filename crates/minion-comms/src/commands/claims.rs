use anyhow::Result;
use clap::Args;

use crate::claims::{self, ClaimStatus};
use crate::commands::Output;
use crate::config::AppContext;
use crate::utils::log::t;
use crate::utils::term::print_table;
use crate::{log_info, log_success};

#[derive(Debug, Args)]
pub struct ClaimArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub file: String,
}

pub fn claim_file(ctx: &AppContext, out: Output, args: &ClaimArgs) -> Result<()> {
  let res = claims::claim_file(ctx, &args.agent, &args.file)?;
  out.emit(&res, |r| match r.status {
    ClaimStatus::Claimed => log_success!("{} claimed {}", r.agent, r.file),
    ClaimStatus::AlreadyClaimed => log_info!("{} already holds {}", t::name(&r.agent), t::path(&r.file)),
  })
}

#[derive(Debug, Args)]
pub struct ReleaseArgs {
  #[arg(long)]
  pub agent: String,
  #[arg(long)]
  pub file: String,
  /// Release another agent's claim (lead only)
  #[arg(long)]
  pub force: bool,
}

pub fn release_file(ctx: &AppContext, out: Output, args: &ReleaseArgs) -> Result<()> {
  let res = claims::release_file(ctx, &args.agent, &args.file, args.force)?;
  out.emit(&res, |r| {
    log_success!("Released {} (held by {})", r.file, r.holder);
    if let Some(next) = &r.next_waiting {
      log_info!("  {} is waiting for it", t::name(next));
    }
  })
}

#[derive(Debug, Args)]
pub struct GetClaimsArgs {
  /// Only claims held by this agent
  #[arg(long)]
  pub agent: Option<String>,
}

pub fn get_claims(ctx: &AppContext, out: Output, args: &GetClaimsArgs) -> Result<()> {
  let list = claims::get_claims(ctx, args.agent.as_deref())?;
  out.emit(&list, |views| {
    if views.is_empty() {
      log_info!("No active claims.");
      return;
    }
    let rows: Vec<Vec<String>> = views
      .iter()
      .map(|v| {
        vec![
          t::path(&v.claim.file_path),
          t::name(&v.claim.agent_name),
          v.claim.claimed_at.format("%H:%M:%S").to_string(),
          v.waitlist.join(", "),
        ]
      })
      .collect();
    print_table(&["FILE", "HOLDER", "SINCE", "WAITING"], &rows);
  })
}
