mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use anyhow::Result;
use common::TestEnv;
use minion_comms::claims::{self, ClaimStatus};
use minion_comms::model::{AgentClass, RaidPriority};
use minion_comms::warroom;

#[test]
fn claim_block_release_reclaim() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cod1", AgentClass::Coder)?;
  env.agent("cod2", AgentClass::Coder)?;

  let first = claims::claim_file(&env.ctx, "cod1", "src/parser.rs")?;
  assert_eq!(first.status, ClaimStatus::Claimed);
  let again = claims::claim_file(&env.ctx, "cod1", "src/parser.rs")?;
  assert_eq!(again.status, ClaimStatus::AlreadyClaimed);

  let err = claims::claim_file(&env.ctx, "cod2", "src/parser.rs").unwrap_err();
  assert!(err.is_blocked());
  assert!(
    err
      .to_string()
      .contains("src/parser.rs is claimed by cod1. You are #1 on the waitlist.")
  );

  let listing = claims::get_claims(&env.ctx, Some("cod1"))?;
  assert_eq!(listing.len(), 1);
  assert_eq!(listing[0].waitlist, vec!["cod2".to_string()]);

  let err = claims::release_file(&env.ctx, "cod2", "src/parser.rs", false).unwrap_err();
  assert!(err.is_blocked());

  let released = claims::release_file(&env.ctx, "cod1", "src/parser.rs", false)?;
  assert_eq!(released.holder, "cod1");
  assert_eq!(released.next_waiting.as_deref(), Some("cod2"));
  assert!(released.force_released_by.is_none());

  // Release does not hand the claim over.
  assert!(claims::get_claims(&env.ctx, None)?.is_empty());
  claims::claim_file(&env.ctx, "cod2", "src/parser.rs")?;
  let listing = claims::get_claims(&env.ctx, None)?;
  assert_eq!(listing[0].claim.agent_name, "cod2");
  assert!(listing[0].waitlist.is_empty());
  Ok(())
}

#[test]
fn waitlist_positions_are_fifo() -> Result<()> {
  let env = TestEnv::new()?;
  for name in ["cod1", "cod2", "cod3"] {
    env.agent(name, AgentClass::Coder)?;
  }
  claims::claim_file(&env.ctx, "cod1", "Cargo.toml")?;
  let second = claims::claim_file(&env.ctx, "cod2", "Cargo.toml").unwrap_err();
  let third = claims::claim_file(&env.ctx, "cod3", "Cargo.toml").unwrap_err();
  assert!(second.to_string().ends_with("You are #1 on the waitlist."));
  assert!(third.to_string().ends_with("You are #2 on the waitlist."));
  // Asking again keeps the place in line.
  let repeat = claims::claim_file(&env.ctx, "cod3", "Cargo.toml").unwrap_err();
  assert!(repeat.to_string().ends_with("You are #2 on the waitlist."));
  Ok(())
}

#[test]
fn only_editors_may_claim() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("orc", AgentClass::Oracle)?;
  let err = claims::claim_file(&env.ctx, "orc", "src/lib.rs").unwrap_err();
  assert!(err.is_blocked());
  assert!(claims::claim_file(&env.ctx, "ghost", "src/lib.rs").unwrap_err().is_blocked());
  Ok(())
}

#[test]
fn lead_force_release_is_logged() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cap", AgentClass::Lead)?;
  env.agent("cod1", AgentClass::Coder)?;
  claims::claim_file(&env.ctx, "cod1", "src/main.rs")?;

  let released = claims::release_file(&env.ctx, "cap", "src/main.rs", true)?;
  assert_eq!(released.force_released_by.as_deref(), Some("cap"));
  assert_eq!(released.holder, "cod1");

  let log = warroom::get_raid_log(&env.ctx, Some(RaidPriority::Normal), Some("cap"), 10)?;
  assert_eq!(log.len(), 1);
  assert_eq!(log[0].content.as_deref(), Some("Force-released src/main.rs from cod1."));

  assert!(claims::release_file(&env.ctx, "cap", "src/main.rs", true).unwrap_err().is_not_found());
  Ok(())
}

#[test]
fn coder_cannot_force_release() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cod1", AgentClass::Coder)?;
  env.agent("cod2", AgentClass::Coder)?;
  claims::claim_file(&env.ctx, "cod1", "src/main.rs")?;
  let err = claims::release_file(&env.ctx, "cod2", "src/main.rs", true).unwrap_err();
  assert!(err.to_string().contains("Only lead agents can force-release"));
  Ok(())
}

#[test]
fn concurrent_claims_have_one_winner() -> Result<()> {
  let env = TestEnv::new()?;
  let names = ["cod1", "cod2", "cod3", "cod4"];
  for name in names {
    env.agent(name, AgentClass::Coder)?;
  }

  let barrier = Arc::new(Barrier::new(names.len()));
  let handles: Vec<_> = names
    .iter()
    .map(|name| -> Result<thread::JoinHandle<bool>> {
      let ctx = env.reopen()?;
      let barrier = Arc::clone(&barrier);
      let name = (*name).to_string();
      Ok(thread::spawn(move || {
        barrier.wait();
        claims::claim_file(&ctx, &name, "src/hot.rs").is_ok()
      }))
    })
    .collect::<Result<_>>()?;

  let winners = handles
    .into_iter()
    .map(|h| h.join().unwrap_or(false))
    .filter(|won| *won)
    .count();
  assert_eq!(winners, 1);

  let listing = claims::get_claims(&env.ctx, None)?;
  assert_eq!(listing.len(), 1);
  assert_eq!(listing[0].waitlist.len(), names.len() - 1);
  Ok(())
}
