mod common;

use anyhow::Result;
use common::TestEnv;
use minion_comms::config::{AppContext, MinionPaths};
use minion_comms::model::{AgentClass, PlanStatus, RaidPriority};
use minion_comms::registry::{self, Signal};
use minion_comms::{claims, lifecycle, mailbox, warroom};

fn files(list: &[&str]) -> Vec<String> {
  list.iter().map(|f| f.to_string()).collect()
}

#[test]
fn fenix_down_records_the_notes() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cod1", AgentClass::Coder)?;

  let res = lifecycle::fenix_down(
    &env.ctx,
    "cod1",
    &files(&["notes/parser.md", " notes/lexer.md ", ""]),
    Some("parser half done"),
  )?;
  assert_eq!(res.status, "recorded");
  assert_eq!(res.files_count, 2);
  assert_eq!(env.count("fenix_down_records")?, 1);
  Ok(())
}

#[test]
fn fenix_down_needs_files_and_a_known_agent() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cod1", AgentClass::Coder)?;

  assert!(lifecycle::fenix_down(&env.ctx, "cod1", &[], None).unwrap_err().is_invalid());
  assert!(lifecycle::fenix_down(&env.ctx, "cod1", &files(&[" ", ""]), None)
    .unwrap_err()
    .is_invalid());
  assert!(lifecycle::fenix_down(&env.ctx, "ghost", &files(&["a.md"]), None)
    .unwrap_err()
    .is_blocked());
  assert_eq!(env.count("fenix_down_records")?, 0);
  Ok(())
}

#[test]
fn cold_start_hands_back_notes_once() -> Result<()> {
  let env = TestEnv::new()?;
  env.with_lead()?;
  env.agent("cod1", AgentClass::Coder)?;
  claims::claim_file(&env.ctx, "cod1", "src/parser.rs")?;
  mailbox::send(&env.ctx, "cap", "cod1", "parser is yours", &[])?;
  lifecycle::fenix_down(&env.ctx, "cod1", &files(&["notes/a.md", "notes/b.md"]), Some("m"))?;

  let brief = lifecycle::cold_start(&env.ctx, "cod1")?;
  assert_eq!(brief.agent_name, "cod1");
  assert_eq!(brief.agent_class, AgentClass::Coder);
  let plan = brief.battle_plan.ok_or_else(|| anyhow::anyhow!("plan missing"))?;
  assert_eq!(plan.content.as_deref(), Some("Ship the parser"));
  assert_eq!(brief.fenix_down_records.len(), 1);
  assert_eq!(brief.fenix_down_records[0].files, files(&["notes/a.md", "notes/b.md"]));
  assert_eq!(brief.fenix_down_records[0].manifest, "m");
  assert_eq!(brief.claimed_files, files(&["src/parser.rs"]));
  assert_eq!(brief.unread_messages, 1);
  assert!(brief.briefing_files.is_empty());

  let again = lifecycle::cold_start(&env.ctx, "cod1")?;
  assert!(again.fenix_down_records.is_empty());
  Ok(())
}

#[test]
fn cold_start_lists_existing_protocol_docs() -> Result<()> {
  let env = TestEnv::new()?;
  let docs = env.path().join("docs");
  std::fs::create_dir_all(&docs)?;
  std::fs::write(docs.join("protocol-common.md"), "COMMON")?;
  std::fs::write(docs.join("protocol-lead.md"), "LEAD")?;
  let paths = MinionPaths::new(env.db_path(), env.path().join("content")).with_docs_dir(&docs);
  let ctx = AppContext::open(paths, Default::default())?;
  env.agent("cod1", AgentClass::Coder)?;

  let brief = lifecycle::cold_start(&ctx, "cod1")?;
  assert_eq!(
    brief.briefing_files,
    vec![docs.join("protocol-common.md").display().to_string()]
  );
  Ok(())
}

#[test]
fn cold_start_of_unknown_agent_is_blocked() -> Result<()> {
  let env = TestEnv::new()?;
  assert!(lifecycle::cold_start(&env.ctx, "ghost").unwrap_err().is_blocked());
  Ok(())
}

#[test]
fn debrief_is_lead_only_and_needs_the_file() -> Result<()> {
  let env = TestEnv::new()?;
  env.with_lead()?;
  env.agent("cod1", AgentClass::Coder)?;
  let file = env.write_file("debriefs/session.md", "what happened")?;

  assert!(lifecycle::debrief(&env.ctx, "cod1", &file).unwrap_err().is_blocked());
  let missing = env.path().join("debriefs/nope.md").display().to_string();
  let err = lifecycle::debrief(&env.ctx, "cap", &missing).unwrap_err();
  assert!(err.is_invalid());
  assert!(err.to_string().contains("does not exist"));

  let res = lifecycle::debrief(&env.ctx, "cap", &file)?;
  assert_eq!(res.status, "filed");
  assert_eq!(res.debrief_file, file);
  let log = warroom::get_raid_log(&env.ctx, Some(RaidPriority::High), Some("cap"), 5)?;
  assert_eq!(log.len(), 1);
  assert_eq!(log[0].entry.id, res.raid_log_id);
  Ok(())
}

#[test]
fn end_session_requires_a_debrief() -> Result<()> {
  let env = TestEnv::new()?;
  env.with_lead()?;
  env.agent("cod1", AgentClass::Coder)?;

  let err = lifecycle::end_session(&env.ctx, "cap").unwrap_err();
  assert!(err.is_blocked());
  assert!(err.to_string().contains("debrief"));
  assert!(lifecycle::end_session(&env.ctx, "cod1").unwrap_err().is_blocked());

  let file = env.write_file("debriefs/session.md", "done")?;
  lifecycle::debrief(&env.ctx, "cap", &file)?;
  let res = lifecycle::end_session(&env.ctx, "cap")?;
  assert_eq!(res.status, "ended");
  assert_eq!(res.debrief_file, file);

  assert!(warroom::get_battle_plan(&env.ctx, PlanStatus::Active)?.is_empty());
  let done = warroom::get_battle_plan(&env.ctx, PlanStatus::Completed)?;
  assert_eq!(done[0].plan.id, res.plan_id);
  assert_eq!(registry::pending_signal(&env.ctx, "cod1")?.signal, Some(Signal::StandDown));
  Ok(())
}

#[test]
fn debrief_before_the_current_plan_does_not_count() -> Result<()> {
  let env = TestEnv::new()?;
  env.with_lead()?;
  let file = env.write_file("debriefs/old.md", "last time")?;
  lifecycle::debrief(&env.ctx, "cap", &file)?;
  std::thread::sleep(std::time::Duration::from_millis(5));
  warroom::set_battle_plan(&env.ctx, "cap", "Ship the lexer")?;

  let err = lifecycle::end_session(&env.ctx, "cap").unwrap_err();
  assert!(err.is_blocked());
  assert!(err.to_string().contains("debrief"));
  Ok(())
}

#[test]
fn end_session_without_a_plan_is_blocked() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cap", AgentClass::Lead)?;
  let file = env.write_file("debriefs/session.md", "done")?;
  lifecycle::debrief(&env.ctx, "cap", &file)?;
  assert!(lifecycle::end_session(&env.ctx, "cap").unwrap_err().is_blocked());
  Ok(())
}
