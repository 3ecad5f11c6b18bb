mod common;

use std::thread;
use std::time::Duration;

use anyhow::Result;
use common::TestEnv;
use minion_comms::model::{AgentClass, FlagKey, Transport};
use minion_comms::monitoring::{self, Activity};
use minion_comms::tasks::{self, NewTask};
use minion_comms::{claims, mailbox, registry};

fn task_for(env: &TestEnv, title: &str, assignee: &str) -> Result<i64> {
  let spec = env.write_file(&format!("specs/{title}.md"), title)?;
  let id = tasks::create_task(
    &env.ctx,
    "cap",
    &NewTask {
      title: title.to_string(),
      spec_ref: spec,
      zone: Some("frontend".to_string()),
      ..NewTask::default()
    },
  )?
  .task_id;
  tasks::assign_task(&env.ctx, "cap", id, assignee)?;
  Ok(id)
}

#[test]
fn party_status_shows_claims_and_tasks() -> Result<()> {
  let env = TestEnv::new()?;
  env.with_lead()?;
  env.agent("cod1", AgentClass::Coder)?;
  claims::claim_file(&env.ctx, "cod1", "src/lexer.rs")?;
  let id = task_for(&env, "lexer", "cod1")?;

  let party = monitoring::party_status(&env.ctx, "cap")?;
  assert_eq!(party.len(), 2);
  let cod1 = party
    .iter()
    .find(|m| m.view.agent.name == "cod1")
    .ok_or_else(|| anyhow::anyhow!("cod1 missing"))?;
  assert_eq!(cod1.claimed_files, vec!["src/lexer.rs".to_string()]);
  assert_eq!(cod1.tasks.len(), 1);
  assert_eq!(cod1.tasks[0].id, id);

  assert!(monitoring::party_status(&env.ctx, "cod1").unwrap_err().is_blocked());
  Ok(())
}

#[test]
fn sitrep_collects_the_whole_picture() -> Result<()> {
  let env = TestEnv::new()?;
  env.with_lead()?;
  env.agent("cod1", AgentClass::Coder)?;
  env.agent("cod2", AgentClass::Coder)?;
  registry::hand_off_zone(&env.ctx, "cod1", &["cod2".to_string()], "parser")?;
  claims::claim_file(&env.ctx, "cod2", "src/parser.rs")?;
  task_for(&env, "parser", "cod2")?;
  mailbox::send(&env.ctx, "cap", "all", "stand_down after this", &[])?;

  let report = monitoring::sitrep(&env.ctx)?;
  assert_eq!(report.agents.len(), 3);
  assert_eq!(report.active_tasks.len(), 1);
  assert_eq!(report.zones.len(), 1);
  assert_eq!(report.zones[0].zone, "parser");
  assert_eq!(report.zones[0].agent, "cod2");
  assert_eq!(report.claims.len(), 1);
  assert_eq!(report.flags.len(), 1);
  assert_eq!(report.flags[0].key, FlagKey::StandDown.as_str());
  assert!(report.battle_plan.is_some());
  assert_eq!(report.recent_messages.len(), 1);
  assert_eq!(
    report.recent_messages[0].content.as_deref(),
    Some("stand_down after this")
  );
  Ok(())
}

#[test]
fn check_activity_reports_dragging_tasks() -> Result<()> {
  let env = TestEnv::new()?;
  env.with_lead()?;
  env.agent("cod1", AgentClass::Coder)?;
  claims::claim_file(&env.ctx, "cod1", "src/lexer.rs")?;
  let id = task_for(&env, "lexer", "cod1")?;
  for _ in 0..4 {
    tasks::update_task(&env.ctx, "cod1", id, &tasks::TaskUpdate::default())?;
  }

  let report = monitoring::check_activity(&env.ctx, "cod1")?;
  assert_eq!(report.activity, Activity::Active);
  assert_eq!(report.last_seen_mins_ago, 0);
  assert_eq!(report.claimed_files, vec!["src/lexer.rs".to_string()]);
  assert_eq!(report.tasks.len(), 1);
  assert!(report.tasks[0].dragging);

  assert!(monitoring::check_activity(&env.ctx, "ghost").unwrap_err().is_not_found());
  Ok(())
}

#[test]
fn freshness_without_context_marks_everything_stale() -> Result<()> {
  let env = TestEnv::new()?;
  registry::register(&env.ctx, "cap", AgentClass::Lead, None, None, Transport::Terminal)?;
  let existing = env.write_file("src/lib.rs", "")?;
  let missing = env.path().join("src/gone.rs").display().to_string();

  let report = monitoring::check_freshness(&env.ctx, "cap", "cap", &[existing, missing])?;
  assert!(report.context_updated_at.is_none());
  assert_eq!(report.stale_count, 2);
  assert!(report.note.is_some());
  assert!(report.files[0].exists);
  assert!(!report.files[1].exists);
  Ok(())
}

#[test]
fn freshness_compares_against_context_update() -> Result<()> {
  let env = TestEnv::new()?;
  registry::register(&env.ctx, "cap", AgentClass::Lead, None, None, Transport::Terminal)?;
  let before = env.write_file("src/old.rs", "old")?;
  thread::sleep(Duration::from_millis(50));
  registry::set_context(&env.ctx, "cap", "read old.rs", None, None)?;
  thread::sleep(Duration::from_millis(50));
  let after = env.write_file("src/new.rs", "new")?;
  let missing = env.path().join("src/gone.rs").display().to_string();

  let report = monitoring::check_freshness(&env.ctx, "cap", "cap", &[before, after, missing])?;
  let stale: Vec<bool> = report.files.iter().map(|f| f.stale).collect();
  assert_eq!(stale, vec![false, true, false]);
  assert_eq!(report.stale_count, 1);
  assert!(report.note.is_none());

  env.agent("cod1", AgentClass::Coder)?;
  assert!(monitoring::check_freshness(&env.ctx, "cod1", "cod1", &[]).unwrap_err().is_blocked());
  Ok(())
}

#[test]
fn lead_checks_freshness_of_another_agent() -> Result<()> {
  let env = TestEnv::new()?;
  registry::register(&env.ctx, "cap", AgentClass::Lead, None, None, Transport::Terminal)?;
  registry::register(&env.ctx, "cod1", AgentClass::Coder, None, None, Transport::Terminal)?;
  let before = env.write_file("src/lexer.rs", "old")?;
  thread::sleep(Duration::from_millis(50));
  registry::set_context(&env.ctx, "cod1", "read lexer.rs", None, None)?;
  thread::sleep(Duration::from_millis(50));
  let after = env.write_file("src/parser.rs", "new")?;

  // The lead never set a context; the coder's timestamp is what counts.
  let report = monitoring::check_freshness(&env.ctx, "cap", "cod1", &[before, after.clone()])?;
  assert_eq!(report.agent, "cod1");
  assert!(report.context_updated_at.is_some());
  let stale: Vec<bool> = report.files.iter().map(|f| f.stale).collect();
  assert_eq!(stale, vec![false, true]);
  assert!(report.note.is_none());

  let err = monitoring::check_freshness(&env.ctx, "cod1", "cod1", &[after.clone()]).unwrap_err();
  assert!(err.is_blocked());
  let err = monitoring::check_freshness(&env.ctx, "cap", "ghost", &[after]).unwrap_err();
  assert!(err.is_not_found());
  Ok(())
}
