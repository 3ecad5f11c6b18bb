mod common;

use anyhow::Result;
use common::TestEnv;
use minion_comms::model::{AgentClass, Transport};
use minion_comms::registry::{self, HpReading, Signal};
use minion_comms::tasks::{self, NewTask};
use minion_comms::{claims, mailbox};

#[test]
fn reregister_updates_class_without_duplicate() -> Result<()> {
  let env = TestEnv::new()?;
  registry::register(&env.ctx, "cod1", AgentClass::Coder, Some("claude-opus-4-6"), Some("first"), Transport::Terminal)?;
  let res = registry::register(&env.ctx, "cod1", AgentClass::Builder, None, Some(" "), Transport::Daemon)?;

  assert_eq!(res.class, AgentClass::Builder);
  assert_eq!(res.model.as_deref(), Some("claude-opus-4-6"));
  assert_eq!(res.description.as_deref(), Some("first"));

  let agents = registry::who(&env.ctx)?;
  let matching: Vec<_> = agents.iter().filter(|v| v.agent.name == "cod1").collect();
  assert_eq!(matching.len(), 1);
  assert_eq!(matching[0].agent.agent_class, AgentClass::Builder);
  assert_eq!(matching[0].agent.transport, Transport::Daemon);
  assert_eq!(matching[0].agent.status.as_deref(), Some("waiting for work"));
  Ok(())
}

#[test]
fn register_rejects_disallowed_model_and_bad_names() -> Result<()> {
  let env = TestEnv::new()?;
  let err = registry::register(&env.ctx, "cod1", AgentClass::Coder, Some("gpt-2"), None, Transport::Terminal)
    .unwrap_err();
  assert!(err.is_invalid());

  // Unrestricted classes accept any model.
  registry::register(&env.ctx, "orc", AgentClass::Oracle, Some("gpt-2"), None, Transport::Terminal)?;

  let err = registry::register(&env.ctx, "all", AgentClass::Coder, None, None, Transport::Terminal)
    .unwrap_err();
  assert!(err.is_invalid());
  Ok(())
}

#[test]
fn register_returns_class_tools_and_triggers() -> Result<()> {
  let env = TestEnv::new()?;
  let res = registry::register(&env.ctx, "orc", AgentClass::Oracle, None, None, Transport::Terminal)?;
  let tools: Vec<&str> = res.tools.iter().map(|op| op.as_str()).collect();
  assert!(tools.contains(&"send"));
  assert!(!tools.contains(&"create-task"));
  assert!(!tools.contains(&"claim-file"));
  assert_eq!(res.triggers.len(), 8);
  assert!(res.onboarding.is_none());
  Ok(())
}

#[test]
fn onboarding_joins_common_and_class_docs() -> Result<()> {
  let env = TestEnv::new()?;
  let docs = env.path().join("docs");
  std::fs::create_dir_all(&docs)?;
  std::fs::write(docs.join("protocol-common.md"), "COMMON")?;
  std::fs::write(docs.join("protocol-coder.md"), "CODER")?;
  let paths = minion_comms::config::MinionPaths::new(env.db_path(), env.path().join("content"))
    .with_docs_dir(&docs);
  let ctx = minion_comms::config::AppContext::open(paths, Default::default())?;

  let res = registry::register(&ctx, "cod1", AgentClass::Coder, None, None, Transport::Terminal)?;
  assert_eq!(res.onboarding.as_deref(), Some("COMMON\n\n---\n\nCODER"));
  Ok(())
}

#[test]
fn deregister_releases_claims_and_leaves_waitlists() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cod1", AgentClass::Coder)?;
  env.agent("cod2", AgentClass::Coder)?;
  claims::claim_file(&env.ctx, "cod1", "src/a.rs")?;
  claims::claim_file(&env.ctx, "cod1", "src/b.rs")?;
  claims::claim_file(&env.ctx, "cod2", "src/c.rs")?;
  // cod1 queues on c, cod2 queues on a.
  assert!(claims::claim_file(&env.ctx, "cod1", "src/c.rs").unwrap_err().is_blocked());
  assert!(claims::claim_file(&env.ctx, "cod2", "src/a.rs").unwrap_err().is_blocked());

  let res = registry::deregister(&env.ctx, "cod1")?;
  assert_eq!(res.released_claims, 2);
  assert_eq!(res.waitlist_notify, vec!["src/a.rs -> cod2 waiting".to_string()]);

  let remaining = claims::get_claims(&env.ctx, None)?;
  assert_eq!(remaining.len(), 1);
  assert_eq!(remaining[0].claim.file_path, "src/c.rs");
  assert!(remaining[0].waitlist.is_empty());

  assert!(registry::deregister(&env.ctx, "cod1").unwrap_err().is_not_found());
  Ok(())
}

#[test]
fn rename_repoints_messages() -> Result<()> {
  let env = TestEnv::new()?;
  env.with_lead()?;
  env.agent("cod1", AgentClass::Coder)?;
  mailbox::send(&env.ctx, "cap", "cod1", "hello", &[])?;

  registry::rename(&env.ctx, "cap", "cod1", "cod9")?;
  let inbox = mailbox::check_inbox(&env.ctx, "cod9")?;
  assert_eq!(inbox.messages.len(), 1);
  assert_eq!(inbox.messages[0].content.as_deref(), Some("hello"));

  env.agent("cod2", AgentClass::Coder)?;
  let err = registry::rename(&env.ctx, "cap", "cod9", "cod2").unwrap_err();
  assert!(err.is_blocked());
  let err = registry::rename(&env.ctx, "cap", "ghost", "cod3").unwrap_err();
  assert!(err.is_not_found());
  Ok(())
}

#[test]
fn rename_repoints_copies_receipts_claims_and_tasks() -> Result<()> {
  let env = TestEnv::new()?;
  env.with_lead()?;
  env.agent("cod1", AgentClass::Coder)?;
  env.agent("cod2", AgentClass::Coder)?;
  mailbox::send(&env.ctx, "cap", "all", "rally", &[])?;
  mailbox::check_inbox(&env.ctx, "cod1")?;
  mailbox::check_inbox(&env.ctx, "cod2")?;
  mailbox::send(&env.ctx, "cod2", "cod1", "parser is yours", &[])?;

  claims::claim_file(&env.ctx, "cod1", "src/a.rs")?;
  claims::claim_file(&env.ctx, "cod2", "src/b.rs")?;
  assert!(claims::claim_file(&env.ctx, "cod1", "src/b.rs").unwrap_err().is_blocked());
  let spec = env.write_file("specs/parser.md", "parse it")?;
  let task_id = tasks::create_task(
    &env.ctx,
    "cap",
    &NewTask {
      title: "parser".to_string(),
      spec_ref: spec,
      ..NewTask::default()
    },
  )?
  .task_id;
  tasks::assign_task(&env.ctx, "cap", task_id, "cod1")?;

  registry::rename(&env.ctx, "cap", "cod1", "cod9")?;

  let lead_inbox = mailbox::check_inbox(&env.ctx, "cap")?;
  assert_eq!(lead_inbox.messages.len(), 1);
  assert_eq!(lead_inbox.messages[0].cc_note.as_deref(), Some("[CC] originally to: cod9"));
  // The broadcast was already read under the old name.
  let inbox = mailbox::check_inbox(&env.ctx, "cod9")?;
  let bodies: Vec<_> = inbox.messages.iter().filter_map(|m| m.content.as_deref()).collect();
  assert_eq!(bodies, vec!["parser is yours"]);

  let mine = claims::get_claims(&env.ctx, Some("cod9"))?;
  assert_eq!(mine.len(), 1);
  assert_eq!(mine[0].claim.file_path, "src/a.rs");
  let theirs = claims::get_claims(&env.ctx, Some("cod2"))?;
  assert_eq!(theirs[0].waitlist, vec!["cod9".to_string()]);
  assert_eq!(tasks::get_task(&env.ctx, task_id)?.task.assigned_to.as_deref(), Some("cod9"));

  let gone = registry::deregister(&env.ctx, "cod9")?;
  assert_eq!(gone.released_claims, 1);
  Ok(())
}

#[test]
fn negative_hp_readings_are_invalid() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cod1", AgentClass::Coder)?;
  let bad = HpReading {
    input_tokens: -5,
    limit: 100_000,
    ..Default::default()
  };
  assert!(registry::update_hp(&env.ctx, "cod1", bad).unwrap_err().is_invalid());

  let huge = HpReading {
    input_tokens: i64::MAX,
    output_tokens: 1,
    limit: 200_000,
    ..Default::default()
  };
  let res = registry::update_hp(&env.ctx, "cod1", huge)?;
  assert!(res.hp.starts_with("0% HP"));
  assert_eq!(res.alerts, vec![50, 25, 10]);
  Ok(())
}

#[test]
fn rename_rechecks_caller_class() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cod1", AgentClass::Coder)?;
  let err = registry::rename(&env.ctx, "cod1", "cod1", "cod2").unwrap_err();
  assert!(err.is_blocked());
  assert!(err.to_string().contains("Only lead agents"));
  Ok(())
}

#[test]
fn update_hp_fires_alerts_once() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cod1", AgentClass::Coder)?;
  let reading = HpReading {
    input_tokens: 80_000,
    output_tokens: 0,
    limit: 100_000,
    ..Default::default()
  };
  let first = registry::update_hp(&env.ctx, "cod1", reading)?;
  assert_eq!(first.alerts, vec![50, 25]);
  assert!(first.hp.starts_with("20% HP"));

  let second = registry::update_hp(&env.ctx, "cod1", reading)?;
  assert!(second.alerts.is_empty());

  let turn = HpReading {
    turn_input: Some(10_000),
    turn_output: Some(0),
    ..reading
  };
  let recovered = registry::update_hp(&env.ctx, "cod1", turn)?;
  assert!(recovered.hp.starts_with("90% HP"));
  assert!(recovered.alerts.is_empty());

  assert!(registry::update_hp(&env.ctx, "ghost", reading).unwrap_err().is_not_found());
  Ok(())
}

#[test]
fn zone_hand_off_moves_zone_and_logs() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cod1", AgentClass::Coder)?;
  env.agent("cod2", AgentClass::Coder)?;
  let res = registry::hand_off_zone(&env.ctx, "cod1", &["cod2".to_string()], "parser")?;
  assert!(res.raid_log_id > 0);

  let agents = registry::who(&env.ctx)?;
  let zone_of = |name: &str| {
    agents
      .iter()
      .find(|v| v.agent.name == name)
      .and_then(|v| v.agent.current_zone.clone())
  };
  assert_eq!(zone_of("cod2").as_deref(), Some("parser"));
  assert_eq!(zone_of("cod1"), None);

  let err = registry::hand_off_zone(&env.ctx, "cod1", &["ghost".to_string()], "x").unwrap_err();
  assert!(err.is_not_found());
  let err = registry::hand_off_zone(&env.ctx, "cod1", &[], "x").unwrap_err();
  assert!(err.is_invalid());
  Ok(())
}

#[test]
fn retire_then_signal_then_reregister_clears_it() -> Result<()> {
  let env = TestEnv::new()?;
  env.agent("cap", AgentClass::Lead)?;
  env.agent("cod1", AgentClass::Coder)?;

  let res = registry::retire_agent(&env.ctx, "cap", "cod1")?;
  assert_eq!(res.agent, "cod1");
  assert_eq!(registry::pending_signal(&env.ctx, "cod1")?.signal, Some(Signal::Retire));

  env.agent("cod1", AgentClass::Coder)?;
  assert_eq!(registry::pending_signal(&env.ctx, "cod1")?.signal, None);

  mailbox::stand_down(&env.ctx, "cap")?;
  assert_eq!(registry::pending_signal(&env.ctx, "cod1")?.signal, Some(Signal::StandDown));
  Ok(())
}

#[test]
fn set_status_and_context_need_a_registered_agent() -> Result<()> {
  let env = TestEnv::new()?;
  assert!(registry::set_status(&env.ctx, "ghost", "busy").unwrap_err().is_not_found());
  assert!(registry::set_context(&env.ctx, "ghost", "x", None, None).unwrap_err().is_not_found());

  env.agent("cod1", AgentClass::Coder)?;
  let res = registry::set_context(&env.ctx, "cod1", "reading parser", Some(40_000), Some(200_000))?;
  assert_eq!(res.hp.as_deref(), Some("80% HP [40k/200k] - Healthy"));
  let view = registry::who(&env.ctx)?;
  assert!(!view[0].context_stale);
  Ok(())
}
