use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::auth::{self, Operation};
use crate::commands::Output;
use crate::log_info;
use crate::model::AgentClass;

#[derive(Debug, Args)]
pub struct ToolsArgs {
  /// Class to list; defaults to `MINION_CLASS`, then every class
  #[arg(long = "class")]
  pub class: Option<AgentClass>,
}

#[derive(Debug, Serialize)]
struct ClassTools {
  class: AgentClass,
  tools: Vec<Operation>,
}

pub fn run(out: Output, class: Option<AgentClass>) -> Result<()> {
  let classes: Vec<AgentClass> = match class {
    Some(c) => vec![c],
    None => AgentClass::ALL.to_vec(),
  };
  let listing: Vec<ClassTools> = classes
    .into_iter()
    .map(|class| ClassTools {
      class,
      tools: auth::tools_for_class(class),
    })
    .collect();
  out.emit(&listing, |list| {
    for entry in list {
      let names: Vec<&str> = entry.tools.iter().map(|op| op.as_str()).collect();
      log_info!("{}: {}", entry.class, names.join(", "));
    }
  })
}
