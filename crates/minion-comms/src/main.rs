use owo_colors::OwoColorize as _;
use serde_json::json;

use minion_comms::error::CommsError;

fn main() {
  let cli = minion_comms::parse();
  let human = cli.human;
  let filter = if cli.verbose { "debug" } else { "warn" };
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
    .format_timestamp_secs()
    .try_init();

  if let Err(err) = minion_comms::run(cli) {
    if human {
      anstream::eprintln!("{}", format!("{err:#}").red());
    } else {
      let kind = match err.downcast_ref::<CommsError>() {
        Some(e) => json!(e.kind()),
        None => json!("error"),
      };
      anstream::eprintln!("{}", json!({ "error": kind, "message": format!("{err:#}") }));
    }
    std::process::exit(1);
  }
}
