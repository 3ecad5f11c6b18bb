/// Token styling helpers.
///
/// The `t` module stands for "tokens". Use these helpers to style
/// specific values inside human-mode output consistently across the CLI.
pub mod t {
  use std::fmt::Display;

  use owo_colors::OwoColorize as _;
  pub fn id(value: impl Display) -> String {
    format!("{}", value.to_string().blue())
  }

  pub fn path(p: impl Display) -> String {
    format!("{}", p.to_string().cyan())
  }

  /// Agent names.
  pub fn name(name: impl Display) -> String {
    format!("{}", name.to_string().magenta())
  }

  pub fn ok(s: impl Display) -> String {
    format!("{}", s.to_string().green())
  }

  pub fn warn(s: impl Display) -> String {
    format!("{}", s.to_string().yellow())
  }

  pub fn err(s: impl Display) -> String {
    format!("{}", s.to_string().red())
  }
}

// Human-mode output. With a capture buffer installed the macros push into it
// instead of printing. Use `t::*` to highlight tokens inside info lines.

use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
  Info,
  Success,
  Warn,
  Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
  pub level: LogLevel,
  /// Rendered text, ANSI styling preserved.
  pub ansi: String,
}

static CAPTURE: Mutex<Option<Vec<LogLine>>> = Mutex::new(None);

/// Start collecting emitted lines instead of printing them.
pub fn start_capture() {
  *CAPTURE.lock() = Some(Vec::new());
}

/// Stop collecting and return everything captured so far.
pub fn take_capture() -> Vec<LogLine> {
  CAPTURE.lock().take().unwrap_or_default()
}

/// Tint the whole line by level (info stays neutral) and route it.
pub fn emit(level: LogLevel, text: String) {
  let ansi = match level {
    LogLevel::Info => text,
    LogLevel::Success => t::ok(text),
    LogLevel::Warn => t::warn(text),
    LogLevel::Error => t::err(text),
  };
  let mut capture = CAPTURE.lock();
  if let Some(lines) = capture.as_mut() {
    lines.push(LogLine { level, ansi });
    return;
  }
  drop(capture);
  match level {
    LogLevel::Info | LogLevel::Success => anstream::println!("{ansi}"),
    LogLevel::Warn | LogLevel::Error => anstream::eprintln!("{ansi}"),
  }
}

#[macro_export]
macro_rules! log_info {
  ($($arg:tt)+) => {
    $crate::utils::log::emit($crate::utils::log::LogLevel::Info, format!($($arg)+))
  };
}

#[macro_export]
macro_rules! log_success {
  ($($arg:tt)+) => {
    $crate::utils::log::emit($crate::utils::log::LogLevel::Success, format!($($arg)+))
  };
}

#[macro_export]
macro_rules! log_warn {
  ($($arg:tt)+) => {
    $crate::utils::log::emit($crate::utils::log::LogLevel::Warn, format!($($arg)+))
  };
}

#[macro_export]
macro_rules! log_error {
  ($($arg:tt)+) => {
    $crate::utils::log::emit($crate::utils::log::LogLevel::Error, format!($($arg)+))
  };
}
