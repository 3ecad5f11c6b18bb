use std::sync::OnceLock;

use owo_colors::OwoColorize as _;
use regex::Regex;

fn ansi_regex() -> &'static Regex {
  static ANSI_RE: OnceLock<Regex> = OnceLock::new();
  ANSI_RE.get_or_init(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("valid ANSI regex"))
}

pub fn strip_ansi(input: &str) -> String {
  ansi_regex().replace_all(input, "").into_owned()
}

fn visible_len(s: &str) -> usize {
  strip_ansi(s).chars().count()
}

/// Render rows as space-aligned columns. Widths ignore ANSI styling.
#[must_use]
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
  let cols = headers.len();
  let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
  for row in rows {
    for (i, cell) in row.iter().enumerate().take(cols) {
      widths[i] = widths[i].max(visible_len(cell));
    }
  }

  let pad = |i: usize, len: usize| " ".repeat(widths[i].saturating_sub(len) + 1);
  let mut lines = Vec::with_capacity(rows.len() + 1);

  let mut header_line = String::new();
  for (i, text) in headers.iter().enumerate() {
    header_line.push_str(text);
    if i + 1 < cols {
      header_line.push_str(&pad(i, text.len()));
    }
  }
  lines.push(header_line.dimmed().to_string());

  for row in rows {
    let mut line = String::new();
    for (i, cell) in row.iter().enumerate().take(cols) {
      line.push_str(cell);
      if i + 1 < cols {
        line.push_str(&pad(i, visible_len(cell)));
      }
    }
    lines.push(line);
  }
  lines
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
  for line in render_table(headers, rows) {
    crate::log_info!("{}", line);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn columns_align_on_visible_width() {
    let rows = vec![
      vec![crate::utils::log::t::name("cap"), "lead".to_string()],
      vec!["coder-one".to_string(), "coder".to_string()],
    ];
    let lines: Vec<String> = render_table(&["NAME", "CLASS"], &rows)
      .iter()
      .map(|l| strip_ansi(l))
      .collect();
    assert_eq!(lines[0], "NAME      CLASS");
    assert_eq!(lines[1], "cap       lead");
    assert_eq!(lines[2], "coder-one coder");
  }
}
