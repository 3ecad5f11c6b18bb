use serde::Serialize;
use thiserror::Error;

/// Failure of a core operation.
///
/// `NotFound`, `Blocked` and `Invalid` are the outcomes callers are expected
/// to act on. `Store` and `Content` surface infrastructure failures; the
/// transaction that produced them has already been rolled back.
#[derive(Debug, Error)]
pub enum CommsError {
  #[error("{0}")]
  NotFound(String),
  #[error("BLOCKED: {0}")]
  Blocked(String),
  #[error("{0}")]
  Invalid(String),
  #[error("store error: {0}")]
  Store(#[from] rusqlite::Error),
  #[error("content {reference}: {source}")]
  Content {
    reference: String,
    #[source]
    source: std::io::Error,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  NotFound,
  Blocked,
  Invalid,
  Store,
  Content,
}

impl CommsError {
  #[must_use]
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::NotFound(_) => ErrorKind::NotFound,
      Self::Blocked(_) => ErrorKind::Blocked,
      Self::Invalid(_) => ErrorKind::Invalid,
      Self::Store(_) => ErrorKind::Store,
      Self::Content { .. } => ErrorKind::Content,
    }
  }

  pub(crate) fn content(reference: impl Into<String>, source: std::io::Error) -> Self {
    Self::Content {
      reference: reference.into(),
      source,
    }
  }

  #[must_use]
  pub fn is_blocked(&self) -> bool {
    matches!(self, Self::Blocked(_))
  }

  #[must_use]
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound(_))
  }

  #[must_use]
  pub fn is_invalid(&self) -> bool {
    matches!(self, Self::Invalid(_))
  }
}

pub type Result<T, E = CommsError> = std::result::Result<T, E>;
