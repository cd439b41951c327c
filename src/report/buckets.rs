//! Status buckets used for summary counts and cell colours.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusBucket {
  Open,
  Closed,
  Cancelled,
  InProgress,
  InQa,
  Blocked,
  DevCompleted,
  /// Any status not recognised as one of the named buckets
  Other,
}

impl StatusBucket {
  /// Classify a status name: trimmed, case-insensitive, with synonyms.
  pub fn classify(status: &str) -> Self {
    let status = status.trim().to_lowercase();
    match status.as_str() {
      "open" | "to do" | "todo" | "new" | "backlog" | "reopened" => StatusBucket::Open,
      "closed" | "done" | "resolved" => StatusBucket::Closed,
      "cancelled" | "canceled" | "false positive approval" | "won't do" => StatusBucket::Cancelled,
      "in progress" | "in development" => StatusBucket::InProgress,
      "in qa" | "in q&a" | "ready for qa" => StatusBucket::InQa,
      "blocked" | "on hold" => StatusBucket::Blocked,
      "dev completed" | "dev complete" | "development complete" => StatusBucket::DevCompleted,
      _ => StatusBucket::Other,
    }
  }

  /// Background colour of a status cell.
  pub fn color(self) -> &'static str {
    match self {
      StatusBucket::Closed => "#c6efce",
      StatusBucket::Cancelled => "#bdd7ee",
      StatusBucket::Blocked => "#d9d9d9",
      _ => "#ffeb9c",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      StatusBucket::Open => "open",
      StatusBucket::Closed => "closed",
      StatusBucket::Cancelled => "cancelled",
      StatusBucket::InProgress => "in progress",
      StatusBucket::InQa => "in QA",
      StatusBucket::Blocked => "blocked",
      StatusBucket::DevCompleted => "dev completed",
      StatusBucket::Other => "other",
    }
  }
}

impl fmt::Display for StatusBucket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}
