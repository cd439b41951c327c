use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Normalized issue record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
  /// Project key, or the name when the key is missing.
  pub project: String,
  pub project_name: String,
  pub project_id: String,
  pub issue_type: String,
  pub key: String,
  pub summary: String,
  pub status: String,
}

impl Issue {
  /// Whether `project` (a key, name or numeric id) names this issue's project.
  /// The key prefix counts too, for issues whose project field was empty.
  pub fn in_project(&self, project: &str) -> bool {
    let project = project.trim();
    if project.is_empty() {
      return true;
    }
    let prefix = format!("{}-", project.to_uppercase());
    self.key.to_uppercase().starts_with(&prefix)
      || [&self.project, &self.project_name, &self.project_id]
        .iter()
        .any(|p| !p.is_empty() && p.trim().eq_ignore_ascii_case(project))
  }
}

/// Board summary
#[derive(Debug, Clone)]
pub struct Board {
  pub id: u64,
  pub name: String,
  pub board_type: String, // "scrum" or "kanban"
}

/// A sprint seen while scanning a project's boards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprintCandidate {
  pub board_id: u64,
  pub sprint_id: u64,
  pub name: String,
  pub start_date: Option<DateTime<Utc>>,
  pub end_date: Option<DateTime<Utc>>,
}

/// The sprint that drives the final issue fetch.
///
/// A non-empty `official_keys` means the fetch is constrained to exactly
/// those keys; empty means a plain sprint-scoped query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprintSelection {
  pub board_id: Option<u64>,
  pub sprint_id: u64,
  pub official_keys: BTreeSet<String>,
}

/// A sprint picked from a project's boards, with whatever dates are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSprint {
  pub sprint_id: u64,
  pub name: String,
  pub dates: Option<SprintDates>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SprintDates {
  pub start: Option<DateTime<Utc>>,
  pub end: Option<DateTime<Utc>>,
}

impl SprintDates {
  pub fn is_complete(&self) -> bool {
    self.start.is_some() && self.end.is_some()
  }
}

/// Outcome of a credential check, with an operator-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCheck {
  pub ok: bool,
  pub message: String,
}
