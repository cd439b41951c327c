//! Matching free-text sprint descriptions against sprint names.

use regex::Regex;
use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;
use std::sync::OnceLock;

use super::jql::looks_like_project_key;
use super::types::SprintCandidate;

fn number_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

/// Every integer token in `text`, in order. Tokens too large for u64 are skipped.
pub fn embedded_numbers(text: &str) -> Vec<u64> {
  number_re()
    .find_iter(text)
    .filter_map(|m| m.as_str().parse().ok())
    .collect()
}

/// The trailing integer of a sprint description ("Sprint 73" -> 73).
pub fn sprint_number(text: &str) -> Option<u64> {
  embedded_numbers(text).last().copied()
}

/// Lowercase with runs of whitespace collapsed.
fn normalize(text: &str) -> String {
  text
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
  Exact,
  Numeric,
}

/// Classifies sprint names against one project + sprint description.
#[derive(Debug, Clone)]
pub struct SprintMatcher {
  project: String,
  text: String,
  prefixed_text: String,
  number: Option<u64>,
  require_project: bool,
}

impl SprintMatcher {
  pub fn new(project: &str, sprint_text: &str, require_project_in_name: bool) -> Self {
    let project = project.trim();
    Self {
      project: project.to_lowercase(),
      text: normalize(sprint_text),
      prefixed_text: normalize(&format!("{} {}", project, sprint_text)),
      number: sprint_number(sprint_text),
      require_project: require_project_in_name && looks_like_project_key(project),
    }
  }

  /// Case-insensitive equality with the description, or with the description
  /// prefixed by the project ("Sprint 73" matches "AIRPMD Sprint 73").
  pub fn is_exact(&self, name: &str) -> bool {
    if self.text.is_empty() {
      return false;
    }
    let name = normalize(name);
    if name != self.text && name != self.prefixed_text {
      return false;
    }
    !self.require_project || name.contains(&self.project)
  }

  /// Some integer in the name equals the description's trailing integer.
  pub fn is_numeric(&self, name: &str) -> bool {
    match self.number {
      Some(n) => embedded_numbers(name).contains(&n),
      None => false,
    }
  }

  /// Name contains the description.
  pub fn is_loose(&self, name: &str) -> bool {
    !self.text.is_empty() && normalize(name).contains(&self.text)
  }

  pub fn classify(&self, name: &str) -> Option<MatchKind> {
    if self.is_exact(name) {
      Some(MatchKind::Exact)
    } else if self.is_numeric(name) {
      Some(MatchKind::Numeric)
    } else {
      None
    }
  }

  /// Candidates worth probing, in scan order.
  ///
  /// Exact matches win outright: numeric matches are only returned when no
  /// exact match exists. A sprint shared by several boards appears once,
  /// under the first board it was seen on.
  pub fn select(&self, scanned: &[SprintCandidate]) -> Vec<SprintCandidate> {
    let mut seen = HashSet::new();
    let mut exact = Vec::new();
    let mut numeric = Vec::new();

    for candidate in scanned {
      if !seen.insert(candidate.sprint_id) {
        continue;
      }
      match self.classify(&candidate.name) {
        Some(MatchKind::Exact) => exact.push(candidate.clone()),
        Some(MatchKind::Numeric) => numeric.push(candidate.clone()),
        None => {}
      }
    }

    if exact.is_empty() {
      numeric
    } else {
      exact
    }
  }
}

/// Candidate with the latest start date; ties go to the lowest sprint id.
/// Candidates without a start date rank below any dated one.
pub fn most_recent(candidates: &[SprintCandidate]) -> Option<&SprintCandidate> {
  candidates.iter().max_by(|a, b| {
    match a.start_date.cmp(&b.start_date) {
      Ordering::Equal => Reverse(a.sprint_id).cmp(&Reverse(b.sprint_id)),
      other => other,
    }
  })
}
