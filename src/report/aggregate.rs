//! Status tallies per issue type.

use std::collections::{BTreeMap, HashSet};

use super::buckets::StatusBucket;
use crate::jira::types::Issue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
  pub open: usize,
  pub closed: usize,
  pub cancelled: usize,
  pub in_progress: usize,
  pub in_qa: usize,
  pub blocked: usize,
  pub dev_completed: usize,
  pub other: usize,
}

impl StatusCounts {
  pub fn add(&mut self, bucket: StatusBucket) {
    let slot = match bucket {
      StatusBucket::Open => &mut self.open,
      StatusBucket::Closed => &mut self.closed,
      StatusBucket::Cancelled => &mut self.cancelled,
      StatusBucket::InProgress => &mut self.in_progress,
      StatusBucket::InQa => &mut self.in_qa,
      StatusBucket::Blocked => &mut self.blocked,
      StatusBucket::DevCompleted => &mut self.dev_completed,
      StatusBucket::Other => &mut self.other,
    };
    *slot += 1;
  }

  pub fn get(&self, bucket: StatusBucket) -> usize {
    match bucket {
      StatusBucket::Open => self.open,
      StatusBucket::Closed => self.closed,
      StatusBucket::Cancelled => self.cancelled,
      StatusBucket::InProgress => self.in_progress,
      StatusBucket::InQa => self.in_qa,
      StatusBucket::Blocked => self.blocked,
      StatusBucket::DevCompleted => self.dev_completed,
      StatusBucket::Other => self.other,
    }
  }

  /// Open plus unrecognised statuses, as reported in the narrative.
  pub fn open_or_other(&self) -> usize {
    self.open + self.other
  }

  pub fn total(&self) -> usize {
    self.open
      + self.closed
      + self.cancelled
      + self.in_progress
      + self.in_qa
      + self.blocked
      + self.dev_completed
      + self.other
  }

  fn merge(&mut self, other: &StatusCounts) {
    self.open += other.open;
    self.closed += other.closed;
    self.cancelled += other.cancelled;
    self.in_progress += other.in_progress;
    self.in_qa += other.in_qa;
    self.blocked += other.blocked;
    self.dev_completed += other.dev_completed;
    self.other += other.other;
  }
}

/// Display name of an issue type; blank types group under "Unknown".
pub fn type_name(raw: &str) -> &str {
  let name = raw.trim();
  if name.is_empty() {
    "Unknown"
  } else {
    name
  }
}

fn same_type(a: &str, b: &str) -> bool {
  type_name(a).eq_ignore_ascii_case(type_name(b))
}

/// Counts for issues of one type.
pub fn tally(issues: &[Issue], issue_type: &str) -> StatusCounts {
  let mut counts = StatusCounts::default();
  for issue in issues.iter().filter(|i| same_type(&i.issue_type, issue_type)) {
    counts.add(StatusBucket::classify(&issue.status));
  }
  counts
}

/// Counts for every issue type present, keyed by type name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportAggregate {
  pub by_type: BTreeMap<String, StatusCounts>,
}

impl ReportAggregate {
  pub fn build(issues: &[Issue]) -> Self {
    // First spelling seen names the group.
    let mut names: Vec<&str> = Vec::new();
    for issue in issues {
      let name = type_name(&issue.issue_type);
      if !names.iter().any(|n| same_type(n, name)) {
        names.push(name);
      }
    }

    let by_type = names
      .into_iter()
      .map(|name| (name.to_string(), tally(issues, name)))
      .collect();
    Self { by_type }
  }

  pub fn overall(&self) -> StatusCounts {
    let mut total = StatusCounts::default();
    for counts in self.by_type.values() {
      total.merge(counts);
    }
    total
  }
}

/// Drop later occurrences of an already-seen key, keeping order.
pub fn dedupe_by_key(issues: Vec<Issue>) -> Vec<Issue> {
  let mut seen = HashSet::new();
  issues
    .into_iter()
    .filter(|issue| seen.insert(issue.key.clone()))
    .collect()
}
