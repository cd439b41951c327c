use chrono::{DateTime, Utc};

use super::aggregate::{ReportAggregate, StatusCounts};
use super::buckets::StatusBucket;
use crate::jira::types::SprintDates;

/// Buckets in reporting order; open and other are reported together.
const REPORTED: &[StatusBucket] = &[
  StatusBucket::Closed,
  StatusBucket::DevCompleted,
  StatusBucket::InQa,
  StatusBucket::InProgress,
  StatusBucket::Blocked,
  StatusBucket::Cancelled,
];

fn plural(n: usize, word: &str) -> String {
  if n == 1 {
    format!("{} {}", n, word)
  } else {
    format!("{} {}s", n, word)
  }
}

/// "5 issues: 2 closed, 1 in QA, 2 open"
pub fn describe_counts(counts: &StatusCounts) -> String {
  let mut parts: Vec<String> = REPORTED
    .iter()
    .filter(|b| counts.get(**b) > 0)
    .map(|b| format!("{} {}", counts.get(*b), b))
    .collect();
  if counts.open_or_other() > 0 {
    parts.push(format!("{} open", counts.open_or_other()));
  }

  let head = plural(counts.total(), "issue");
  if parts.is_empty() {
    head
  } else {
    format!("{}: {}", head, parts.join(", "))
  }
}

pub fn format_date(date: DateTime<Utc>) -> String {
  date.format("%d %b %Y").to_string()
}

/// "from 01 May 2024 to 14 May 2024", or whichever half is known.
pub fn describe_dates(dates: &SprintDates) -> Option<String> {
  match (dates.start, dates.end) {
    (Some(start), Some(end)) => Some(format!("from {} to {}", format_date(start), format_date(end))),
    (Some(start), None) => Some(format!("starting {}", format_date(start))),
    (None, Some(end)) => Some(format!("ending {}", format_date(end))),
    (None, None) => None,
  }
}

/// Summary paragraph: an overall sentence, then one line per issue type.
pub fn summary(
  project: &str,
  sprint: &str,
  dates: Option<&SprintDates>,
  aggregate: &ReportAggregate,
) -> String {
  let overall = aggregate.overall();
  let mut lines = Vec::new();

  let when = dates
    .and_then(describe_dates)
    .map(|d| format!(" ({})", d))
    .unwrap_or_default();
  if overall.total() == 0 {
    lines.push(format!("{} of {}{} has no matching issues.", sprint, project, when));
    return lines.join("\n");
  }
  lines.push(format!(
    "{} of {}{} contains {}.",
    sprint,
    project,
    when,
    describe_counts(&overall)
  ));

  for (issue_type, counts) in &aggregate.by_type {
    lines.push(format!("{}: {}.", issue_type, describe_counts(counts)));
  }

  lines.join("\n")
}
