//! Serde-deserializable types matching Jira API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs. Every field is
//! optional or defaulted: a missing or null field never fails a parse.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeSet;

use super::types::{Issue, SprintCandidate};

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Common nested field types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiNamed {
  #[serde(default, deserialize_with = "null_as_default")]
  pub name: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiProject {
  #[serde(default, deserialize_with = "null_as_default")]
  pub id: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub key: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub name: String,
}

// ============================================================================
// Search endpoint
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ApiIssueFields {
  #[serde(default, deserialize_with = "null_as_default")]
  pub summary: String,
  #[serde(default)]
  pub status: Option<ApiNamed>,
  #[serde(rename = "issuetype", default)]
  pub issue_type: Option<ApiNamed>,
  #[serde(default)]
  pub project: Option<ApiProject>,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssue {
  #[serde(default, deserialize_with = "null_as_default")]
  pub key: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub fields: ApiIssueFields,
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchResponse {
  #[serde(default, deserialize_with = "null_as_default")]
  pub issues: Vec<ApiIssue>,
  #[serde(default)]
  pub total: Option<u64>,
}

// ============================================================================
// Myself endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiMyself {
  #[serde(rename = "displayName", default)]
  pub display_name: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(rename = "emailAddress", default)]
  pub email_address: Option<String>,
}

impl ApiMyself {
  pub fn label(&self) -> String {
    self
      .display_name
      .as_ref()
      .or(self.name.as_ref())
      .or(self.email_address.as_ref())
      .cloned()
      .unwrap_or_else(|| "unknown user".to_string())
  }
}

// ============================================================================
// Agile endpoints: boards, sprints, sprint detail
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiPage<T> {
  #[serde(default, deserialize_with = "null_as_default")]
  pub values: Vec<T>,
  #[serde(rename = "startAt", default)]
  pub start_at: u64,
  #[serde(rename = "isLast", default)]
  pub is_last: Option<bool>,
  #[serde(default)]
  pub total: Option<u64>,
}

impl<T> ApiPage<T> {
  /// Whether no further page should be requested.
  ///
  /// Uses `isLast` when present; otherwise infers from `total`, and an empty
  /// page always ends the walk.
  pub fn is_final(&self) -> bool {
    if self.values.is_empty() {
      return true;
    }
    match (self.is_last, self.total) {
      (Some(is_last), _) => is_last,
      (None, Some(total)) => self.start_at + self.values.len() as u64 >= total,
      (None, None) => true,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiBoard {
  pub id: u64,
  #[serde(default, deserialize_with = "null_as_default")]
  pub name: String,
  #[serde(rename = "type", default, deserialize_with = "null_as_default")]
  pub board_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiSprint {
  pub id: u64,
  #[serde(default, deserialize_with = "null_as_default")]
  pub name: String,
  #[serde(rename = "startDate", default)]
  pub start_date: Option<String>,
  #[serde(rename = "endDate", default)]
  pub end_date: Option<String>,
  #[serde(rename = "activatedDate", default)]
  pub activated_date: Option<String>,
  #[serde(rename = "completeDate", default)]
  pub complete_date: Option<String>,
}

impl ApiSprint {
  /// Explicit start, else the activation time.
  pub fn start(&self) -> Option<DateTime<Utc>> {
    first_date(&[&self.start_date, &self.activated_date])
  }

  /// Explicit end, else the completion time.
  pub fn end(&self) -> Option<DateTime<Utc>> {
    first_date(&[&self.end_date, &self.complete_date])
  }

  pub fn into_candidate(self, board_id: u64) -> SprintCandidate {
    SprintCandidate {
      board_id,
      sprint_id: self.id,
      start_date: self.start(),
      end_date: self.end(),
      name: self.name,
    }
  }
}

fn first_date(values: &[&Option<String>]) -> Option<DateTime<Utc>> {
  values
    .iter()
    .filter_map(|v| v.as_deref())
    .find_map(parse_jira_date)
}

/// Parse the timestamp formats Jira emits (RFC 3339, and `+0000` offsets
/// without a colon as used by Server/Data Center).
pub fn parse_jira_date(value: &str) -> Option<DateTime<Utc>> {
  let value = value.trim();
  if value.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
    return Some(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
    .ok()
    .map(|naive| naive.and_utc())
}

// ============================================================================
// Sprint Report (greenhopper) membership
// ============================================================================

/// Sections of the Sprint Report holding arrays of issue objects.
pub const SPRINT_REPORT_ISSUE_SECTIONS: &[&str] = &[
  "completedIssues",
  "issuesNotCompletedInCurrentSprint",
  "puntedIssues",
  "issuesCompletedInAnotherSprint",
];

/// Section listing keys added after the sprint started. Jira returns it as
/// an object keyed by issue key; a plain array of keys is accepted too.
pub const SPRINT_REPORT_ADDED_KEYS: &str = "issueKeysAddedDuringSprint";

/// Collect every issue key the Sprint Report lists as a sprint member.
///
/// The sections normally live under `contents`; a report with the sections
/// at the top level is read the same way.
pub fn sprint_report_keys(report: &Value) -> BTreeSet<String> {
  let mut keys = BTreeSet::new();
  let scopes = [report.get("contents"), Some(report)];

  for scope in scopes.into_iter().flatten() {
    for section in SPRINT_REPORT_ISSUE_SECTIONS {
      if let Some(items) = scope.get(*section).and_then(Value::as_array) {
        keys.extend(items.iter().filter_map(item_key));
      }
    }

    match scope.get(SPRINT_REPORT_ADDED_KEYS) {
      Some(Value::Object(map)) => keys.extend(map.keys().filter(|k| !k.is_empty()).cloned()),
      Some(Value::Array(items)) => keys.extend(items.iter().filter_map(item_key)),
      _ => {}
    }
  }

  keys
}

fn item_key(item: &Value) -> Option<String> {
  let key = match item {
    Value::String(s) => s.as_str(),
    Value::Object(obj) => obj.get("key").and_then(Value::as_str)?,
    _ => return None,
  };
  let key = key.trim();
  (!key.is_empty()).then(|| key.to_string())
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiIssue {
  pub fn into_issue(self) -> Issue {
    let f = self.fields;
    let project = f.project.unwrap_or_default();
    Issue {
      project: if project.key.is_empty() {
        project.name.clone()
      } else {
        project.key
      },
      project_name: project.name,
      project_id: project.id,
      issue_type: f.issue_type.map(|t| t.name).unwrap_or_default(),
      summary: f.summary,
      status: f.status.map(|s| s.name).unwrap_or_default(),
      key: self.key,
    }
  }
}
