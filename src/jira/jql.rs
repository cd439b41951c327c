//! JQL construction.

use std::fmt;

/// Keys per `key in (...)` clause, to stay under query-length limits.
pub const KEY_CHUNK_SIZE: usize = 50;

/// How a sprint is referenced in a `sprint = ...` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SprintRef {
  /// Resolved sprint id
  Id(u64),
  /// Unresolved, but the text carried a number
  Number(u64),
  /// Unresolved free text
  Name(String),
}

impl fmt::Display for SprintRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SprintRef::Id(id) | SprintRef::Number(id) => write!(f, "{}", id),
      SprintRef::Name(name) => write!(f, "{}", quote(name)),
    }
  }
}

/// True for identifiers like `AIRPMD` or `ABC2`: an uppercase letter
/// followed by uppercase letters, digits or underscores.
pub fn looks_like_project_key(project: &str) -> bool {
  let mut chars = project.chars();
  match chars.next() {
    Some(c) if c.is_ascii_uppercase() => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Quote a string literal, doubling embedded quotes.
pub fn quote(value: &str) -> String {
  format!("\"{}\"", value.replace('"', "\"\""))
}

pub fn project_clause(project: &str) -> String {
  let project = project.trim();
  if looks_like_project_key(project) {
    format!("project = {}", project)
  } else {
    format!("project = {}", quote(project))
  }
}

fn in_clause<S: AsRef<str>>(field: &str, values: &[S]) -> String {
  let quoted: Vec<String> = values.iter().map(|v| quote(v.as_ref().trim())).collect();
  format!("{} in ({})", field, quoted.join(","))
}

/// Builder for the `AND`-joined queries the client issues.
#[derive(Debug, Default, Clone)]
pub struct Jql {
  clauses: Vec<String>,
  order_by: Option<String>,
}

impl Jql {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn project(mut self, project: &str) -> Self {
    if !project.trim().is_empty() {
      self.clauses.push(project_clause(project));
    }
    self
  }

  pub fn sprint(mut self, sprint: &SprintRef) -> Self {
    self.clauses.push(format!("sprint = {}", sprint));
    self
  }

  /// No clause for an empty list (every type).
  pub fn issue_types<S: AsRef<str>>(mut self, types: &[S]) -> Self {
    if !types.is_empty() {
      self.clauses.push(in_clause("issuetype", types));
    }
    self
  }

  pub fn keys<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
    if !keys.is_empty() {
      self.clauses.push(in_clause("key", keys));
    }
    self
  }

  pub fn order_by(mut self, order: &str) -> Self {
    self.order_by = Some(order.to_string());
    self
  }

  pub fn build(self) -> String {
    let mut jql = self.clauses.join(" AND ");
    if let Some(order) = self.order_by {
      if !jql.is_empty() {
        jql.push(' ');
      }
      jql.push_str("ORDER BY ");
      jql.push_str(&order);
    }
    jql
  }
}
