//! Filling a report template with sprint data.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

use super::aggregate::{type_name, ReportAggregate};
use super::buckets::StatusBucket;
use super::narrative::{format_date, summary};
use crate::jira::types::{Issue, SprintDates};

/// Everything a template can draw from.
#[derive(Debug, Clone)]
pub struct ReportData {
  pub project: String,
  pub sprint: String,
  pub dates: Option<SprintDates>,
  pub issues: Vec<Issue>,
  pub aggregate: ReportAggregate,
  pub summary: String,
  pub generated_at: DateTime<Utc>,
}

impl ReportData {
  pub fn new(project: &str, sprint: &str, dates: Option<SprintDates>, issues: Vec<Issue>) -> Self {
    let aggregate = ReportAggregate::build(&issues);
    let summary = summary(project, sprint, dates.as_ref(), &aggregate);
    Self {
      project: project.to_string(),
      sprint: sprint.to_string(),
      dates,
      issues,
      aggregate,
      summary,
      generated_at: Utc::now(),
    }
  }

  /// Placeholder name to (unescaped) value.
  fn placeholders(&self) -> BTreeMap<&'static str, String> {
    let date = |d: Option<DateTime<Utc>>| d.map(format_date).unwrap_or_default();
    BTreeMap::from([
      ("project", self.project.clone()),
      ("sprint", self.sprint.clone()),
      ("start_date", date(self.dates.and_then(|d| d.start))),
      ("end_date", date(self.dates.and_then(|d| d.end))),
      ("summary", self.summary.clone()),
      ("total", self.issues.len().to_string()),
      (
        "generated_at",
        self.generated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
      ),
    ])
  }
}

fn placeholder_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid regex"))
}

/// Produces an output document from a template and report data.
pub trait DocumentTemplater {
  fn render(&self, template: &Path, output: &Path, data: &ReportData) -> Result<()>;
}

/// Text/HTML templater.
///
/// Replaces `{{name}}` placeholders and renders one table per issue type.
/// Tables go where `{{tables}}` appears, else before `</body>`, else at the end.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlTemplater;

impl HtmlTemplater {
  /// Placeholders are substituted in one pass over the template, so values
  /// that look like placeholders are left alone. Unknown names stay as-is.
  pub fn fill(&self, template: &str, data: &ReportData) -> String {
    let placeholders = data.placeholders();
    let tables = render_tables(data);
    let has_tables = template.contains("{{tables}}");

    let mut text = placeholder_re()
      .replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match placeholders.get(name) {
          Some(value) if name == "summary" => escape(value).replace('\n', "<br>\n"),
          Some(value) => escape(value),
          None if name == "tables" => tables.clone(),
          None => caps[0].to_string(),
        }
      })
      .into_owned();

    if has_tables {
      text
    } else if let Some(pos) = text.rfind("</body>") {
      text.insert_str(pos, &tables);
      text
    } else {
      text.push_str(&tables);
      text
    }
  }
}

impl DocumentTemplater for HtmlTemplater {
  fn render(&self, template: &Path, output: &Path, data: &ReportData) -> Result<()> {
    if !template.exists() {
      return Err(eyre!("Template file not found: {}", template.display()));
    }
    let contents = std::fs::read_to_string(template)
      .map_err(|e| eyre!("Failed to read template {}: {}", template.display(), e))?;

    let filled = self.fill(&contents, data);

    std::fs::write(output, filled)
      .map_err(|e| eyre!("Failed to write report {}: {}", output.display(), e))?;
    info!(output = %output.display(), issues = data.issues.len(), "Report written");
    Ok(())
  }
}

fn escape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(c),
    }
  }
  out
}

fn render_tables(data: &ReportData) -> String {
  let mut html = String::new();
  for issue_type in data.aggregate.by_type.keys() {
    let rows: Vec<&Issue> = data
      .issues
      .iter()
      .filter(|i| type_name(&i.issue_type).eq_ignore_ascii_case(issue_type))
      .collect();

    html.push_str(&format!("<h2>{}</h2>\n", escape(issue_type)));
    html.push_str("<table class=\"issues\">\n");
    html.push_str("<tr><th>Key</th><th>Summary</th><th>Status</th></tr>\n");
    for issue in rows {
      let bucket = StatusBucket::classify(&issue.status);
      html.push_str(&format!(
        "<tr><td>{}</td><td>{}</td><td style=\"background-color:{}\">{}</td></tr>\n",
        escape(&issue.key),
        escape(&issue.summary),
        bucket.color(),
        escape(&issue.status)
      ));
    }
    html.push_str("</table>\n");
  }
  html
}
