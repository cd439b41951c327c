use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use color_eyre::{eyre::eyre, Result};

use crate::config::Config;
use crate::jira::api_types::{
  sprint_report_keys, ApiBoard, ApiMyself, ApiPage, ApiSearchResponse, ApiSprint,
};
use crate::jira::auth::{AuthScheme, Credentials};
use crate::jira::cancel::Cancellation;
use crate::jira::jql::{Jql, SprintRef, KEY_CHUNK_SIZE};
use crate::jira::sprint_match::{most_recent, sprint_number, SprintMatcher};
use crate::jira::transport::{HttpResponse, ReqwestTransport, Transport};
use crate::jira::types::{
  Board, CredentialCheck, Issue, ResolvedSprint, SprintCandidate, SprintDates, SprintSelection,
};

const SEARCH_FIELDS: &str = "summary,issuetype,status,project";
const SEARCH_PAGE_SIZE: u64 = 1000;
const AGILE_PAGE_SIZE: u64 = 50;
/// Upper bound on pages followed for one listing.
const MAX_PAGES: usize = 200;
/// How much of a 401/403 body goes into a diagnostic.
const DIAGNOSTIC_BODY_CHARS: usize = 200;

/// Everything the sprint search learned along the way.
#[derive(Debug, Clone, Default)]
pub struct SprintIssues {
  pub selection: Option<SprintSelection>,
  pub dates: Option<SprintDates>,
  pub issues: Vec<Issue>,
}

/// Jira REST client.
///
/// Every lookup is best-effort: network failures, unexpected statuses and
/// unparseable bodies are logged and surface as empty results.
pub struct JiraClient<T: Transport = ReqwestTransport> {
  base: Url,
  credentials: Credentials,
  transport: Arc<T>,
  require_project_in_sprint_name: bool,
}

impl<T: Transport> Clone for JiraClient<T> {
  fn clone(&self) -> Self {
    Self {
      base: self.base.clone(),
      credentials: self.credentials.clone(),
      transport: Arc::clone(&self.transport),
      require_project_in_sprint_name: self.require_project_in_sprint_name,
    }
  }
}

impl JiraClient<ReqwestTransport> {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;
    let credentials = Credentials::new(&config.jira.email, &token, config.jira.preferred_scheme());
    let client = Self::with_transport(&config.jira.url, credentials, ReqwestTransport::new()?)?;
    Ok(client.require_project_in_sprint_name(config.jira.require_project_in_sprint_name))
  }
}

impl<T: Transport> JiraClient<T> {
  pub fn with_transport(base_url: &str, credentials: Credentials, transport: T) -> Result<Self> {
    let mut base = Url::parse(base_url.trim())
      .map_err(|e| eyre!("Invalid Jira URL {}: {}", base_url, e))?;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    Ok(Self {
      base,
      credentials,
      transport: Arc::new(transport),
      require_project_in_sprint_name: false,
    })
  }

  pub fn require_project_in_sprint_name(mut self, require: bool) -> Self {
    self.require_project_in_sprint_name = require;
    self
  }

  #[cfg(test)]
  pub fn transport(&self) -> &T {
    &self.transport
  }

  // ==========================================================================
  // Top-level operations
  // ==========================================================================

  /// Call `myself` on both API versions with both schemes until one succeeds.
  pub async fn validate_credentials(&self, cancel: &Cancellation) -> CredentialCheck {
    match cancel.run(self.check_credentials()).await {
      Some(check) => check,
      None => {
        warn!("Credential check cancelled or timed out");
        CredentialCheck {
          ok: false,
          message: "Credential check cancelled or timed out".to_string(),
        }
      }
    }
  }

  /// Run a JQL query; the first API version/scheme that returns rows wins.
  pub async fn search(&self, jql: &str, cancel: &Cancellation) -> Vec<Issue> {
    cancel.run(self.search_issues(jql)).await.unwrap_or_else(|| {
      warn!(jql, "Search cancelled or timed out");
      Vec::new()
    })
  }

  /// Issues of one sprint, constrained to the Sprint Report's membership
  /// when it is available, along with the chosen sprint and its dates.
  ///
  /// `None` when cancelled or out of time, so callers can tell an aborted
  /// search from a sprint with no issues.
  pub async fn search_project_sprint(
    &self,
    project: &str,
    sprint_text: &str,
    issue_types: &[String],
    cancel: &Cancellation,
  ) -> Option<SprintIssues> {
    let found = cancel
      .run(self.sprint_issues(project, sprint_text, issue_types))
      .await;
    if found.is_none() {
      warn!(project, sprint_text, "Sprint search cancelled or timed out");
    }
    found
  }

  /// Id and dates of the sprint matching `sprint_text`, from a single scan
  /// of the project's boards.
  pub async fn resolve_sprint(
    &self,
    project: &str,
    sprint_text: &str,
    cancel: &Cancellation,
  ) -> Option<ResolvedSprint> {
    cancel
      .run(self.sprint_resolution(project, sprint_text))
      .await
      .flatten()
  }

  pub async fn resolve_sprint_id(
    &self,
    project: &str,
    sprint_text: &str,
    cancel: &Cancellation,
  ) -> Option<u64> {
    cancel
      .run(self.sprint_id(project, sprint_text))
      .await
      .flatten()
  }

  pub async fn resolve_sprint_date_range(
    &self,
    project: &str,
    sprint_text: &str,
    cancel: &Cancellation,
  ) -> Option<SprintDates> {
    cancel
      .run(self.sprint_date_range(project, sprint_text))
      .await
      .flatten()
  }

  // ==========================================================================
  // Credentials
  // ==========================================================================

  async fn check_credentials(&self) -> CredentialCheck {
    let versions = match self.credentials.preferred() {
      AuthScheme::Basic => [3, 2],
      AuthScheme::Bearer => [2, 3],
    };
    let mut failures = Vec::new();

    for version in versions {
      let Some(url) = self.endpoint(&format!("rest/api/{}/myself", version), &[]) else {
        continue;
      };
      for scheme in self.credentials.schemes() {
        match self.transport.get(&url, self.credentials.header(scheme)).await {
          Ok(response) if response.is_success() => {
            let who = serde_json::from_str::<ApiMyself>(&response.body)
              .map(|me| me.label())
              .unwrap_or_else(|_| "unknown user".to_string());
            info!(%scheme, version, "Credentials accepted");
            return CredentialCheck {
              ok: true,
              message: format!("Authenticated as {} using {} auth (API v{})", who, scheme, version),
            };
          }
          Ok(response) if response.is_auth_failure() => {
            debug!(%scheme, version, status = response.status, "Credentials rejected");
            failures.push(format!(
              "API v{} with {}: HTTP {}: {}",
              version,
              scheme,
              response.status,
              truncate_body(&response.body)
            ));
          }
          Ok(response) => {
            failures.push(format!("API v{} with {}: HTTP {}", version, scheme, response.status));
          }
          Err(e) => {
            warn!(%scheme, version, "Credential check failed: {}", e);
            failures.push(format!("API v{} with {}: connection error: {}", version, scheme, e));
          }
        }
      }
    }

    CredentialCheck {
      ok: false,
      message: format!("Authentication failed. {}", failures.join("; ")),
    }
  }

  // ==========================================================================
  // Search
  // ==========================================================================

  async fn search_issues(&self, jql: &str) -> Vec<Issue> {
    for version in [3, 2] {
      for scheme in self.credentials.schemes() {
        let Some(first) = self.search_page(version, scheme, jql, 0).await else {
          continue;
        };
        if first.issues.is_empty() {
          debug!(version, %scheme, "Search returned no rows");
          continue;
        }

        let mut total = first.total;
        let mut issues: Vec<Issue> = first.issues.into_iter().map(|i| i.into_issue()).collect();

        for _ in 0..MAX_PAGES {
          let start_at = issues.len() as u64;
          if total.map_or(true, |t| start_at >= t) {
            break;
          }
          let Some(page) = self.search_page(version, scheme, jql, start_at).await else {
            break;
          };
          if page.issues.is_empty() {
            break;
          }
          total = page.total.or(total);
          issues.extend(page.issues.into_iter().map(|i| i.into_issue()));
        }

        info!(version, %scheme, count = issues.len(), "Search succeeded");
        return issues;
      }
    }

    debug!(jql, "No search attempt returned rows");
    Vec::new()
  }

  async fn search_page(
    &self,
    version: u8,
    scheme: AuthScheme,
    jql: &str,
    start_at: u64,
  ) -> Option<ApiSearchResponse> {
    let url = self.endpoint(
      &format!("rest/api/{}/search", version),
      &[
        ("jql", jql.to_string()),
        ("fields", SEARCH_FIELDS.to_string()),
        ("maxResults", SEARCH_PAGE_SIZE.to_string()),
        ("startAt", start_at.to_string()),
      ],
    )?;
    let response = self.send(&url, scheme).await?;
    if !response.is_success() {
      debug!(version, %scheme, status = response.status, "Search attempt failed");
      return None;
    }
    serde_json::from_str(&response.body)
      .map_err(|e| warn!(version, %scheme, "Unparseable search response: {}", e))
      .ok()
  }

  // ==========================================================================
  // Sprint resolution
  // ==========================================================================

  async fn sprint_issues(
    &self,
    project: &str,
    sprint_text: &str,
    issue_types: &[String],
  ) -> SprintIssues {
    let scanned = self.scan_sprints(project).await;
    let selection = self.select_sprint(project, sprint_text, &scanned).await;

    let dates = match &selection {
      Some(sel) => match scanned.iter().find(|c| c.sprint_id == sel.sprint_id) {
        Some(candidate) => self.complete_dates(candidate).await,
        None => None,
      },
      None => None,
    };

    let issues = match &selection {
      Some(sel) if !sel.official_keys.is_empty() => {
        self.fetch_official_issues(project, sel, issue_types).await
      }
      Some(sel) => {
        let jql = Jql::new()
          .project(project)
          .sprint(&SprintRef::Id(sel.sprint_id))
          .issue_types(issue_types)
          .order_by("updated DESC")
          .build();
        self.search_issues(&jql).await
      }
      None => {
        let sprint = match sprint_number(sprint_text) {
          Some(n) => SprintRef::Number(n),
          None => SprintRef::Name(sprint_text.trim().to_string()),
        };
        info!(project, sprint_text, "No sprint resolved, querying by sprint text");
        let jql = Jql::new()
          .project(project)
          .sprint(&sprint)
          .issue_types(issue_types)
          .order_by("updated DESC")
          .build();
        self.search_issues(&jql).await
      }
    };

    SprintIssues {
      selection,
      dates,
      issues,
    }
  }

  /// Exact (or else numeric) candidates are probed in scan order; the first
  /// whose Sprint Report lists members wins. Without members the most
  /// recently started candidate is used, and without candidates the first
  /// sprint whose name contains the text.
  async fn select_sprint(
    &self,
    project: &str,
    sprint_text: &str,
    scanned: &[SprintCandidate],
  ) -> Option<SprintSelection> {
    let matcher = self.matcher(project, sprint_text);
    let candidates = matcher.select(scanned);
    debug!(count = candidates.len(), "Sprint candidates");

    for candidate in &candidates {
      let keys = self
        .sprint_report_keys(candidate.board_id, candidate.sprint_id)
        .await;
      if !keys.is_empty() {
        info!(
          board_id = candidate.board_id,
          sprint_id = candidate.sprint_id,
          name = %candidate.name,
          keys = keys.len(),
          "Sprint resolved from Sprint Report"
        );
        return Some(SprintSelection {
          board_id: Some(candidate.board_id),
          sprint_id: candidate.sprint_id,
          official_keys: keys,
        });
      }
    }

    if let Some(candidate) = most_recent(&candidates) {
      info!(sprint_id = candidate.sprint_id, name = %candidate.name, "Sprint resolved by recency");
      return Some(SprintSelection {
        board_id: Some(candidate.board_id),
        sprint_id: candidate.sprint_id,
        official_keys: BTreeSet::new(),
      });
    }

    scanned
      .iter()
      .find(|c| matcher.is_loose(&c.name))
      .map(|c| {
        info!(sprint_id = c.sprint_id, name = %c.name, "Sprint resolved by name");
        SprintSelection {
          board_id: None,
          sprint_id: c.sprint_id,
          official_keys: BTreeSet::new(),
        }
      })
  }

  async fn sprint_id(&self, project: &str, sprint_text: &str) -> Option<u64> {
    let scanned = self.scan_sprints(project).await;
    self
      .pick_sprint(project, sprint_text, &scanned)
      .map(|c| c.sprint_id)
  }

  async fn sprint_date_range(&self, project: &str, sprint_text: &str) -> Option<SprintDates> {
    let scanned = self.scan_sprints(project).await;
    let candidate = self.pick_sprint(project, sprint_text, &scanned)?;
    self.complete_dates(&candidate).await
  }

  async fn sprint_resolution(&self, project: &str, sprint_text: &str) -> Option<ResolvedSprint> {
    let scanned = self.scan_sprints(project).await;
    let candidate = self.pick_sprint(project, sprint_text, &scanned)?;
    let dates = self.complete_dates(&candidate).await;
    Some(ResolvedSprint {
      sprint_id: candidate.sprint_id,
      name: candidate.name,
      dates,
    })
  }

  /// Sprint choice without the Sprint Report probe.
  fn pick_sprint(
    &self,
    project: &str,
    sprint_text: &str,
    scanned: &[SprintCandidate],
  ) -> Option<SprintCandidate> {
    let matcher = self.matcher(project, sprint_text);
    let candidates = matcher.select(scanned);
    most_recent(&candidates)
      .or_else(|| scanned.iter().find(|c| matcher.is_loose(&c.name)))
      .cloned()
  }

  fn matcher(&self, project: &str, sprint_text: &str) -> SprintMatcher {
    SprintMatcher::new(project, sprint_text, self.require_project_in_sprint_name)
  }

  /// Query by sprint id plus the official keys in chunks, then keep only
  /// member issues of the project and requested types.
  async fn fetch_official_issues(
    &self,
    project: &str,
    selection: &SprintSelection,
    issue_types: &[String],
  ) -> Vec<Issue> {
    let keys: Vec<&String> = selection.official_keys.iter().collect();
    let mut seen = HashSet::new();
    let mut issues = Vec::new();

    for chunk in keys.chunks(KEY_CHUNK_SIZE) {
      let jql = Jql::new()
        .sprint(&SprintRef::Id(selection.sprint_id))
        .keys(chunk)
        .order_by("updated DESC")
        .build();
      for issue in self.search_issues(&jql).await {
        if seen.insert(issue.key.clone()) {
          issues.push(issue);
        }
      }
    }

    let fetched = issues.len();
    issues.retain(|issue| {
      selection.official_keys.contains(&issue.key)
        && issue.in_project(project)
        && type_allowed(issue, issue_types)
    });
    debug!(fetched, kept = issues.len(), "Filtered official issues");
    issues
  }

  /// Fill missing dates from the sprint detail endpoint.
  async fn complete_dates(&self, candidate: &SprintCandidate) -> Option<SprintDates> {
    let mut dates = SprintDates {
      start: candidate.start_date,
      end: candidate.end_date,
    };

    if !dates.is_complete() {
      if let Some(detail) = self.sprint_detail(candidate.sprint_id).await {
        dates.start = dates.start.or_else(|| detail.start());
        dates.end = dates.end.or_else(|| detail.end());
      }
    }

    (dates.start.is_some() || dates.end.is_some()).then_some(dates)
  }

  // ==========================================================================
  // Agile / greenhopper endpoints
  // ==========================================================================

  /// Every sprint of every board of the project, in board then listing order.
  async fn scan_sprints(&self, project: &str) -> Vec<SprintCandidate> {
    let mut candidates = Vec::new();
    for board in self.list_boards(project).await {
      let sprints = self.list_sprints(board.id).await;
      debug!(board_id = board.id, board = %board.name, kind = %board.board_type, sprints = sprints.len(), "Scanned board");
      candidates.extend(sprints);
    }
    candidates
  }

  async fn list_boards(&self, project: &str) -> Vec<Board> {
    let boards: Vec<ApiBoard> = self
      .fetch_all_pages(
        "rest/agile/1.0/board",
        &[("projectKeyOrId", project.trim().to_string())],
      )
      .await;
    boards
      .into_iter()
      .map(|b| Board {
        id: b.id,
        name: b.name,
        board_type: b.board_type,
      })
      .collect()
  }

  async fn list_sprints(&self, board_id: u64) -> Vec<SprintCandidate> {
    let sprints: Vec<ApiSprint> = self
      .fetch_all_pages(
        &format!("rest/agile/1.0/board/{}/sprint", board_id),
        &[("state", "active,closed,future".to_string())],
      )
      .await;
    sprints
      .into_iter()
      .map(|s| s.into_candidate(board_id))
      .collect()
  }

  async fn sprint_detail(&self, sprint_id: u64) -> Option<ApiSprint> {
    let url = self.endpoint(&format!("rest/agile/1.0/sprint/{}", sprint_id), &[])?;
    self.get_as(&url).await
  }

  async fn sprint_report_keys(&self, board_id: u64, sprint_id: u64) -> BTreeSet<String> {
    let Some(url) = self.endpoint(
      "rest/greenhopper/1.0/rapid/charts/sprintreport",
      &[
        ("rapidViewId", board_id.to_string()),
        ("sprintId", sprint_id.to_string()),
      ],
    ) else {
      return BTreeSet::new();
    };
    self
      .get_json(&url)
      .await
      .map(|report| sprint_report_keys(&report))
      .unwrap_or_default()
  }

  /// Follow `startAt` until the page says it is the last one.
  async fn fetch_all_pages<D: DeserializeOwned>(
    &self,
    path: &str,
    params: &[(&str, String)],
  ) -> Vec<D> {
    let mut values = Vec::new();
    let mut start_at = 0u64;

    for _ in 0..MAX_PAGES {
      let mut query = params.to_vec();
      query.push(("maxResults", AGILE_PAGE_SIZE.to_string()));
      query.push(("startAt", start_at.to_string()));

      let Some(url) = self.endpoint(path, &query) else {
        break;
      };
      let Some(page) = self.get_as::<ApiPage<D>>(&url).await else {
        break;
      };

      let is_final = page.is_final();
      start_at += page.values.len() as u64;
      values.extend(page.values);
      if is_final {
        break;
      }
    }

    values
  }

  // ==========================================================================
  // Request plumbing
  // ==========================================================================

  fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Option<Url> {
    let mut url = self
      .base
      .join(path)
      .map_err(|e| warn!(path, "Cannot build URL: {}", e))
      .ok()?;
    if !params.is_empty() {
      url.query_pairs_mut().extend_pairs(params);
    }
    Some(url)
  }

  async fn send(&self, url: &Url, scheme: AuthScheme) -> Option<HttpResponse> {
    self
      .transport
      .get(url, self.credentials.header(scheme))
      .await
      .map_err(|e| warn!(path = url.path(), %scheme, "Connection error: {}", e))
      .ok()
  }

  /// GET with the preferred scheme, retrying with the other one only when
  /// the server rejects the credentials.
  async fn get_json(&self, url: &Url) -> Option<Value> {
    for scheme in self.credentials.schemes() {
      let response = self.send(url, scheme).await?;
      if response.is_auth_failure() {
        debug!(path = url.path(), %scheme, status = response.status, "Auth rejected, trying next scheme");
        continue;
      }
      if !response.is_success() {
        debug!(path = url.path(), %scheme, status = response.status, "Request failed");
        return None;
      }
      return serde_json::from_str(&response.body)
        .map_err(|e| warn!(path = url.path(), "Unparseable response: {}", e))
        .ok();
    }
    None
  }

  async fn get_as<D: DeserializeOwned>(&self, url: &Url) -> Option<D> {
    let value = self.get_json(url).await?;
    serde_json::from_value(value)
      .map_err(|e| warn!(path = url.path(), "Unexpected response shape: {}", e))
      .ok()
  }
}

fn truncate_body(body: &str) -> String {
  let body = body.trim();
  if body.chars().count() <= DIAGNOSTIC_BODY_CHARS {
    return body.to_string();
  }
  let mut cut: String = body.chars().take(DIAGNOSTIC_BODY_CHARS).collect();
  cut.push_str("...");
  cut
}

fn type_allowed(issue: &Issue, issue_types: &[String]) -> bool {
  issue_types.is_empty()
    || issue_types
      .iter()
      .any(|t| t.trim().eq_ignore_ascii_case(issue.issue_type.trim()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::jira::transport::fake::{param, FakeTransport};
  use serde_json::json;
  use std::time::Duration;

  fn client<F>(preferred: AuthScheme, route: F) -> JiraClient<FakeTransport>
  where
    F: Fn(&Url, AuthScheme) -> (u16, String) + Send + Sync + 'static,
  {
    let credentials = Credentials::new("me@acme.io", "token", preferred);
    JiraClient::with_transport("https://jira.example.com", credentials, FakeTransport::new(route))
      .unwrap()
  }

  fn cancel() -> Cancellation {
    Cancellation::new(Duration::from_secs(5))
  }

  fn ok(value: Value) -> (u16, String) {
    (200, value.to_string())
  }

  fn not_found() -> (u16, String) {
    (404, String::new())
  }

  fn issue(key: &str, issue_type: &str, status: &str) -> Value {
    let project = key.split('-').next().unwrap_or_default();
    json!({
      "key": key,
      "fields": {
        "summary": format!("Summary of {}", key),
        "status": {"name": status},
        "issuetype": {"name": issue_type},
        "project": {"key": project, "name": project},
      }
    })
  }

  fn search_result(issues: Vec<Value>) -> (u16, String) {
    let total = issues.len();
    ok(json!({"startAt": 0, "total": total, "issues": issues}))
  }

  fn sprint(id: u64, name: &str) -> Value {
    json!({"id": id, "name": name, "state": "closed"})
  }

  fn page(values: Vec<Value>, is_last: bool) -> (u16, String) {
    ok(json!({"values": values, "isLast": is_last}))
  }

  /// Keys listed in a `key in (...)` clause.
  fn keys_in(jql: &str) -> Vec<String> {
    let Some(start) = jql.find("key in (") else {
      return Vec::new();
    };
    let rest = &jql[start + "key in (".len()..];
    let end = rest.find(')').unwrap();
    rest[..end]
      .split(',')
      .map(|k| k.trim_matches('"').to_string())
      .collect()
  }

  fn searched_jql(client: &JiraClient<FakeTransport>) -> Vec<String> {
    client
      .transport()
      .requests()
      .into_iter()
      .filter(|(_, url)| url.path().ends_with("/search"))
      .filter_map(|(_, url)| param(&url, "jql"))
      .collect()
  }

  // --------------------------------------------------------------------------
  // ValidateCredentials
  // --------------------------------------------------------------------------

  #[tokio::test]
  async fn test_validate_succeeds_with_preferred_scheme() {
    let client = client(AuthScheme::Basic, |url, _| {
      assert_eq!(url.path(), "/rest/api/3/myself");
      ok(json!({"displayName": "Ada Lovelace"}))
    });

    let check = client.validate_credentials(&cancel()).await;
    assert!(check.ok);
    assert!(check.message.contains("Ada Lovelace"));
    assert!(check.message.contains("Basic"));
    assert_eq!(client.transport().requests().len(), 1);
  }

  #[tokio::test]
  async fn test_validate_falls_back_to_other_scheme() {
    let client = client(AuthScheme::Basic, |_, scheme| match scheme {
      AuthScheme::Basic => (401, "{\"errorMessages\":[\"nope\"]}".to_string()),
      AuthScheme::Bearer => ok(json!({"name": "svc-reports"})),
    });

    let check = client.validate_credentials(&cancel()).await;
    assert!(check.ok);
    assert!(check.message.contains("Bearer"));
    assert!(check.message.contains("svc-reports"));

    let schemes: Vec<AuthScheme> = client.transport().requests().into_iter().map(|(s, _)| s).collect();
    assert_eq!(schemes, vec![AuthScheme::Basic, AuthScheme::Bearer]);
  }

  #[tokio::test]
  async fn test_validate_bearer_preference_tries_v2_first() {
    let client = client(AuthScheme::Bearer, |_, _| ok(json!({"name": "me"})));
    let check = client.validate_credentials(&cancel()).await;
    assert!(check.ok);
    assert_eq!(client.transport().paths(), vec!["/rest/api/2/myself"]);
  }

  #[tokio::test]
  async fn test_validate_failure_reports_truncated_auth_body() {
    let body = "x".repeat(500);
    let client = client(AuthScheme::Basic, move |_, _| (403, body.clone()));

    let check = client.validate_credentials(&cancel()).await;
    assert!(!check.ok);
    assert!(check.message.contains("HTTP 403"));
    assert!(check.message.contains("Basic"));
    assert!(check.message.contains("Bearer"));
    assert!(check.message.contains(&"x".repeat(200)));
    assert!(!check.message.contains(&"x".repeat(201)));
    assert_eq!(client.transport().requests().len(), 4);
  }

  #[tokio::test]
  async fn test_validate_reports_connection_errors() {
    let client = client(AuthScheme::Basic, |_, _| (0, String::new()));
    let check = client.validate_credentials(&cancel()).await;
    assert!(!check.ok);
    assert!(check.message.contains("connection error"));
  }

  // --------------------------------------------------------------------------
  // SearchByFreeQuery
  // --------------------------------------------------------------------------

  #[tokio::test]
  async fn test_search_prefers_first_non_empty_result() {
    let client = client(AuthScheme::Basic, |url, scheme| {
      match (url.path(), scheme) {
        ("/rest/api/3/search", AuthScheme::Basic) => search_result(vec![]),
        ("/rest/api/3/search", AuthScheme::Bearer) => (401, String::new()),
        ("/rest/api/2/search", AuthScheme::Basic) => {
          search_result(vec![issue("X-1", "Bug", "Open")])
        }
        _ => panic!("unexpected request {}", url),
      }
    });

    let issues = client.search("project = X", &cancel()).await;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].key, "X-1");
    assert_eq!(issues[0].project, "X");
    assert_eq!(client.transport().requests().len(), 3);
  }

  #[tokio::test]
  async fn test_search_gives_up_after_four_attempts() {
    let client = client(AuthScheme::Bearer, |url, _| {
      if url.path().ends_with("/3/search") {
        (500, "boom".to_string())
      } else {
        (200, "not json".to_string())
      }
    });

    let issues = client.search("project = X", &cancel()).await;
    assert!(issues.is_empty());
    assert_eq!(client.transport().requests().len(), 4);
  }

  #[tokio::test]
  async fn test_search_follows_pages() {
    let client = client(AuthScheme::Basic, |url, _| {
      let start: u64 = param(url, "startAt").unwrap().parse().unwrap();
      assert_eq!(param(url, "maxResults").as_deref(), Some("1000"));
      assert_eq!(param(url, "fields").as_deref(), Some(SEARCH_FIELDS));
      let issues = if start == 0 {
        vec![issue("X-1", "Bug", "Open"), issue("X-2", "Bug", "Open")]
      } else {
        vec![issue("X-3", "Bug", "Open")]
      };
      ok(json!({"startAt": start, "total": 3, "issues": issues}))
    });

    let keys: Vec<String> = client
      .search("project = X", &cancel())
      .await
      .into_iter()
      .map(|i| i.key)
      .collect();
    assert_eq!(keys, vec!["X-1", "X-2", "X-3"]);
  }

  #[tokio::test]
  async fn test_cancelled_search_is_empty() {
    let client = client(AuthScheme::Basic, |_, _| {
      search_result(vec![issue("X-1", "Bug", "Open")])
    });
    let cancel = cancel();
    cancel.token().cancel();

    assert!(client.search("project = X", &cancel).await.is_empty());
    assert!(client.transport().requests().is_empty());
  }

  // --------------------------------------------------------------------------
  // SearchByProjectAndSprint
  // --------------------------------------------------------------------------

  #[tokio::test]
  async fn test_sprint_pages_are_all_visited() {
    let client = client(AuthScheme::Basic, |url, _| {
      let path = url.path();
      if path == "/rest/agile/1.0/board" {
        return page(vec![json!({"id": 7, "name": "Board", "type": "scrum"})], true);
      }
      if path == "/rest/agile/1.0/board/7/sprint" {
        assert_eq!(param(url, "state").as_deref(), Some("active,closed,future"));
        return match param(url, "startAt").as_deref() {
          Some("0") => page(vec![sprint(1, "Sprint 1"), sprint(2, "Sprint 2")], false),
          Some("2") => page(vec![sprint(3, "Sprint 3"), sprint(4, "Sprint 4")], false),
          Some("4") => page(vec![sprint(5, "Sprint 5")], true),
          other => panic!("unexpected startAt {:?}", other),
        };
      }
      if path.ends_with("/sprintreport") {
        assert_eq!(param(url, "sprintId").as_deref(), Some("5"));
        return ok(json!({"contents": {"completedIssues": [{"key": "X-1"}]}}));
      }
      if path.ends_with("/search") {
        return search_result(vec![issue("X-1", "Bug", "Done")]);
      }
      not_found()
    });

    let result = client
      .search_project_sprint("X", "Sprint 5", &[], &cancel())
      .await
      .unwrap();
    let selection = result.selection.unwrap();
    assert_eq!(selection.sprint_id, 5);
    assert_eq!(selection.board_id, Some(7));
    assert_eq!(result.issues.len(), 1);

    let sprint_pages = client
      .transport()
      .paths()
      .into_iter()
      .filter(|p| p.ends_with("/sprint"))
      .count();
    assert_eq!(sprint_pages, 3);
  }

  #[tokio::test]
  async fn test_exact_match_on_second_board_beats_numeric_match() {
    let client = client(AuthScheme::Basic, |url, _| {
      let path = url.path();
      match path {
        "/rest/agile/1.0/board" => page(
          vec![
            json!({"id": 1, "name": "Board A", "type": "scrum"}),
            json!({"id": 2, "name": "Board B", "type": "scrum"}),
          ],
          true,
        ),
        "/rest/agile/1.0/board/1/sprint" => {
          page(vec![sprint(10, "AIRPMD Sprint 72"), sprint(11, "Release 2")], true)
        }
        "/rest/agile/1.0/board/2/sprint" => {
          page(vec![sprint(21, "73"), sprint(20, "AIRPMD Sprint 73")], true)
        }
        p if p.ends_with("/sprintreport") => ok(json!({
          "contents": {"completedIssues": [{"key": "AIRPMD-1"}, {"key": "AIRPMD-2"}]}
        })),
        p if p.ends_with("/search") => search_result(vec![
          issue("AIRPMD-1", "Bug", "Done"),
          issue("AIRPMD-2", "Story", "In QA"),
        ]),
        _ => not_found(),
      }
    });

    let result = client
      .search_project_sprint("AIRPMD", "Sprint 73", &[], &cancel())
      .await
      .unwrap();
    let selection = result.selection.unwrap();
    assert_eq!(selection.sprint_id, 20);
    assert_eq!(selection.board_id, Some(2));

    let probed: Vec<String> = client
      .transport()
      .requests()
      .into_iter()
      .filter(|(_, url)| url.path().ends_with("/sprintreport"))
      .filter_map(|(_, url)| param(&url, "sprintId"))
      .collect();
    assert_eq!(probed, vec!["20"]);

    let jql = searched_jql(&client);
    assert_eq!(jql.len(), 1);
    assert!(jql[0].starts_with("sprint = 20 AND key in ("));
    assert_eq!(result.issues.len(), 2);
  }

  #[tokio::test]
  async fn test_first_candidate_with_keys_wins_over_recency() {
    let client = client(AuthScheme::Basic, |url, _| {
      let path = url.path();
      match path {
        "/rest/agile/1.0/board" => page(vec![json!({"id": 1})], true),
        "/rest/agile/1.0/board/1/sprint" => page(
          vec![
            json!({"id": 31, "name": "Team 9", "startDate": "2024-01-01T00:00:00.000Z"}),
            json!({"id": 32, "name": "Other 9", "startDate": "2024-06-01T00:00:00.000Z"}),
            json!({"id": 33, "name": "Late 9", "startDate": "2024-03-01T00:00:00.000Z"}),
          ],
          true,
        ),
        p if p.ends_with("/sprintreport") => match param(url, "sprintId").as_deref() {
          Some("31") => ok(json!({"contents": {"completedIssues": []}})),
          Some("32") => not_found(),
          _ => ok(json!({"contents": {"puntedIssues": [{"key": "X-9"}]}})),
        },
        p if p.ends_with("/search") => search_result(vec![issue("X-9", "Task", "Open")]),
        _ => not_found(),
      }
    });

    let result = client
      .search_project_sprint("X", "sprint 9", &[], &cancel())
      .await
      .unwrap();
    assert_eq!(result.selection.unwrap().sprint_id, 33);
    assert_eq!(result.issues.len(), 1);
  }

  #[tokio::test]
  async fn test_official_keys_constrain_project_and_type() {
    let client = client(AuthScheme::Basic, |url, _| {
      let path = url.path();
      match path {
        "/rest/agile/1.0/board" => page(vec![json!({"id": 1})], true),
        "/rest/agile/1.0/board/1/sprint" => page(vec![sprint(5, "X Sprint 5")], true),
        p if p.ends_with("/sprintreport") => ok(json!({
          "contents": {
            "completedIssues": [{"key": "X-1"}, {"key": "Y-5"}],
            "issuesNotCompletedInCurrentSprint": [{"key": "X-2"}],
          }
        })),
        p if p.ends_with("/search") => search_result(vec![
          issue("X-1", "Bug", "Done"),
          issue("X-2", "Story", "Open"),
          issue("X-3", "Bug", "Open"),
          issue("Y-5", "Bug", "Open"),
        ]),
        _ => not_found(),
      }
    });

    let issues = client
      .search_project_sprint("X", "Sprint 5", &["bug".to_string()], &cancel())
      .await
      .unwrap()
      .issues;
    let keys: Vec<&str> = issues.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, vec!["X-1"]);
  }

  #[tokio::test]
  async fn test_official_keys_kept_for_project_given_by_name() {
    let client = client(AuthScheme::Basic, |url, _| {
      let path = url.path();
      match path {
        "/rest/agile/1.0/board" => {
          assert_eq!(param(url, "projectKeyOrId").as_deref(), Some("My Project"));
          page(vec![json!({"id": 1})], true)
        }
        "/rest/agile/1.0/board/1/sprint" => page(vec![sprint(5, "Sprint 5")], true),
        p if p.ends_with("/sprintreport") => {
          ok(json!({"completedIssues": [{"key": "MP-1"}, {"key": "OT-2"}]}))
        }
        p if p.ends_with("/search") => search_result(vec![
          json!({
            "key": "MP-1",
            "fields": {
              "status": {"name": "Done"},
              "issuetype": {"name": "Bug"},
              "project": {"id": "10042", "key": "MP", "name": "My Project"},
            }
          }),
          json!({
            "key": "OT-2",
            "fields": {"project": {"id": "10077", "key": "OT", "name": "Other Team"}}
          }),
        ]),
        _ => not_found(),
      }
    });

    let result = client
      .search_project_sprint("My Project", "Sprint 5", &[], &cancel())
      .await
      .unwrap();
    assert_eq!(
      searched_jql(&client),
      vec!["sprint = 5 AND key in (\"MP-1\",\"OT-2\") ORDER BY updated DESC".to_string()]
    );
    let keys: Vec<&str> = result.issues.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, vec!["MP-1"]);

    let by_id = client
      .search_project_sprint("10042", "Sprint 5", &[], &cancel())
      .await
      .unwrap();
    assert_eq!(by_id.issues.len(), 1);
  }

  #[tokio::test]
  async fn test_official_keys_are_queried_in_chunks() {
    let all_keys: Vec<Value> = (1..=120).map(|n| json!({"key": format!("X-{}", n)})).collect();
    let client = client(AuthScheme::Basic, move |url, _| {
      let path = url.path();
      match path {
        "/rest/agile/1.0/board" => page(vec![json!({"id": 1})], true),
        "/rest/agile/1.0/board/1/sprint" => page(vec![sprint(5, "Sprint 5")], true),
        p if p.ends_with("/sprintreport") => {
          ok(json!({"contents": {"completedIssues": all_keys.clone()}}))
        }
        p if p.ends_with("/search") => {
          let jql = param(url, "jql").unwrap();
          let issues = keys_in(&jql)
            .iter()
            .map(|k| issue(k, "Task", "Done"))
            .collect();
          search_result(issues)
        }
        _ => not_found(),
      }
    });

    let issues = client
      .search_project_sprint("X", "Sprint 5", &[], &cancel())
      .await
      .unwrap()
      .issues;
    assert_eq!(issues.len(), 120);

    let chunk_sizes: Vec<usize> = searched_jql(&client).iter().map(|j| keys_in(j).len()).collect();
    assert_eq!(chunk_sizes, vec![50, 50, 20]);
  }

  #[tokio::test]
  async fn test_without_keys_most_recent_candidate_is_queried() {
    let client = client(AuthScheme::Basic, |url, _| {
      let path = url.path();
      match path {
        "/rest/agile/1.0/board" => page(vec![json!({"id": 1})], true),
        "/rest/agile/1.0/board/1/sprint" => page(
          vec![
            json!({"id": 40, "name": "A 12", "startDate": "2024-01-01T00:00:00.000Z", "endDate": "2024-01-14T00:00:00.000Z"}),
            json!({"id": 41, "name": "B 12", "startDate": "2024-02-01T00:00:00.000Z", "endDate": "2024-02-14T00:00:00.000Z"}),
          ],
          true,
        ),
        p if p.ends_with("/sprintreport") => not_found(),
        p if p.ends_with("/search") => search_result(vec![issue("MP-1", "Bug", "Open")]),
        _ => not_found(),
      }
    });

    let result = client
      .search_project_sprint("My Project", "12", &["Bug".to_string()], &cancel())
      .await
      .unwrap();
    let selection = result.selection.unwrap();
    assert_eq!(selection.sprint_id, 41);
    assert!(selection.official_keys.is_empty());
    assert!(result.dates.unwrap().is_complete());

    assert_eq!(
      searched_jql(&client),
      vec![
        "project = \"My Project\" AND sprint = 41 AND issuetype in (\"Bug\") ORDER BY updated DESC"
          .to_string()
      ]
    );
  }

  #[tokio::test]
  async fn test_loose_name_resolution_when_nothing_matches() {
    let client = client(AuthScheme::Basic, |url, _| {
      let path = url.path();
      match path {
        "/rest/agile/1.0/board" => page(vec![json!({"id": 1})], true),
        "/rest/agile/1.0/board/1/sprint" => page(vec![sprint(50, "Q3 Hardening Week")], true),
        p if p.ends_with("/search") => search_result(vec![issue("X-1", "Bug", "Open")]),
        _ => not_found(),
      }
    });

    let result = client
      .search_project_sprint("X", "hardening", &[], &cancel())
      .await
      .unwrap();
    let selection = result.selection.unwrap();
    assert_eq!(selection.sprint_id, 50);
    assert_eq!(selection.board_id, None);
    assert_eq!(searched_jql(&client), vec!["project = X AND sprint = 50 ORDER BY updated DESC"]);
  }

  #[tokio::test]
  async fn test_everything_not_found_yields_no_issues() {
    let client = client(AuthScheme::Basic, |_, _| not_found());

    let result = client
      .search_project_sprint("AIRPMD", "Sprint 73", &["Bug".to_string()], &cancel())
      .await
      .unwrap();
    assert!(result.selection.is_none());
    assert!(result.issues.is_empty());

    // The last tier still queries by the sprint number.
    let jql = searched_jql(&client);
    assert_eq!(jql.len(), 4);
    assert!(jql[0].contains("sprint = 73"));
  }

  #[tokio::test]
  async fn test_cancelled_sprint_search_is_none() {
    let client = client(AuthScheme::Basic, |_, _| not_found());
    let cancel = cancel();
    cancel.token().cancel();

    let found = client
      .search_project_sprint("X", "Sprint 5", &[], &cancel)
      .await;
    assert!(found.is_none());
    assert!(client.transport().requests().is_empty());
  }

  #[tokio::test]
  async fn test_agile_calls_retry_other_scheme_on_auth_failure() {
    let client = client(AuthScheme::Bearer, |url, scheme| {
      if scheme == AuthScheme::Bearer {
        return (401, String::new());
      }
      match url.path() {
        "/rest/agile/1.0/board" => page(vec![json!({"id": 1})], true),
        "/rest/agile/1.0/board/1/sprint" => page(vec![sprint(5, "Sprint 5")], true),
        _ => not_found(),
      }
    });

    assert_eq!(client.resolve_sprint_id("X", "Sprint 5", &cancel()).await, Some(5));
  }

  // --------------------------------------------------------------------------
  // ResolveSprintId / ResolveSprintDateRange
  // --------------------------------------------------------------------------

  #[tokio::test]
  async fn test_resolve_sprint_id_skips_sprint_report() {
    let client = client(AuthScheme::Basic, |url, _| match url.path() {
      "/rest/agile/1.0/board" => page(vec![json!({"id": 1}), json!({"id": 2})], true),
      "/rest/agile/1.0/board/1/sprint" => (400, "board does not support sprints".to_string()),
      "/rest/agile/1.0/board/2/sprint" => page(vec![sprint(8, "Sprint 8"), sprint(9, "Sprint 9")], true),
      _ => not_found(),
    });

    assert_eq!(client.resolve_sprint_id("X", "Sprint 9", &cancel()).await, Some(9));
    assert_eq!(client.resolve_sprint_id("X", "Sprint 99", &cancel()).await, None);
    assert!(!client
      .transport()
      .paths()
      .iter()
      .any(|p| p.ends_with("/sprintreport")));
  }

  #[tokio::test]
  async fn test_date_range_uses_detail_and_activation_fallbacks() {
    let client = client(AuthScheme::Basic, |url, _| match url.path() {
      "/rest/agile/1.0/board" => page(vec![json!({"id": 1})], true),
      "/rest/agile/1.0/board/1/sprint" => page(vec![sprint(6, "Sprint 6")], true),
      "/rest/agile/1.0/sprint/6" => ok(json!({
        "id": 6,
        "name": "Sprint 6",
        "activatedDate": "2024-04-02T08:00:00.000+0000",
        "completeDate": "2024-04-16T18:00:00.000+0000"
      })),
      _ => not_found(),
    });

    let dates = client
      .resolve_sprint_date_range("X", "Sprint 6", &cancel())
      .await
      .unwrap();
    assert_eq!(dates.start.unwrap().to_rfc3339(), "2024-04-02T08:00:00+00:00");
    assert_eq!(dates.end.unwrap().to_rfc3339(), "2024-04-16T18:00:00+00:00");
  }

  #[tokio::test]
  async fn test_date_range_without_any_dates_is_none() {
    let client = client(AuthScheme::Basic, |url, _| match url.path() {
      "/rest/agile/1.0/board" => page(vec![json!({"id": 1})], true),
      "/rest/agile/1.0/board/1/sprint" => page(vec![sprint(6, "Sprint 6")], true),
      _ => not_found(),
    });

    assert!(client
      .resolve_sprint_date_range("X", "Sprint 6", &cancel())
      .await
      .is_none());
  }

  #[tokio::test]
  async fn test_resolve_sprint_scans_boards_once() {
    let client = client(AuthScheme::Basic, |url, _| match url.path() {
      "/rest/agile/1.0/board" => page(vec![json!({"id": 1})], true),
      "/rest/agile/1.0/board/1/sprint" => page(
        vec![json!({
          "id": 6,
          "name": "Sprint 6",
          "startDate": "2024-04-02T08:00:00.000Z",
          "endDate": "2024-04-16T18:00:00.000Z"
        })],
        true,
      ),
      _ => not_found(),
    });

    let resolved = client
      .resolve_sprint("X", "Sprint 6", &cancel())
      .await
      .unwrap();
    assert_eq!(resolved.sprint_id, 6);
    assert_eq!(resolved.name, "Sprint 6");
    assert!(resolved.dates.unwrap().is_complete());
    assert_eq!(
      client.transport().paths(),
      vec!["/rest/agile/1.0/board", "/rest/agile/1.0/board/1/sprint"]
    );
  }

  #[test]
  fn test_base_url_with_context_path() {
    let credentials = Credentials::new("me", "t", AuthScheme::Basic);
    let client = JiraClient::with_transport(
      "https://host.example/jira",
      credentials,
      FakeTransport::new(|_, _| not_found()),
    )
    .unwrap();
    let url = client
      .endpoint("rest/api/2/myself", &[("a", "b c".to_string())])
      .unwrap();
    assert_eq!(url.as_str(), "https://host.example/jira/rest/api/2/myself?a=b+c");
  }

  #[test]
  fn test_truncate_body() {
    assert_eq!(truncate_body(" short "), "short");
    let long = "é".repeat(250);
    let cut = truncate_body(&long);
    assert!(cut.ends_with("..."));
    assert_eq!(cut.chars().count(), DIAGNOSTIC_BODY_CHARS + 3);
  }
}
