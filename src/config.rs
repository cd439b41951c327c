use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::jira::auth::AuthScheme;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub jira: JiraConfig,
  #[serde(default)]
  pub report: ReportConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
  /// Auto-detect based on URL: .atlassian.net = cloud, else on-premise
  #[default]
  Auto,
  /// Jira Cloud - uses Basic auth (email + API token as password)
  Cloud,
  /// Jira On-premise - uses Bearer auth (PAT) with Basic as fallback
  Onpremise,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraConfig {
  pub url: String,
  pub email: String,
  /// Authentication type: auto, cloud, or onpremise
  #[serde(default)]
  pub auth_type: AuthType,
  /// Budget for one top-level operation (validate, search, resolve)
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Only accept exact sprint-name matches that mention the project key
  #[serde(default)]
  pub require_project_in_sprint_name: bool,
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
  #[serde(default = "default_template")]
  pub template: PathBuf,
  #[serde(default = "default_output")]
  pub output: PathBuf,
  /// Issue types to include; empty means every type
  #[serde(default)]
  pub issue_types: Vec<String>,
}

fn default_template() -> PathBuf {
  PathBuf::from("template.html")
}

fn default_output() -> PathBuf {
  PathBuf::from("report.html")
}

impl Default for ReportConfig {
  fn default() -> Self {
    Self {
      template: default_template(),
      output: default_output(),
      issue_types: Vec::new(),
    }
  }
}

impl JiraConfig {
  /// The scheme tried first; the other one is the fallback.
  pub fn preferred_scheme(&self) -> AuthScheme {
    match self.auth_type {
      AuthType::Cloud => AuthScheme::Basic,
      AuthType::Onpremise => AuthScheme::Bearer,
      AuthType::Auto => {
        let is_cloud = url::Url::parse(&self.url)
          .ok()
          .and_then(|u| u.host_str().map(|h| h.ends_with(".atlassian.net")))
          .unwrap_or(false);
        if is_cloud {
          AuthScheme::Basic
        } else {
          AuthScheme::Bearer
        }
      }
    }
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./jira-sprint-report.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/jira-sprint-report/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/jira-sprint-report/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("jira-sprint-report.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("jira-sprint-report").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the Jira secret (API token or personal access token) from the environment.
  ///
  /// Checks JSR_JIRA_TOKEN first, then JIRA_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("JSR_JIRA_TOKEN")
      .or_else(|_| std::env::var("JIRA_API_TOKEN"))
      .map_err(|_| {
        eyre!("Jira token not found. Set JSR_JIRA_TOKEN or JIRA_API_TOKEN environment variable.")
      })
  }
}
