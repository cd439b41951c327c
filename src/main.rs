mod config;
mod jira;
mod report;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use jira::cancel::Cancellation;
use jira::client::JiraClient;
use report::aggregate::dedupe_by_key;
use report::template::{DocumentTemplater, HtmlTemplater, ReportData};

#[derive(Parser, Debug)]
#[command(name = "jira-sprint-report")]
#[command(about = "Pull a Jira sprint's issues and fill a status report template")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/jira-sprint-report/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log at debug level to stderr instead of the log file
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Check that the configured credentials are accepted
  Validate,
  /// Run a JQL query
  Search {
    jql: String,
    /// Print issues as JSON
    #[arg(long)]
    json: bool,
  },
  /// Resolve a sprint description to its id and dates
  Sprint {
    #[arg(short, long)]
    project: String,
    #[arg(short, long)]
    sprint: String,
    /// Print only the sprint id
    #[arg(long, conflicts_with = "dates")]
    id: bool,
    /// Print only the date range
    #[arg(long)]
    dates: bool,
  },
  /// Build the status report for a sprint
  Report {
    #[arg(short, long)]
    project: String,
    #[arg(short, long)]
    sprint: String,
    /// Issue types to include (comma separated); defaults to the config
    #[arg(long, value_delimiter = ',')]
    types: Vec<String>,
    #[arg(long)]
    template: Option<PathBuf>,
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
  use tracing_subscriber::EnvFilter;

  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  let log_dir = dirs::data_dir().map(|d| d.join("jira-sprint-report").join("logs"));
  match log_dir {
    Some(dir) if !verbose && std::fs::create_dir_all(&dir).is_ok() => {
      let appender = tracing_appender::rolling::daily(dir, "jira-sprint-report.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Some(guard)
    }
    _ => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      None
    }
  }
}

/// Cancel the operation budget when the user hits Ctrl-C.
fn cancel_on_ctrl_c(cancel: &Cancellation) {
  let token = cancel.token();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      token.cancel();
    }
  });
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = setup_logging(args.verbose);

  let config = config::Config::load(args.config.as_deref())?;
  let client = JiraClient::new(&config)?;
  let cancel = Cancellation::new(config.jira.timeout());
  cancel_on_ctrl_c(&cancel);

  match args.command {
    Command::Validate => {
      let check = client.validate_credentials(&cancel).await;
      if !check.ok {
        return Err(eyre!(check.message));
      }
      println!("{}", check.message);
    }
    Command::Search { jql, json } => {
      let issues = client.search(&jql, &cancel).await;
      if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
      } else {
        for issue in &issues {
          println!(
            "{:<12} {:<10} {:<16} {}",
            issue.key, issue.issue_type, issue.status, issue.summary
          );
        }
        println!("{} issue(s)", issues.len());
      }
    }
    Command::Sprint {
      project,
      sprint,
      id,
      dates,
    } => {
      let no_match = || eyre!("No sprint matches {:?} in {}", sprint, project);
      if id {
        let sprint_id = client
          .resolve_sprint_id(&project, &sprint, &cancel)
          .await
          .ok_or_else(no_match)?;
        println!("{}", sprint_id);
      } else if dates {
        let range = client
          .resolve_sprint_date_range(&project, &sprint, &cancel)
          .await
          .ok_or_else(no_match)?;
        println!("{}", report::narrative::describe_dates(&range).unwrap_or_default());
      } else {
        let resolved = client
          .resolve_sprint(&project, &sprint, &cancel)
          .await
          .ok_or_else(no_match)?;
        println!("Sprint id: {} ({})", resolved.sprint_id, resolved.name);
        if let Some(range) = resolved
          .dates
          .as_ref()
          .and_then(report::narrative::describe_dates)
        {
          println!("Runs {}", range);
        }
      }
    }
    Command::Report {
      project,
      sprint,
      types,
      template,
      output,
    } => {
      let types = if types.is_empty() {
        config.report.issue_types.clone()
      } else {
        types
      };
      let template = template.unwrap_or_else(|| config.report.template.clone());
      let output = output.unwrap_or_else(|| config.report.output.clone());

      let found = client
        .search_project_sprint(&project, &sprint, &types, &cancel)
        .await
        .ok_or_else(|| {
          eyre!(
            "Sprint search cancelled or timed out; {} left untouched",
            output.display()
          )
        })?;
      info!(
        project = %project,
        sprint = %sprint,
        sprint_id = ?found.selection.as_ref().map(|s| s.sprint_id),
        issues = found.issues.len(),
        "Sprint issues fetched"
      );

      let data = ReportData::new(&project, &sprint, found.dates, dedupe_by_key(found.issues));
      HtmlTemplater.render(&template, &output, &data)?;

      println!("{}", data.summary);
      println!("Report written to {}", output.display());
    }
  }

  Ok(())
}
