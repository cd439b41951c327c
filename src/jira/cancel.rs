use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cancellation signal plus time budget for one top-level operation.
///
/// A caller that supersedes a running search cancels the token it handed
/// out; the operation then yields its empty value instead of partial data.
#[derive(Debug, Clone)]
pub struct Cancellation {
  token: CancellationToken,
  timeout: Duration,
}

impl Cancellation {
  pub fn new(timeout: Duration) -> Self {
    Self {
      token: CancellationToken::new(),
      timeout,
    }
  }

  pub fn token(&self) -> CancellationToken {
    self.token.clone()
  }

  /// Drive `fut` to completion unless cancelled or out of time.
  pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
    tokio::select! {
      biased;
      _ = self.token.cancelled() => None,
      result = tokio::time::timeout(self.timeout, fut) => result.ok(),
    }
  }
}
