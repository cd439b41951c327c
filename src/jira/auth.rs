//! Authorization header schemes.
//!
//! Jira Cloud expects Basic auth (email + API token) while self-hosted
//! instances usually expect a personal access token as Bearer. Both headers
//! are built once; each request names the scheme it uses.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScheme {
  Basic,
  Bearer,
}

impl AuthScheme {
  pub fn other(self) -> Self {
    match self {
      AuthScheme::Basic => AuthScheme::Bearer,
      AuthScheme::Bearer => AuthScheme::Basic,
    }
  }

  /// Preferred scheme first, then the fallback.
  pub fn order(preferred: Self) -> [Self; 2] {
    [preferred, preferred.other()]
  }
}

impl fmt::Display for AuthScheme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AuthScheme::Basic => write!(f, "Basic"),
      AuthScheme::Bearer => write!(f, "Bearer"),
    }
  }
}

/// Immutable credential handle with both header values pre-built.
#[derive(Clone)]
pub struct Credentials {
  basic: String,
  bearer: String,
  preferred: AuthScheme,
}

impl Credentials {
  pub fn new(principal: &str, secret: &str, preferred: AuthScheme) -> Self {
    let encoded = STANDARD.encode(format!("{}:{}", principal, secret));
    Self {
      basic: format!("Basic {}", encoded),
      bearer: format!("Bearer {}", secret),
      preferred,
    }
  }

  pub fn header(&self, scheme: AuthScheme) -> &str {
    match scheme {
      AuthScheme::Basic => &self.basic,
      AuthScheme::Bearer => &self.bearer,
    }
  }

  pub fn preferred(&self) -> AuthScheme {
    self.preferred
  }

  pub fn schemes(&self) -> [AuthScheme; 2] {
    AuthScheme::order(self.preferred)
  }
}

// Keep secrets out of logs.
impl fmt::Debug for Credentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credentials")
      .field("preferred", &self.preferred)
      .finish_non_exhaustive()
  }
}
