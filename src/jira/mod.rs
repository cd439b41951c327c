pub mod api_types;
pub mod auth;
pub mod cancel;
pub mod client;
pub mod jql;
pub mod sprint_match;
pub mod transport;
pub mod types;
