//! Turning a sprint's issues into a status report.

pub mod aggregate;
pub mod buckets;
pub mod narrative;
pub mod template;
