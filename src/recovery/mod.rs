//! Root-cause analysis and best-effort remediation for failed strategies.

mod analyzer;
mod remediator;

pub use analyzer::{RootCause, RootCauseAnalyzer};
pub use remediator::{LogRemediator, Remediator};
