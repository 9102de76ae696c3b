use async_trait::async_trait;
use tracing::info;

use super::RootCause;
use crate::error::Result;

/// Best-effort corrective action for an implicated component. Remediation
/// failure never aborts the learning update that triggered it.
#[async_trait]
pub trait Remediator: Send + Sync {
    async fn remediate(&self, cause: &RootCause) -> Result<()>;
}

/// Default remediator: records the proposed action and moves on.
pub struct LogRemediator;

#[async_trait]
impl Remediator for LogRemediator {
    async fn remediate(&self, cause: &RootCause) -> Result<()> {
        info!(
            component = %cause.component,
            action = cause.suggested_action.as_deref().unwrap_or("none"),
            "Remediation proposed"
        );
        Ok(())
    }
}
