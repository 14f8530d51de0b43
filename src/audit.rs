/// Audit trail records
///
/// Security-relevant actions (sign-ups, logins, invitation issuance and
/// consumption, password resets) are recorded as structured events on the
/// `audit` tracing target, so operators can filter them out of the regular
/// request logs.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Failure => "FAILURE",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub action: String,
    pub resource: String,
    pub outcome: AuditOutcome,
    pub detail: String,
    pub resource_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        action: impl Into<String>,
        resource: impl Into<String>,
        outcome: AuditOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            outcome,
            detail: detail.into(),
            resource_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Emit the record on the `audit` target
    pub fn emit(&self) {
        tracing::info!(
            target: "audit",
            action = %self.action,
            resource = %self.resource,
            outcome = self.outcome.as_str(),
            detail = %self.detail,
            resource_id = self.resource_id.as_deref().unwrap_or("-"),
            timestamp = %self.timestamp.to_rfc3339(),
            "Audit event"
        );
    }
}
