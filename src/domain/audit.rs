use super::booking::{BookingEvent, BookingId, BookingStatus};
use super::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditKind {
    /// A state-machine guard refused a transition.
    RejectedTransition {
        from: BookingStatus,
        event: BookingEvent,
        guard: String,
    },
    /// Reconciliation found something a human has to look at.
    ManualReview { reference: String, reason: String },
    /// A gateway event that could not be matched or was stale.
    DiscardedEvent { reference: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub booking: Option<BookingId>,
    pub actor: Option<UserId>,
    #[serde(flatten)]
    pub kind: AuditKind,
}

impl AuditEntry {
    pub fn needs_review(&self) -> bool {
        matches!(self.kind, AuditKind::ManualReview { .. })
    }
}
