//! Escrow audit log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actor recorded for entries written by the saga rather than a person.
pub const SYSTEM_ACTOR: &str = "system";

/// The kind of state change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowEventKind {
    Created,
    Authorized,
    AuthorizationCancelled,
    Captured,
    Released,
    Refunded,
    Disputed,
    Resolved,
    Failed,
}

impl EscrowEventKind {
    /// Returns the kind name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowEventKind::Created => "CREATED",
            EscrowEventKind::Authorized => "AUTHORIZED",
            EscrowEventKind::AuthorizationCancelled => "AUTHORIZATION_CANCELLED",
            EscrowEventKind::Captured => "CAPTURED",
            EscrowEventKind::Released => "RELEASED",
            EscrowEventKind::Refunded => "REFUNDED",
            EscrowEventKind::Disputed => "DISPUTED",
            EscrowEventKind::Resolved => "RESOLVED",
            EscrowEventKind::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for EscrowEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of an escrow's append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: EscrowEventKind,

    /// When it happened.
    pub at: DateTime<Utc>,

    /// Who caused it: a user ID, or [`SYSTEM_ACTOR`].
    pub by: String,

    /// Free-form human readable detail.
    pub description: String,
}

impl EscrowEvent {
    /// Creates an entry stamped with the current time.
    pub fn now(kind: EscrowEventKind, by: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            at: Utc::now(),
            by: by.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_kind_as_type() {
        let event = EscrowEvent::now(EscrowEventKind::Captured, SYSTEM_ACTOR, "funds captured");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CAPTURED");
        assert_eq!(json["by"], "system");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(
            EscrowEventKind::AuthorizationCancelled.to_string(),
            "AUTHORIZATION_CANCELLED"
        );
    }
}
