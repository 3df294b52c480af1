//! Escrow state machine.

use serde::{Deserialize, Serialize};

/// The status of an escrow in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► Authorized ──► Holding ──┬──► Released
///    │             │                   ├──► Refunded
///    └─────────────┴──► Failed         └──► Disputed ──► Resolved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    /// Escrow document exists, no money has moved yet.
    #[default]
    Created,

    /// A payment hold was placed at the gateway.
    Authorized,

    /// Funds were captured and are held on behalf of both parties.
    Holding,

    /// Funds were paid out to the seller (terminal state).
    Released,

    /// Funds were returned to the buyer (terminal state).
    Refunded,

    /// One of the parties contested the transaction.
    Disputed,

    /// An operator settled the dispute (terminal state).
    Resolved,

    /// The creation saga was rolled back (terminal state).
    Failed,
}

impl EscrowStatus {
    /// Returns true if the escrow may move from this status to `next`.
    pub fn can_transition_to(&self, next: EscrowStatus) -> bool {
        use EscrowStatus::*;
        matches!(
            (self, next),
            (Created, Authorized)
                | (Created, Failed)
                | (Authorized, Holding)
                | (Authorized, Failed)
                | (Holding, Released)
                | (Holding, Refunded)
                | (Holding, Disputed)
                | (Disputed, Resolved)
        )
    }

    /// Returns true if funds are currently held and a payout decision is pending.
    pub fn is_holding(&self) -> bool {
        matches!(self, EscrowStatus::Holding)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EscrowStatus::Released
                | EscrowStatus::Refunded
                | EscrowStatus::Failed
                | EscrowStatus::Resolved
        )
    }

    /// Returns the status name as stored and exposed over the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Created => "CREATED",
            EscrowStatus::Authorized => "AUTHORIZED",
            EscrowStatus::Holding => "HOLDING",
            EscrowStatus::Released => "RELEASED",
            EscrowStatus::Refunded => "REFUNDED",
            EscrowStatus::Disputed => "DISPUTED",
            EscrowStatus::Resolved => "RESOLVED",
            EscrowStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EscrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(EscrowStatus::Created),
            "AUTHORIZED" => Ok(EscrowStatus::Authorized),
            "HOLDING" => Ok(EscrowStatus::Holding),
            "RELEASED" => Ok(EscrowStatus::Released),
            "REFUNDED" => Ok(EscrowStatus::Refunded),
            "DISPUTED" => Ok(EscrowStatus::Disputed),
            "RESOLVED" => Ok(EscrowStatus::Resolved),
            "FAILED" => Ok(EscrowStatus::Failed),
            other => Err(format!("unknown escrow status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EscrowStatus; 8] = [
        EscrowStatus::Created,
        EscrowStatus::Authorized,
        EscrowStatus::Holding,
        EscrowStatus::Released,
        EscrowStatus::Refunded,
        EscrowStatus::Disputed,
        EscrowStatus::Resolved,
        EscrowStatus::Failed,
    ];

    #[test]
    fn test_default_status_is_created() {
        assert_eq!(EscrowStatus::default(), EscrowStatus::Created);
    }

    #[test]
    fn test_forward_path() {
        assert!(EscrowStatus::Created.can_transition_to(EscrowStatus::Authorized));
        assert!(EscrowStatus::Authorized.can_transition_to(EscrowStatus::Holding));
        assert!(EscrowStatus::Holding.can_transition_to(EscrowStatus::Released));
        assert!(EscrowStatus::Holding.can_transition_to(EscrowStatus::Refunded));
        assert!(EscrowStatus::Holding.can_transition_to(EscrowStatus::Disputed));
        assert!(EscrowStatus::Disputed.can_transition_to(EscrowStatus::Resolved));
    }

    #[test]
    fn test_failed_only_reachable_before_holding() {
        assert!(EscrowStatus::Created.can_transition_to(EscrowStatus::Failed));
        assert!(EscrowStatus::Authorized.can_transition_to(EscrowStatus::Failed));
        assert!(!EscrowStatus::Holding.can_transition_to(EscrowStatus::Failed));
        assert!(!EscrowStatus::Disputed.can_transition_to(EscrowStatus::Failed));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn test_no_skipping_authorization() {
        assert!(!EscrowStatus::Created.can_transition_to(EscrowStatus::Holding));
        assert!(!EscrowStatus::Authorized.can_transition_to(EscrowStatus::Released));
    }

    #[test]
    fn test_string_roundtrip() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<EscrowStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<EscrowStatus>().is_err());
    }

    #[test]
    fn test_serialization_uses_screaming_case() {
        let json = serde_json::to_string(&EscrowStatus::Holding).unwrap();
        assert_eq!(json, "\"HOLDING\"");
    }
}
