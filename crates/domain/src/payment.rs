//! Payment ledger rows.

use chrono::{DateTime, Utc};
use common::{EscrowId, Money};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gateway action recorded by a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentAction {
    Authorize,
    Capture,
    Refund,
    Cancel,
}

impl PaymentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentAction::Authorize => "AUTHORIZE",
            PaymentAction::Capture => "CAPTURE",
            PaymentAction::Refund => "REFUND",
            PaymentAction::Cancel => "CANCEL",
        }
    }
}

impl std::fmt::Display for PaymentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTHORIZE" => Ok(PaymentAction::Authorize),
            "CAPTURE" => Ok(PaymentAction::Capture),
            "REFUND" => Ok(PaymentAction::Refund),
            "CANCEL" => Ok(PaymentAction::Cancel),
            other => Err(format!("unknown payment action: {other}")),
        }
    }
}

/// Outcome of a gateway action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCEEDED" => Ok(PaymentStatus::Succeeded),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// An immutable ledger row for one gateway action against an escrow.
///
/// At most one succeeded row exists per `(provider, intent_id, action)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub escrow_id: EscrowId,
    pub provider: String,
    pub intent_id: String,
    pub action: PaymentAction,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Creates a row for an action the gateway accepted.
    pub fn succeeded(
        escrow_id: EscrowId,
        provider: impl Into<String>,
        intent_id: impl Into<String>,
        action: PaymentAction,
        amount: Money,
        currency: impl Into<String>,
    ) -> Self {
        Self::new(
            escrow_id,
            provider,
            intent_id,
            action,
            amount,
            currency,
            PaymentStatus::Succeeded,
        )
    }

    /// Creates a row for an action the gateway rejected.
    pub fn failed(
        escrow_id: EscrowId,
        provider: impl Into<String>,
        intent_id: impl Into<String>,
        action: PaymentAction,
        amount: Money,
        currency: impl Into<String>,
    ) -> Self {
        Self::new(
            escrow_id,
            provider,
            intent_id,
            action,
            amount,
            currency,
            PaymentStatus::Failed,
        )
    }

    /// Creates a row with an explicit outcome.
    pub fn new(
        escrow_id: EscrowId,
        provider: impl Into<String>,
        intent_id: impl Into<String>,
        action: PaymentAction,
        amount: Money,
        currency: impl Into<String>,
        status: PaymentStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            escrow_id,
            provider: provider.into(),
            intent_id: intent_id.into(),
            action,
            amount,
            currency: currency.into(),
            status,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the gateway accepted the action.
    pub fn is_succeeded(&self) -> bool {
        self.status == PaymentStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_status() {
        let escrow_id = EscrowId::new();
        let ok = PaymentRecord::succeeded(
            escrow_id,
            "mock",
            "pi_1",
            PaymentAction::Authorize,
            Money::from_cents(100),
            "USD",
        );
        assert!(ok.is_succeeded());
        assert_eq!(ok.escrow_id, escrow_id);

        let failed = PaymentRecord::failed(
            escrow_id,
            "mock",
            "pi_1",
            PaymentAction::Capture,
            Money::from_cents(100),
            "USD",
        );
        assert!(!failed.is_succeeded());
        assert_ne!(ok.id, failed.id);
    }

    #[test]
    fn test_action_parsing() {
        for action in [
            PaymentAction::Authorize,
            PaymentAction::Capture,
            PaymentAction::Refund,
            PaymentAction::Cancel,
        ] {
            assert_eq!(action.as_str().parse::<PaymentAction>().unwrap(), action);
        }
        assert!("VOID".parse::<PaymentAction>().is_err());
    }
}
