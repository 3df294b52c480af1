//! Value objects embedded in the escrow document.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

/// Default number of days funds stay held before they become eligible for auto-release.
pub const DEFAULT_AUTO_RELEASE_DAYS: u32 = 7;

/// Hold terms fixed when the escrow is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldTerms {
    /// Grace period after capture before funds may be auto-released to the seller.
    pub auto_release_days: u32,

    /// Deadline computed when funds start holding.
    pub auto_release_at: Option<DateTime<Utc>>,
}

impl HoldTerms {
    /// Creates hold terms with the given grace period.
    pub fn new(auto_release_days: u32) -> Self {
        Self {
            auto_release_days,
            auto_release_at: None,
        }
    }
}

impl Default for HoldTerms {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_RELEASE_DAYS)
    }
}

/// Gateway-side payment metadata for an escrow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    /// Payment provider name.
    pub provider: Option<String>,

    /// Payment intent identifier at the provider.
    pub intent_id: Option<String>,

    pub authorized_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Whether the seller has been paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    #[default]
    Pending,
    Paid,
}

/// Seller payout metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutInfo {
    /// Account credited on release.
    pub seller_account: Option<UserId>,
    pub status: PayoutStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

/// How an operator settles a disputed escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    /// Pay the held funds out to the seller.
    ReleaseToSeller,
    /// Return the held funds to the buyer.
    RefundToBuyer,
}

impl std::fmt::Display for DisputeResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisputeResolution::ReleaseToSeller => write!(f, "release_to_seller"),
            DisputeResolution::RefundToBuyer => write!(f, "refund_to_buyer"),
        }
    }
}

impl From<DisputeResolution> for Settlement {
    fn from(resolution: DisputeResolution) -> Self {
        match resolution {
            DisputeResolution::ReleaseToSeller => Settlement::ToSeller,
            DisputeResolution::RefundToBuyer => Settlement::ToBuyer,
        }
    }
}

/// Direction of a payout that was claimed but is not confirmed yet.
///
/// Stored on the escrow before any money moves, so that concurrent
/// operations conflict instead of paying twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Held funds go to the seller.
    ToSeller,
    /// Held funds go back to the buyer.
    ToBuyer,
}

impl Settlement {
    /// Returns the direction name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Settlement::ToSeller => "to_seller",
            Settlement::ToBuyer => "to_buyer",
        }
    }
}

impl std::fmt::Display for Settlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
