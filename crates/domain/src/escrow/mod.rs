//! Escrow aggregate and related types.

mod aggregate;
mod events;
mod state;
mod value_objects;

pub use aggregate::{Escrow, NewEscrow};
pub use events::{EscrowEvent, EscrowEventKind, SYSTEM_ACTOR};
pub use state::EscrowStatus;
pub use value_objects::{
    DEFAULT_AUTO_RELEASE_DAYS, DisputeResolution, HoldTerms, PaymentInfo, PayoutInfo,
    PayoutStatus, Settlement,
};

use common::{Money, OrderId};
use thiserror::Error;

/// Errors raised by escrow commands.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// Escrow is not in a status that allows the action.
    #[error("Invalid state transition: cannot {action} from {current} state")]
    InvalidStateTransition {
        current: EscrowStatus,
        action: &'static str,
    },

    /// Escrow amount must be positive.
    #[error("Invalid amount: {cents} cents (must be greater than 0)")]
    InvalidAmount { cents: i64 },

    /// Held amount cannot exceed the escrow total.
    #[error("Held amount {hold} exceeds escrow total {total}")]
    HoldExceedsTotal { hold: Money, total: Money },

    /// Buyer and seller are the same user.
    #[error("Buyer and seller must be different users")]
    SameParty,

    /// A different order is already linked.
    #[error("Escrow is already linked to order {existing}")]
    OrderAlreadyLinked { existing: OrderId },

    /// The held funds are already claimed for a payout.
    #[error("Settlement {pending} is already in progress")]
    SettlementInProgress { pending: Settlement },
}
