//! Domain layer for the escrow saga system.
//!
//! This crate provides:
//! - The Escrow aggregate with its status state machine and audit log
//! - Payment ledger rows written for every gateway action
//! - Webhook idempotency records
//! - Caller identity and roles used for access checks

pub mod access;
pub mod escrow;
pub mod payment;
pub mod webhook;

pub use access::{Caller, Role};
pub use escrow::{
    DEFAULT_AUTO_RELEASE_DAYS, DisputeResolution, Escrow, EscrowError, EscrowEvent,
    EscrowEventKind, EscrowStatus, HoldTerms, NewEscrow, PaymentInfo, PayoutInfo, PayoutStatus,
    SYSTEM_ACTOR, Settlement,
};
pub use payment::{PaymentAction, PaymentRecord, PaymentStatus};
pub use webhook::WebhookRecord;
