//! Shared identifiers and value types used across the escrow workspace.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{EscrowId, ListingId, OrderId, UserId, Version};
