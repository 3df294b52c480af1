//! Handles to the stores and external services the saga talks to.

use std::sync::Arc;

use escrow_store::{EscrowRepository, PaymentRepository};

use crate::services::{ListingService, OrderService, PaymentGateway, WalletService};

/// Shared dependencies of the saga steps and the escrow service.
#[derive(Clone)]
pub struct Collaborators {
    pub escrows: Arc<dyn EscrowRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub orders: Arc<dyn OrderService>,
    pub listings: Arc<dyn ListingService>,
    pub wallet: Arc<dyn WalletService>,
}
