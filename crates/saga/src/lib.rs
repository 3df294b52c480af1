//! Saga pattern implementation for escrow creation.
//!
//! This crate provides the Saga Pattern for orchestrating a multi-step
//! distributed transaction with compensating actions on failure, plus the
//! escrow operations that follow it.
//!
//! The escrow creation saga follows these steps:
//! 1. Create escrow
//! 2. Authorize payment
//! 3. Reserve listing
//! 4. Create order
//! 5. Capture payment
//!
//! If any step fails, previously completed steps are compensated in reverse order.

pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod escrow_service;
pub mod orchestrator;
pub mod services;
pub mod step;
pub mod steps;
pub mod webhook;

pub use collaborators::Collaborators;
pub use config::SagaConfig;
pub use context::{SagaContext, StepData};
pub use error::{Result, SagaError};
pub use escrow_service::{CreateEscrowRequest, EscrowService, TransitionOutcome};
pub use orchestrator::{SagaOrchestrator, SagaResult};
pub use services::{
    InMemoryListingService, InMemoryOrderService, InMemoryPaymentGateway, InMemoryWalletService,
    Listing, ListingService, ListingStatus, OrderService, OrderStatus, PaymentGateway,
    WalletService,
};
pub use step::SagaStep;
pub use webhook::{WebhookIngestor, WebhookOutcome};
