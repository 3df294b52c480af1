//! The steps of the escrow creation saga, in execution order:
//! 1. Create escrow
//! 2. Authorize payment
//! 3. Reserve listing
//! 4. Create order
//! 5. Capture payment

pub mod authorize_payment;
pub mod capture_payment;
pub mod create_escrow;
pub mod create_order;
pub mod reserve_listing;

use std::sync::Arc;

pub use authorize_payment::AuthorizePaymentStep;
pub use capture_payment::CapturePaymentStep;
pub use create_escrow::CreateEscrowStep;
pub use create_order::CreateOrderStep;
pub use reserve_listing::ReserveListingStep;

use crate::collaborators::Collaborators;
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::step::SagaStep;

/// Step names.
pub const STEP_CREATE_ESCROW: &str = "create_escrow";
pub const STEP_AUTHORIZE_PAYMENT: &str = "authorize_payment";
pub const STEP_RESERVE_LISTING: &str = "reserve_listing";
pub const STEP_CREATE_ORDER: &str = "create_order";
pub const STEP_CAPTURE_PAYMENT: &str = "capture_payment";

/// Builds the escrow creation sequence.
pub fn escrow_creation_steps(
    collaborators: &Collaborators,
    config: &SagaConfig,
) -> Vec<Arc<dyn SagaStep>> {
    vec![
        Arc::new(CreateEscrowStep::new(collaborators.clone(), config.clone())),
        Arc::new(AuthorizePaymentStep::new(
            collaborators.clone(),
            config.clone(),
        )),
        Arc::new(ReserveListingStep::new(
            collaborators.clone(),
            config.clone(),
        )),
        Arc::new(CreateOrderStep::new(collaborators.clone(), config.clone())),
        Arc::new(CapturePaymentStep::new(
            collaborators.clone(),
            config.clone(),
        )),
    ]
}

/// Unwraps a value an earlier step must have put in the context.
pub(crate) fn required<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| SagaError::PreconditionFailed(format!("{what} missing from saga context")))
}
