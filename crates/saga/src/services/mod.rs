//! External service traits and in-memory implementations for saga steps.

pub mod listing;
pub mod order;
pub mod payment;
pub mod wallet;

use std::future::Future;
use std::time::Duration;

pub use listing::{InMemoryListingService, Listing, ListingService, ListingStatus};
pub use order::{InMemoryOrderService, OrderService, OrderStatus};
pub use payment::{GatewayCall, InMemoryPaymentGateway, IntentStatus, PaymentGateway};
pub use wallet::{InMemoryWalletService, WalletOperation, WalletOperationKind, WalletService};

use crate::error::{Result, SagaError};

/// Runs an external call, failing with [`SagaError::Timeout`] if it does not
/// finish within `limit`.
pub async fn call_with_timeout<T, F>(operation: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SagaError::Timeout {
            operation: operation.to_string(),
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Sleeps for the injected delay, if any.
pub(crate) async fn simulate_latency(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}
