//! Order service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{EscrowId, ListingId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::simulate_latency;
use crate::error::SagaError;

/// Fulfillment status of an order, as reported by the order service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Shipped,
    Delivered,
    Returned,
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Returned => "Returned",
            OrderStatus::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

/// Trait for order service operations.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Creates an order for the buyer, backed by the escrow.
    ///
    /// Returns None if the service refused to create the order.
    async fn create_order(
        &self,
        buyer: &UserId,
        listing: &ListingId,
        escrow: EscrowId,
    ) -> Result<Option<OrderId>, SagaError>;

    /// Cancels an order. Returns false if the service rejected the cancellation.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<bool, SagaError>;

    /// Returns the current status of an order, or None if it doesn't exist.
    async fn get_order_status(&self, order_id: &OrderId) -> Result<Option<OrderStatus>, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderId, OrderStatus>,
    cancelled: Vec<OrderId>,
    next_id: u32,
    fail_on_create: bool,
    reject_create: bool,
    fail_on_cancel: bool,
    delay: Option<Duration>,
}

/// In-memory order service for testing.
///
/// Order IDs are assigned sequentially (`ord_1`, `ord_2`, ...).
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderService {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderService {
    /// Creates a new in-memory order service.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryOrderState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryOrderState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures `create_order` to fail with an error.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    /// Configures `create_order` to return no order ID.
    pub fn set_reject_create(&self, reject: bool) {
        self.write().reject_create = reject;
    }

    /// Configures `cancel_order` to fail with an error.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.write().fail_on_cancel = fail;
    }

    /// Delays every call by the given duration.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Inserts or overwrites an order, simulating fulfillment progress.
    pub fn set_status(&self, order_id: &OrderId, status: OrderStatus) {
        self.write().orders.insert(order_id.clone(), status);
    }

    /// Returns the number of orders known to the service.
    pub fn order_count(&self) -> usize {
        self.read().orders.len()
    }

    /// Returns every order passed to `cancel_order`, oldest first.
    pub fn cancelled(&self) -> Vec<OrderId> {
        self.read().cancelled.clone()
    }

    fn delay(&self) -> Option<Duration> {
        self.read().delay
    }
}

#[async_trait]
impl OrderService for InMemoryOrderService {
    async fn create_order(
        &self,
        _buyer: &UserId,
        _listing: &ListingId,
        _escrow: EscrowId,
    ) -> Result<Option<OrderId>, SagaError> {
        simulate_latency(self.delay()).await;
        let mut state = self.write();

        if state.fail_on_create {
            return Err(SagaError::OrderService("Order service unavailable".to_string()));
        }
        if state.reject_create {
            return Ok(None);
        }

        state.next_id += 1;
        let order_id = OrderId::new(format!("ord_{}", state.next_id));
        state.orders.insert(order_id.clone(), OrderStatus::Pending);

        Ok(Some(order_id))
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<bool, SagaError> {
        simulate_latency(self.delay()).await;
        let mut state = self.write();
        state.cancelled.push(order_id.clone());

        if state.fail_on_cancel {
            return Err(SagaError::OrderService("Order service unavailable".to_string()));
        }

        match state.orders.get_mut(order_id) {
            Some(status) => {
                *status = OrderStatus::Cancelled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_order_status(&self, order_id: &OrderId) -> Result<Option<OrderStatus>, SagaError> {
        simulate_latency(self.delay()).await;
        Ok(self.read().orders.get(order_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_cancel() {
        let service = InMemoryOrderService::new();
        let order_id = service
            .create_order(
                &UserId::new("buyer"),
                &ListingId::new("listing-1"),
                EscrowId::new(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(order_id.as_str(), "ord_1");
        assert_eq!(
            service.get_order_status(&order_id).await.unwrap(),
            Some(OrderStatus::Pending)
        );

        assert!(service.cancel_order(&order_id).await.unwrap());
        assert_eq!(
            service.get_order_status(&order_id).await.unwrap(),
            Some(OrderStatus::Cancelled)
        );
        assert_eq!(service.cancelled(), vec![order_id]);
    }

    #[tokio::test]
    async fn test_reject_create_returns_none() {
        let service = InMemoryOrderService::new();
        service.set_reject_create(true);

        let result = service
            .create_order(
                &UserId::new("buyer"),
                &ListingId::new("listing-1"),
                EscrowId::new(),
            )
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(service.order_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let service = InMemoryOrderService::new();
        let missing = OrderId::new("ord_404");
        assert_eq!(service.get_order_status(&missing).await.unwrap(), None);
        assert!(!service.cancel_order(&missing).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_status() {
        let service = InMemoryOrderService::new();
        let order_id = OrderId::new("ord_external");
        service.set_status(&order_id, OrderStatus::Delivered);
        assert_eq!(
            service.get_order_status(&order_id).await.unwrap(),
            Some(OrderStatus::Delivered)
        );
    }
}
