//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, UserId};

use super::simulate_latency;
use crate::error::SagaError;

/// Trait for payment gateway operations.
///
/// A payment is first authorized (a hold on the buyer's funds identified by
/// an intent ID), then captured, and may later be refunded. Uncaptured
/// intents can be cancelled.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Name of the provider, recorded on ledger rows.
    fn provider(&self) -> &str;

    /// Authorizes a payment and returns the intent ID.
    async fn authorize(&self, customer: &UserId, amount: Money) -> Result<String, SagaError>;

    /// Captures a previously authorized intent.
    async fn capture(&self, intent_id: &str) -> Result<(), SagaError>;

    /// Refunds a captured intent.
    async fn refund(&self, intent_id: &str, amount: Money) -> Result<(), SagaError>;

    /// Voids an uncaptured intent.
    async fn cancel(&self, intent_id: &str) -> Result<(), SagaError>;
}

/// Lifecycle of an intent held by the in-memory gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Authorized,
    Captured,
    Refunded,
    Cancelled,
}

/// A call received by the in-memory gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Authorize { customer: UserId, amount: Money },
    Capture { intent_id: String },
    Refund { intent_id: String, amount: Money },
    Cancel { intent_id: String },
}

#[derive(Debug)]
struct Intent {
    amount: Money,
    status: IntentStatus,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<String, Intent>,
    calls: Vec<GatewayCall>,
    next_id: u32,
    fail_on_authorize: bool,
    fail_on_capture: bool,
    fail_on_refund: bool,
    fail_on_cancel: bool,
    delay: Option<Duration>,
    capture_stall: Option<Duration>,
}

/// In-memory payment gateway for testing.
///
/// Intent IDs are assigned sequentially (`pi_1`, `pi_2`, ...).
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Provider name reported by the in-memory gateway.
    pub const PROVIDER: &'static str = "mock";

    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryGatewayState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryGatewayState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the gateway to decline authorizations.
    pub fn set_fail_on_authorize(&self, fail: bool) {
        self.write().fail_on_authorize = fail;
    }

    /// Configures the gateway to fail captures.
    pub fn set_fail_on_capture(&self, fail: bool) {
        self.write().fail_on_capture = fail;
    }

    /// Configures the gateway to fail refunds.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.write().fail_on_refund = fail;
    }

    /// Configures the gateway to fail cancellations.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.write().fail_on_cancel = fail;
    }

    /// Delays every call by the given duration.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Applies captures, then holds back the response for the given duration.
    pub fn set_capture_stall(&self, stall: Option<Duration>) {
        self.write().capture_stall = stall;
    }

    /// Returns every call received, oldest first.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.read().calls.clone()
    }

    /// Returns the intent IDs passed to `cancel`.
    pub fn cancellations(&self) -> Vec<String> {
        self.read()
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Cancel { intent_id } => Some(intent_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the `(intent_id, amount)` pairs passed to `refund`.
    pub fn refunds(&self) -> Vec<(String, Money)> {
        self.read()
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Refund { intent_id, amount } => Some((intent_id.clone(), *amount)),
                _ => None,
            })
            .collect()
    }

    /// Returns the current status of an intent.
    pub fn intent_status(&self, intent_id: &str) -> Option<IntentStatus> {
        self.read().intents.get(intent_id).map(|i| i.status)
    }

    fn delay(&self) -> Option<Duration> {
        self.read().delay
    }

    fn transition(
        &self,
        call: GatewayCall,
        intent_id: &str,
        from: &[IntentStatus],
        to: IntentStatus,
        fail: impl Fn(&InMemoryGatewayState) -> bool,
    ) -> Result<(), SagaError> {
        let mut state = self.write();
        state.calls.push(call);

        if fail(&state) {
            return Err(SagaError::PaymentGateway(format!(
                "gateway unavailable for {intent_id}"
            )));
        }

        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| SagaError::PaymentGateway(format!("unknown intent {intent_id}")))?;

        if intent.status == to {
            return Ok(());
        }
        if !from.contains(&intent.status) {
            return Err(SagaError::PaymentGateway(format!(
                "intent {intent_id} is {:?}",
                intent.status
            )));
        }
        intent.status = to;
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    fn provider(&self) -> &str {
        Self::PROVIDER
    }

    async fn authorize(&self, customer: &UserId, amount: Money) -> Result<String, SagaError> {
        simulate_latency(self.delay()).await;
        let mut state = self.write();
        state.calls.push(GatewayCall::Authorize {
            customer: customer.clone(),
            amount,
        });

        if state.fail_on_authorize {
            return Err(SagaError::PaymentGateway("Payment declined".to_string()));
        }

        state.next_id += 1;
        let intent_id = format!("pi_{}", state.next_id);
        state.intents.insert(
            intent_id.clone(),
            Intent {
                amount,
                status: IntentStatus::Authorized,
            },
        );

        Ok(intent_id)
    }

    async fn capture(&self, intent_id: &str) -> Result<(), SagaError> {
        simulate_latency(self.delay()).await;
        self.transition(
            GatewayCall::Capture {
                intent_id: intent_id.to_string(),
            },
            intent_id,
            &[IntentStatus::Authorized],
            IntentStatus::Captured,
            |s| s.fail_on_capture,
        )?;
        let stall = self.read().capture_stall;
        simulate_latency(stall).await;
        Ok(())
    }

    async fn refund(&self, intent_id: &str, amount: Money) -> Result<(), SagaError> {
        simulate_latency(self.delay()).await;
        {
            let state = self.read();
            if let Some(intent) = state.intents.get(intent_id)
                && amount > intent.amount
            {
                return Err(SagaError::PaymentGateway(format!(
                    "refund of {amount} exceeds captured {}",
                    intent.amount
                )));
            }
        }
        self.transition(
            GatewayCall::Refund {
                intent_id: intent_id.to_string(),
                amount,
            },
            intent_id,
            &[IntentStatus::Captured],
            IntentStatus::Refunded,
            |s| s.fail_on_refund,
        )
    }

    async fn cancel(&self, intent_id: &str) -> Result<(), SagaError> {
        simulate_latency(self.delay()).await;
        self.transition(
            GatewayCall::Cancel {
                intent_id: intent_id.to_string(),
            },
            intent_id,
            &[IntentStatus::Authorized],
            IntentStatus::Cancelled,
            |s| s.fail_on_cancel,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_authorize_capture_refund() {
        let gateway = InMemoryPaymentGateway::new();
        let buyer = UserId::new("buyer");
        let amount = Money::from_cents(5000);

        let intent = gateway.authorize(&buyer, amount).await.unwrap();
        assert_eq!(intent, "pi_1");
        assert_eq!(gateway.intent_status(&intent), Some(IntentStatus::Authorized));

        gateway.capture(&intent).await.unwrap();
        assert_eq!(gateway.intent_status(&intent), Some(IntentStatus::Captured));

        gateway.refund(&intent, amount).await.unwrap();
        assert_eq!(gateway.intent_status(&intent), Some(IntentStatus::Refunded));
        assert_eq!(gateway.refunds(), vec![(intent, amount)]);
    }

    #[tokio::test]
    async fn test_cancel_only_uncaptured() {
        let gateway = InMemoryPaymentGateway::new();
        let buyer = UserId::new("buyer");

        let first = gateway.authorize(&buyer, Money::from_cents(100)).await.unwrap();
        gateway.cancel(&first).await.unwrap();
        assert_eq!(gateway.intent_status(&first), Some(IntentStatus::Cancelled));

        let second = gateway.authorize(&buyer, Money::from_cents(100)).await.unwrap();
        assert_eq!(second, "pi_2");
        gateway.capture(&second).await.unwrap();
        assert!(gateway.cancel(&second).await.is_err());
        assert_eq!(gateway.cancellations(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_fail_on_authorize() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_authorize(true);

        let result = gateway
            .authorize(&UserId::new("buyer"), Money::from_cents(100))
            .await;
        assert!(matches!(result, Err(SagaError::PaymentGateway(_))));
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_refund_cannot_exceed_captured_amount() {
        let gateway = InMemoryPaymentGateway::new();
        let intent = gateway
            .authorize(&UserId::new("buyer"), Money::from_cents(100))
            .await
            .unwrap();
        gateway.capture(&intent).await.unwrap();

        assert!(gateway.refund(&intent, Money::from_cents(101)).await.is_err());
        assert_eq!(gateway.intent_status(&intent), Some(IntentStatus::Captured));
    }

    #[tokio::test]
    async fn test_stalled_capture_is_applied_before_responding() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_capture_stall(Some(Duration::from_millis(200)));
        let intent = gateway
            .authorize(&UserId::new("buyer"), Money::from_cents(100))
            .await
            .unwrap();

        let result =
            tokio::time::timeout(Duration::from_millis(20), gateway.capture(&intent)).await;

        assert!(result.is_err());
        assert_eq!(gateway.intent_status(&intent), Some(IntentStatus::Captured));
    }

    #[tokio::test]
    async fn test_unknown_intent() {
        let gateway = InMemoryPaymentGateway::new();
        assert!(gateway.capture("pi_404").await.is_err());
    }
}
