//! Per-run saga state.

use common::{EscrowId, ListingId, Money, OrderId, UserId};

/// Data produced by a successful step, merged into the context for later steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepData {
    pub escrow_id: Option<EscrowId>,
    pub payment_intent_id: Option<String>,
    pub order_id: Option<OrderId>,
}

impl StepData {
    /// Returns step data carrying an escrow ID.
    pub fn escrow(escrow_id: EscrowId) -> Self {
        Self {
            escrow_id: Some(escrow_id),
            ..Self::default()
        }
    }

    /// Returns step data carrying a payment intent ID.
    pub fn payment_intent(intent_id: impl Into<String>) -> Self {
        Self {
            payment_intent_id: Some(intent_id.into()),
            ..Self::default()
        }
    }

    /// Returns step data carrying an order ID.
    pub fn order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Self::default()
        }
    }

    /// Merges `other` into `self`; values present in `other` win.
    pub fn merge(&mut self, other: StepData) {
        if other.escrow_id.is_some() {
            self.escrow_id = other.escrow_id;
        }
        if other.payment_intent_id.is_some() {
            self.payment_intent_id = other.payment_intent_id;
        }
        if other.order_id.is_some() {
            self.order_id = other.order_id;
        }
    }
}

/// State owned by one orchestrator invocation.
///
/// Holds the request inputs, the data accumulated from completed steps and
/// the diagnostics collected along the way.
#[derive(Debug, Clone)]
pub struct SagaContext {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub listing_id: ListingId,
    pub amount: Money,
    pub currency: String,

    /// Order supplied by the caller, linked instead of creating a new one.
    pub existing_order_id: Option<OrderId>,

    data: StepData,
    completed_steps: Vec<String>,
    errors: Vec<String>,
}

impl SagaContext {
    /// Creates a context for a buyer purchasing a listing.
    pub fn new(
        buyer_id: UserId,
        seller_id: UserId,
        listing_id: ListingId,
        amount: Money,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            buyer_id,
            seller_id,
            listing_id,
            amount,
            currency: currency.into(),
            existing_order_id: None,
            data: StepData::default(),
            completed_steps: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Links an existing order instead of creating one.
    pub fn with_existing_order(mut self, order_id: Option<OrderId>) -> Self {
        self.existing_order_id = order_id;
        self
    }

    pub fn escrow_id(&self) -> Option<EscrowId> {
        self.data.escrow_id
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.data.payment_intent_id.as_deref()
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        self.data.order_id.as_ref()
    }

    /// Returns true if the order in the context was created during this run.
    pub fn created_order(&self) -> bool {
        match (&self.data.order_id, &self.existing_order_id) {
            (Some(order), Some(existing)) => order != existing,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Names of the steps that completed, in execution order.
    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    /// `"<step>: <error>"` entries for the failed step and failed compensations.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Returns the most recent error, used as the failure reason in audit entries.
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }

    pub(crate) fn complete_step(&mut self, step: &str, data: StepData) {
        self.data.merge(data);
        self.completed_steps.push(step.to_string());
    }

    pub(crate) fn record_error(&mut self, step: &str, error: impl std::fmt::Display) {
        self.errors.push(format!("{step}: {error}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SagaContext {
        SagaContext::new(
            UserId::new("buyer"),
            UserId::new("seller"),
            ListingId::new("listing-1"),
            Money::from_major(100),
            "USD",
        )
    }

    #[test]
    fn test_merge_keeps_earlier_values() {
        let escrow_id = EscrowId::new();
        let mut data = StepData::escrow(escrow_id);
        data.merge(StepData::payment_intent("pi_1"));
        data.merge(StepData::default());

        assert_eq!(data.escrow_id, Some(escrow_id));
        assert_eq!(data.payment_intent_id.as_deref(), Some("pi_1"));
        assert!(data.order_id.is_none());
    }

    #[test]
    fn test_complete_step_accumulates() {
        let mut ctx = context();
        let escrow_id = EscrowId::new();
        ctx.complete_step("create_escrow", StepData::escrow(escrow_id));
        ctx.complete_step("authorize_payment", StepData::payment_intent("pi_1"));

        assert_eq!(ctx.escrow_id(), Some(escrow_id));
        assert_eq!(ctx.payment_intent_id(), Some("pi_1"));
        assert_eq!(ctx.completed_steps(), ["create_escrow", "authorize_payment"]);
    }

    #[test]
    fn test_created_order_distinguishes_supplied_orders() {
        let mut ctx = context().with_existing_order(Some(OrderId::new("ord_9")));
        assert!(!ctx.created_order());

        ctx.complete_step("create_order", StepData::order(OrderId::new("ord_9")));
        assert!(!ctx.created_order());

        let mut fresh = context();
        fresh.complete_step("create_order", StepData::order(OrderId::new("ord_1")));
        assert!(fresh.created_order());
    }

    #[test]
    fn test_errors_are_prefixed_with_step() {
        let mut ctx = context();
        ctx.record_error("reserve_listing", "listing is not published");
        assert_eq!(ctx.last_error(), Some("reserve_listing: listing is not published"));
    }
}
