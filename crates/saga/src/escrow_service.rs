//! Application service for escrow creation and the post-hold operations.

use common::{EscrowId, ListingId, Money, OrderId, UserId};
use domain::{
    Caller, DisputeResolution, Escrow, EscrowStatus, PaymentAction, PaymentRecord, Settlement,
};
use escrow_store::{EscrowRepositoryExt, PaymentRepositoryExt, StoreError};
use serde::Serialize;

use crate::collaborators::Collaborators;
use crate::config::SagaConfig;
use crate::context::SagaContext;
use crate::error::{Result, SagaError};
use crate::orchestrator::SagaOrchestrator;
use crate::services::{OrderStatus, call_with_timeout};

/// Input for opening an escrow on behalf of the calling buyer.
#[derive(Debug, Clone)]
pub struct CreateEscrowRequest {
    pub listing_id: ListingId,
    pub seller_id: UserId,
    pub amount: Money,
    pub currency: Option<String>,
    pub order_id: Option<OrderId>,
}

/// Result of a release, refund or dispute operation.
///
/// `success: false` means an external call failed and the escrow kept its
/// status. Once the funds were claimed for a payout, only the same operation
/// can complete it, and retrying it is safe.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub success: bool,
    pub message: String,
    pub escrow: Escrow,
}

impl TransitionOutcome {
    fn applied(message: impl Into<String>, escrow: Escrow) -> Self {
        Self {
            success: true,
            message: message.into(),
            escrow,
        }
    }

    fn not_applied(message: impl Into<String>, escrow: Escrow) -> Self {
        Self {
            success: false,
            message: message.into(),
            escrow,
        }
    }
}

/// Outcome of an external call made on behalf of a transition.
enum Attempt {
    Done,
    Failed(String),
}

impl Attempt {
    fn from_bool(result: Result<bool>, declined: &str) -> Self {
        match result {
            Ok(true) => Attempt::Done,
            Ok(false) => Attempt::Failed(declined.to_string()),
            Err(e) => Attempt::Failed(e.to_string()),
        }
    }
}

/// Coordinates escrow operations for authenticated callers.
pub struct EscrowService {
    collaborators: Collaborators,
    orchestrator: SagaOrchestrator,
    config: SagaConfig,
}

impl EscrowService {
    /// Creates a service running the standard escrow creation saga.
    pub fn new(collaborators: Collaborators, config: SagaConfig) -> Self {
        let orchestrator = SagaOrchestrator::new(collaborators.clone(), config.clone());
        Self {
            collaborators,
            orchestrator,
            config,
        }
    }

    /// Opens an escrow for the calling buyer by running the creation saga.
    ///
    /// Returns the escrow in `HOLDING`, or `SagaFailed` after a rollback.
    #[tracing::instrument(skip(self, request), fields(buyer_id = %caller.user_id, listing_id = %request.listing_id))]
    pub async fn create(&self, caller: &Caller, request: CreateEscrowRequest) -> Result<Escrow> {
        if !request.amount.is_positive() {
            return Err(SagaError::Validation("amount must be positive".to_string()));
        }
        if caller.user_id == request.seller_id {
            return Err(SagaError::Validation(
                "buyer and seller must be different users".to_string(),
            ));
        }

        let currency = request
            .currency
            .unwrap_or_else(|| self.config.currency.clone());
        let context = SagaContext::new(
            caller.user_id.clone(),
            request.seller_id,
            request.listing_id,
            request.amount,
            currency,
        )
        .with_existing_order(request.order_id);

        let result = self.orchestrator.execute_create_escrow_saga(context).await;
        if !result.success {
            return Err(SagaError::SagaFailed {
                message: result
                    .error_message
                    .unwrap_or_else(|| "escrow creation failed".to_string()),
            });
        }

        let escrow_id = result.escrow_id.ok_or_else(|| SagaError::SagaFailed {
            message: "saga completed without an escrow".to_string(),
        })?;
        self.load(escrow_id).await
    }

    /// Pays the held funds out to the seller once the order is delivered.
    #[tracing::instrument(skip(self, reason), fields(user_id = %caller.user_id))]
    pub async fn release(
        &self,
        caller: &Caller,
        escrow_id: EscrowId,
        reason: &str,
    ) -> Result<TransitionOutcome> {
        let mut escrow = self.load(escrow_id).await?;
        if !caller.acts_as(escrow.seller_id()) {
            return Err(SagaError::Forbidden(
                "only the seller can release funds".to_string(),
            ));
        }
        require_status(&escrow, EscrowStatus::Holding)?;

        if let Attempt::Failed(message) = self.check_order(&escrow, OrderStatus::Delivered).await? {
            return Ok(TransitionOutcome::not_applied(message, escrow));
        }
        self.claim(&mut escrow, Settlement::ToSeller).await?;
        if let Attempt::Failed(message) = self.pay_seller(&escrow).await {
            tracing::warn!(%escrow_id, error = %message, "release did not take effect");
            return Ok(TransitionOutcome::not_applied(message, escrow));
        }

        escrow.release(caller.user_id.as_str(), reason)?;
        self.collaborators.escrows.update(&mut escrow).await?;

        metrics::counter!("escrow_released_total").increment(1);
        tracing::info!(%escrow_id, "funds released to seller");
        Ok(TransitionOutcome::applied("Funds released to seller", escrow))
    }

    /// Returns the held funds to the buyer once the order is returned.
    #[tracing::instrument(skip(self, reason), fields(user_id = %caller.user_id))]
    pub async fn refund(
        &self,
        caller: &Caller,
        escrow_id: EscrowId,
        reason: &str,
    ) -> Result<TransitionOutcome> {
        let mut escrow = self.load(escrow_id).await?;
        if !caller.acts_as(escrow.buyer_id()) {
            return Err(SagaError::Forbidden(
                "only the buyer can request a refund".to_string(),
            ));
        }
        require_status(&escrow, EscrowStatus::Holding)?;

        if let Attempt::Failed(message) = self.check_order(&escrow, OrderStatus::Returned).await? {
            return Ok(TransitionOutcome::not_applied(message, escrow));
        }
        self.claim(&mut escrow, Settlement::ToBuyer).await?;
        if let Attempt::Failed(message) = self.refund_buyer(&escrow).await? {
            tracing::warn!(%escrow_id, error = %message, "refund did not take effect");
            return Ok(TransitionOutcome::not_applied(message, escrow));
        }

        escrow.refund(caller.user_id.as_str(), reason)?;
        self.collaborators.escrows.update(&mut escrow).await?;

        metrics::counter!("escrow_refunded_total").increment(1);
        tracing::info!(%escrow_id, "funds refunded to buyer");
        Ok(TransitionOutcome::applied("Funds refunded to buyer", escrow))
    }

    /// Freezes the held funds until an operator resolves the dispute.
    #[tracing::instrument(skip(self, reason), fields(user_id = %caller.user_id))]
    pub async fn open_dispute(
        &self,
        caller: &Caller,
        escrow_id: EscrowId,
        reason: &str,
    ) -> Result<TransitionOutcome> {
        let mut escrow = self.load(escrow_id).await?;
        if !caller.is_admin() && !escrow.is_participant(&caller.user_id) {
            return Err(SagaError::Forbidden(
                "only the buyer or seller can open a dispute".to_string(),
            ));
        }
        require_status(&escrow, EscrowStatus::Holding)?;

        escrow.open_dispute(caller.user_id.as_str(), reason)?;
        self.collaborators.escrows.update(&mut escrow).await?;

        tracing::info!(%escrow_id, "dispute opened");
        Ok(TransitionOutcome::applied("Dispute opened", escrow))
    }

    /// Settles a dispute by moving the held funds to the winning party.
    #[tracing::instrument(skip(self, reason), fields(user_id = %caller.user_id))]
    pub async fn resolve_dispute(
        &self,
        caller: &Caller,
        escrow_id: EscrowId,
        resolution: DisputeResolution,
        reason: &str,
    ) -> Result<TransitionOutcome> {
        if !caller.is_admin() {
            return Err(SagaError::Forbidden(
                "only an operator can resolve disputes".to_string(),
            ));
        }
        let mut escrow = self.load(escrow_id).await?;
        require_status(&escrow, EscrowStatus::Disputed)?;

        self.claim(&mut escrow, resolution.into()).await?;
        let attempt = match resolution {
            DisputeResolution::ReleaseToSeller => self.pay_seller(&escrow).await,
            DisputeResolution::RefundToBuyer => self.refund_buyer(&escrow).await?,
        };
        if let Attempt::Failed(message) = attempt {
            tracing::warn!(%escrow_id, error = %message, "resolution did not take effect");
            return Ok(TransitionOutcome::not_applied(message, escrow));
        }

        escrow.resolve(resolution, caller.user_id.as_str(), reason)?;
        self.collaborators.escrows.update(&mut escrow).await?;

        match resolution {
            DisputeResolution::ReleaseToSeller => {
                metrics::counter!("escrow_released_total").increment(1)
            }
            DisputeResolution::RefundToBuyer => {
                metrics::counter!("escrow_refunded_total").increment(1)
            }
        }
        tracing::info!(%escrow_id, %resolution, "dispute resolved");
        Ok(TransitionOutcome::applied(
            format!("Dispute resolved: {resolution}"),
            escrow,
        ))
    }

    /// Returns an escrow visible to the caller.
    pub async fn get(&self, caller: &Caller, escrow_id: EscrowId) -> Result<Escrow> {
        let escrow = self.load(escrow_id).await?;
        require_visible(caller, &escrow)?;
        Ok(escrow)
    }

    /// Returns the escrow backing an order, if visible to the caller.
    pub async fn get_by_order(&self, caller: &Caller, order_id: &OrderId) -> Result<Escrow> {
        let escrow = self
            .collaborators
            .escrows
            .find_by_order(order_id)
            .await?
            .ok_or_else(|| SagaError::EscrowNotFound(format!("order {order_id}")))?;
        require_visible(caller, &escrow)?;
        Ok(escrow)
    }

    /// Lists the escrows where the caller is the buyer.
    pub async fn list_for_buyer(&self, caller: &Caller) -> Result<Vec<Escrow>> {
        Ok(self
            .collaborators
            .escrows
            .list_by_buyer(&caller.user_id)
            .await?)
    }

    /// Lists the escrows where the caller is the seller.
    pub async fn list_for_seller(&self, caller: &Caller) -> Result<Vec<Escrow>> {
        Ok(self
            .collaborators
            .escrows
            .list_by_seller(&caller.user_id)
            .await?)
    }

    async fn load(&self, escrow_id: EscrowId) -> Result<Escrow> {
        match self.collaborators.escrows.load(escrow_id).await {
            Ok(escrow) => Ok(escrow),
            Err(StoreError::NotFound(id)) => Err(SagaError::escrow_not_found(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores a claim on the held funds before any money moves.
    ///
    /// A concurrent write makes this fail with `ConcurrencyConflict`, so at
    /// most one direction is ever paid out.
    async fn claim(&self, escrow: &mut Escrow, settlement: Settlement) -> Result<()> {
        if escrow.claim_settlement(settlement)? {
            self.collaborators.escrows.update(escrow).await?;
            tracing::debug!(escrow_id = %escrow.id(), %settlement, "settlement claimed");
        }
        Ok(())
    }

    /// Fetches the order status fresh and checks it matches `expected`.
    async fn check_order(&self, escrow: &Escrow, expected: OrderStatus) -> Result<Attempt> {
        let order_id = escrow.order_id().ok_or_else(|| {
            SagaError::PreconditionFailed("escrow has no linked order".to_string())
        })?;

        let status = match call_with_timeout(
            "order status",
            self.config.call_timeout,
            self.collaborators.orders.get_order_status(order_id),
        )
        .await
        {
            Ok(status) => status,
            Err(e) => return Ok(Attempt::Failed(e.to_string())),
        };

        match status {
            Some(status) if status == expected => Ok(Attempt::Done),
            Some(status) => Err(SagaError::PreconditionFailed(format!(
                "order {order_id} is {status}, expected {expected}"
            ))),
            None => Err(SagaError::PreconditionFailed(format!(
                "order {order_id} not found"
            ))),
        }
    }

    async fn pay_seller(&self, escrow: &Escrow) -> Attempt {
        let reference = wallet_reference(escrow.id(), Settlement::ToSeller);
        let result = call_with_timeout(
            "wallet transfer",
            self.config.call_timeout,
            self.collaborators.wallet.transfer(
                escrow.buyer_id(),
                escrow.seller_id(),
                escrow.amount_total(),
                &reference,
            ),
        )
        .await;
        Attempt::from_bool(result, "wallet declined the transfer")
    }

    /// Refunds at the gateway (once per intent) and credits the buyer's wallet.
    async fn refund_buyer(&self, escrow: &Escrow) -> Result<Attempt> {
        let intent_id = escrow.intent_id().ok_or_else(|| {
            SagaError::PreconditionFailed("escrow has no captured payment".to_string())
        })?;
        let gateway = &self.collaborators.gateway;
        let provider = escrow
            .payment()
            .provider
            .clone()
            .unwrap_or_else(|| gateway.provider().to_string());
        let amount = escrow.amount_total();

        let already_refunded = self
            .collaborators
            .payments
            .find_succeeded(&provider, intent_id, PaymentAction::Refund)
            .await?
            .is_some();

        if !already_refunded {
            let refunded = call_with_timeout(
                "payment refund",
                self.config.call_timeout,
                gateway.refund(intent_id, amount),
            )
            .await;

            let row = match &refunded {
                Ok(()) => PaymentRecord::succeeded(
                    escrow.id(),
                    &provider,
                    intent_id,
                    PaymentAction::Refund,
                    amount,
                    escrow.currency(),
                ),
                Err(_) => PaymentRecord::failed(
                    escrow.id(),
                    &provider,
                    intent_id,
                    PaymentAction::Refund,
                    amount,
                    escrow.currency(),
                ),
            };
            match self.collaborators.payments.record(&row).await {
                Ok(()) | Err(StoreError::Duplicate(_)) => {}
                Err(e) => return Err(e.into()),
            }

            if let Err(e) = refunded {
                return Ok(Attempt::Failed(e.to_string()));
            }
        }

        let reference = wallet_reference(escrow.id(), Settlement::ToBuyer);
        let result = call_with_timeout(
            "wallet release",
            self.config.call_timeout,
            self.collaborators
                .wallet
                .release(escrow.buyer_id(), amount, &reference),
        )
        .await;
        Ok(Attempt::from_bool(result, "wallet declined the release"))
    }
}

/// Wallet idempotency key; one per payout direction.
fn wallet_reference(escrow_id: EscrowId, settlement: Settlement) -> String {
    let operation = match settlement {
        Settlement::ToSeller => "release",
        Settlement::ToBuyer => "refund",
    };
    format!("escrow:{escrow_id}:{operation}")
}

fn require_status(escrow: &Escrow, expected: EscrowStatus) -> Result<()> {
    if escrow.status() != expected {
        return Err(SagaError::PreconditionFailed(format!(
            "escrow is {}, expected {expected}",
            escrow.status()
        )));
    }
    Ok(())
}

fn require_visible(caller: &Caller, escrow: &Escrow) -> Result<()> {
    if caller.is_admin() || escrow.is_participant(&caller.user_id) {
        Ok(())
    } else {
        Err(SagaError::Forbidden(
            "escrow belongs to other users".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_reference_is_deterministic() {
        let id = EscrowId::new();
        assert_eq!(
            wallet_reference(id, Settlement::ToSeller),
            format!("escrow:{id}:release")
        );
        assert_eq!(
            wallet_reference(id, DisputeResolution::RefundToBuyer.into()),
            format!("escrow:{id}:refund")
        );
    }

    #[test]
    fn test_attempt_from_bool() {
        assert!(matches!(Attempt::from_bool(Ok(true), "no"), Attempt::Done));
        assert!(matches!(
            Attempt::from_bool(Ok(false), "declined"),
            Attempt::Failed(m) if m == "declined"
        ));
        assert!(matches!(
            Attempt::from_bool(Err(SagaError::WalletService("down".into())), "declined"),
            Attempt::Failed(m) if m.contains("down")
        ));
    }
}
