use async_trait::async_trait;
use domain::{PaymentAction, PaymentRecord, PaymentStatus, SYSTEM_ACTOR};
use escrow_store::EscrowRepositoryExt;

use super::{STEP_AUTHORIZE_PAYMENT, required};
use crate::collaborators::Collaborators;
use crate::config::SagaConfig;
use crate::context::{SagaContext, StepData};
use crate::error::{Result, SagaError};
use crate::services::call_with_timeout;
use crate::step::SagaStep;

/// Authorizes the buyer's payment and moves the escrow to `AUTHORIZED`.
///
/// Compensation voids the intent. If the gateway already captured it, for
/// example after a capture whose response was lost, the capture is refunded
/// instead.
pub struct AuthorizePaymentStep {
    collaborators: Collaborators,
    config: SagaConfig,
}

impl AuthorizePaymentStep {
    pub fn new(collaborators: Collaborators, config: SagaConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    async fn record_authorization(&self, ctx: &SagaContext, intent_id: &str) -> Result<()> {
        let escrow_id = required(ctx.escrow_id(), "escrow id")?;
        let provider = self.collaborators.gateway.provider();

        self.collaborators
            .payments
            .record(&PaymentRecord::succeeded(
                escrow_id,
                provider,
                intent_id,
                PaymentAction::Authorize,
                ctx.amount,
                &ctx.currency,
            ))
            .await?;

        let mut escrow = self.collaborators.escrows.load(escrow_id).await?;
        escrow.authorize(provider, intent_id, SYSTEM_ACTOR)?;
        self.collaborators.escrows.update(&mut escrow).await?;
        Ok(())
    }

    /// Voids the intent and records the outcome on the ledger.
    async fn cancel_intent(&self, ctx: &SagaContext, intent_id: &str) -> Result<()> {
        let cancelled = call_with_timeout(
            "payment cancel",
            self.config.call_timeout,
            self.collaborators.gateway.cancel(intent_id),
        )
        .await;

        self.record(ctx, intent_id, PaymentAction::Cancel, cancelled.is_ok())
            .await?;
        cancelled
    }

    /// Refunds an intent the gateway captured and records the outcome on the ledger.
    async fn refund_intent(&self, ctx: &SagaContext, intent_id: &str) -> Result<()> {
        let refunded = call_with_timeout(
            "payment refund",
            self.config.call_timeout,
            self.collaborators.gateway.refund(intent_id, ctx.amount),
        )
        .await;

        self.record(ctx, intent_id, PaymentAction::Refund, refunded.is_ok())
            .await?;
        refunded
    }

    async fn record(
        &self,
        ctx: &SagaContext,
        intent_id: &str,
        action: PaymentAction,
        succeeded: bool,
    ) -> Result<()> {
        let escrow_id = required(ctx.escrow_id(), "escrow id")?;
        let status = if succeeded {
            PaymentStatus::Succeeded
        } else {
            PaymentStatus::Failed
        };
        self.collaborators
            .payments
            .record(&PaymentRecord::new(
                escrow_id,
                self.collaborators.gateway.provider(),
                intent_id,
                action,
                ctx.amount,
                &ctx.currency,
                status,
            ))
            .await?;
        Ok(())
    }

    /// Releases the buyer's funds: voids the intent, or refunds it when it
    /// turns out to be captured. Returns true if the funds were refunded.
    async fn release_funds(&self, ctx: &SagaContext, intent_id: &str) -> Result<bool> {
        let cancel_err = match self.cancel_intent(ctx, intent_id).await {
            Ok(()) => return Ok(false),
            Err(e) => e,
        };

        tracing::warn!(intent_id = %intent_id, error = %cancel_err, "cancel failed, refunding possible capture");
        self.refund_intent(ctx, intent_id).await.map_err(|refund_err| {
            tracing::warn!(intent_id = %intent_id, error = %refund_err, "refund fallback failed");
            cancel_err
        })?;
        Ok(true)
    }
}

#[async_trait]
impl SagaStep for AuthorizePaymentStep {
    fn name(&self) -> &'static str {
        STEP_AUTHORIZE_PAYMENT
    }

    async fn execute(&self, ctx: &SagaContext) -> Result<StepData> {
        required(ctx.escrow_id(), "escrow id")?;

        let intent_id = call_with_timeout(
            "payment authorize",
            self.config.call_timeout,
            self.collaborators.gateway.authorize(&ctx.buyer_id, ctx.amount),
        )
        .await?;

        if let Err(e) = self.record_authorization(ctx, &intent_id).await {
            // The hold exists at the gateway but the escrow doesn't know it
            if let Err(cancel_err) = self.cancel_intent(ctx, &intent_id).await {
                tracing::warn!(intent_id = %intent_id, error = %cancel_err, "failed to void orphaned intent");
            }
            return Err(e);
        }

        tracing::debug!(intent_id = %intent_id, "payment authorized");
        Ok(StepData::payment_intent(intent_id))
    }

    async fn compensate(&self, ctx: &SagaContext) -> bool {
        let Some(intent_id) = ctx.payment_intent_id() else {
            return true;
        };

        let refunded = match self.release_funds(ctx, intent_id).await {
            Ok(refunded) => refunded,
            Err(e) => {
                tracing::warn!(intent_id = %intent_id, error = %e, "failed to cancel payment intent");
                return false;
            }
        };

        let noted = async {
            let escrow_id = required(ctx.escrow_id(), "escrow id")?;
            let mut escrow = self.collaborators.escrows.load(escrow_id).await?;
            if refunded {
                escrow.note_capture_refunded(SYSTEM_ACTOR);
            } else {
                escrow.note_authorization_cancelled(SYSTEM_ACTOR);
            }
            self.collaborators.escrows.update(&mut escrow).await?;
            Ok::<(), SagaError>(())
        };

        match noted.await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(intent_id = %intent_id, error = %e, "intent cancelled but escrow not updated");
                false
            }
        }
    }
}
